//! Person Watch
//!
//! Live person detection on camera frames with rolling statistics.
//!
//! # Architecture
//!
//! Frames flow one way through the crate:
//!
//! 1. **Ingest** (`ingest`): a `FrameSource` produces RGB frames from a V4L2
//!    webcam or a synthetic `stub://` scene.
//! 2. **Detect** (`detect`): a `DetectorBackend` (HOG or a YOLO network)
//!    reports person regions. Backends are built by a registry that falls
//!    back to HOG when the neural backend is unavailable.
//! 3. **Session** (`session`): records one `DetectionEvent` per frame in a
//!    bounded history, derives statistics and produces the annotated frame
//!    (`annotate`).
//! 4. **Runtime** (`runtime`): a worker thread drives 1-3 at a fixed rate and
//!    publishes the latest result for the presentation layer.
//!
//! # Module Structure
//!
//! - `annotate`: overlay layout (`OverlayPlan`) and rasterization
//! - `config`: `AppConfig` loading (file, environment, validation)
//! - `detect`: `DetectorBackend`, `BackendRegistry`, HOG/YOLO/stub backends
//! - `frame`: `Frame` and `BoundingBox`
//! - `ingest`: `FrameSource`, `CameraSource`, synthetic and V4L2 sources
//! - `runtime`: `DetectorService` worker and its start/stop/switch controls
//! - `session`: `DetectionSession`, `DetectionEvent`, `StatsSnapshot`

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod runtime;
pub mod session;

pub use config::AppConfig;
pub use detect::{
    BackendRegistry, BackendSelection, DetectorBackend, DetectorMethod, FallbackNotice,
};
pub use frame::{BoundingBox, Frame};
pub use ingest::{CameraSource, FrameSource, SourceStats};
pub use runtime::{DetectorService, LatestFrame, StartOutcome};
pub use session::{DetectionEvent, DetectionSession, ProcessedFrame, StatsSnapshot};
