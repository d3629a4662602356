//! Frame ingestion sources.
//!
//! - Synthetic scenes (`stub://<name>` devices), always available
//! - USB/V4L2 webcams (feature: ingest-v4l2)
//!
//! Every source produces RGB `Frame`s on demand. A source distinguishes a
//! transient miss (`Ok(None)`: no frame this time, try again) from a permanent
//! failure (`Err`: device gone, stop the pipeline). `close` is idempotent and
//! safe to call on a source that was never opened.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use camera::CameraSource;
pub use synthetic::{SyntheticSource, FIGURE_COLOR};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A sequential producer of frames.
pub trait FrameSource: Send {
    /// Acquire the device. Fails when it is unavailable.
    fn open(&mut self) -> Result<()>;

    /// Capture the next frame. `Ok(None)` means no frame is available right now.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Safe to call repeatedly or without `open`.
    fn close(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}
