mod backend;
mod backends;
mod registry;

pub use backend::{DetectorBackend, DetectorMethod};
#[cfg(feature = "backend-opencv")]
pub use backends::HogBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::YoloBackend;
pub use registry::{BackendFactory, BackendRegistry, BackendSelection, FallbackNotice};
