#[cfg(feature = "backend-opencv")]
pub mod hog;
pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod yolo;

use anyhow::Result;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;

#[cfg(feature = "backend-opencv")]
pub use hog::HogBackend;
pub use stub::StubBackend;
#[cfg(feature = "backend-tract")]
pub use yolo::YoloBackend;

/// Factory for the HOG slot.
///
/// Without `backend-opencv` the stub backend serves HOG so the baseline method
/// is always constructible (it only finds blobs drawn by `stub://` cameras).
pub fn hog_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    #[cfg(feature = "backend-opencv")]
    {
        Ok(Box::new(HogBackend::new(settings.hog.clone())?))
    }
    #[cfg(not(feature = "backend-opencv"))]
    {
        let _ = settings;
        log::warn!("HOG served by the stub backend (build with backend-opencv for real detection)");
        Ok(Box::new(StubBackend::new()))
    }
}

/// Factory for the neural slot.
pub fn neural_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    #[cfg(feature = "backend-tract")]
    {
        let path = settings
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no YOLO model path configured"))?;
        let backend = YoloBackend::new(path, settings.input_size)?
            .with_thresholds(settings.confidence, settings.iou);
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = settings;
        anyhow::bail!("YOLO detection requires the backend-tract feature")
    }
}
