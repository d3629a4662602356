use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::frame::{BoundingBox, Frame};

/// Person detection methods a session can be configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DetectorMethod {
    /// HOG descriptor + linear SVM. Fast, approximate, always the fallback.
    Hog,
    /// Pretrained neural detector (YOLO family). Slow, accurate, optional.
    Neural,
}

impl DetectorMethod {
    /// Short label used in overlays and logs.
    pub fn label(self) -> &'static str {
        match self {
            DetectorMethod::Hog => "HOG",
            DetectorMethod::Neural => "YOLO",
        }
    }

    /// The other method, for toggling.
    pub fn toggled(self) -> Self {
        match self {
            DetectorMethod::Hog => DetectorMethod::Neural,
            DetectorMethod::Neural => DetectorMethod::Hog,
        }
    }
}

impl fmt::Display for DetectorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DetectorMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hog" => Ok(DetectorMethod::Hog),
            "yolo" | "neural" => Ok(DetectorMethod::Neural),
            other => Err(anyhow!(
                "unknown detection method '{}' (expected HOG or YOLO)",
                other
            )),
        }
    }
}

/// Detector backend trait.
///
/// A backend turns one frame into an ordered list of person regions. It does
/// not deduplicate across frames and it does not touch session state; the
/// session records and draws whatever the backend returns.
///
/// Returning `Err` is allowed for internal failures. Callers treat it as zero
/// detections for that frame and keep going.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// The method this backend implements.
    fn method(&self) -> DetectorMethod;

    /// Run detection on a frame. An empty scene yields `Ok(vec![])`.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook, run once at selection time.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// True when the backend only recognizes synthetic `stub://` scenes.
    fn synthetic_only(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("HOG".parse::<DetectorMethod>().unwrap(), DetectorMethod::Hog);
        assert_eq!(" yolo ".parse::<DetectorMethod>().unwrap(), DetectorMethod::Neural);
        assert_eq!("Neural".parse::<DetectorMethod>().unwrap(), DetectorMethod::Neural);
        assert!("ssd".parse::<DetectorMethod>().is_err());
    }

    #[test]
    fn toggled_flips_between_methods() {
        assert_eq!(DetectorMethod::Hog.toggled(), DetectorMethod::Neural);
        assert_eq!(DetectorMethod::Neural.toggled().label(), "HOG");
    }
}
