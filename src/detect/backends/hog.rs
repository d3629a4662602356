#![cfg(feature = "backend-opencv")]

use anyhow::{Context, Result};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::HOGDescriptor;
use opencv::prelude::*;

use crate::config::HogSettings;
use crate::detect::backend::{DetectorBackend, DetectorMethod};
use crate::frame::{BoundingBox, Frame};

/// OpenCV HOG descriptor with the bundled pedestrian SVM.
pub struct HogBackend {
    hog: HOGDescriptor,
    settings: HogSettings,
}

impl HogBackend {
    pub fn new(settings: HogSettings) -> Result<Self> {
        let mut hog = HOGDescriptor::default().context("failed to create HOG descriptor")?;
        let people = HOGDescriptor::get_default_people_detector()
            .context("failed to load default people detector")?;
        hog.set_svm_detector(&people)
            .context("failed to install people SVM")?;
        Ok(Self { hog, settings })
    }

    // Channel order does not matter here: HOG takes the strongest gradient
    // across channels, so RGB input behaves like BGR.
    fn to_mat(frame: &Frame) -> Result<Mat> {
        let flat = Mat::from_slice(frame.pixels()).context("wrap frame bytes")?;
        let shaped = flat
            .reshape(3, frame.height() as i32)
            .context("reshape frame to 3 channels")?;
        Ok(shaped.try_clone()?)
    }
}

impl DetectorBackend for HogBackend {
    fn name(&self) -> &'static str {
        "opencv-hog"
    }

    fn method(&self) -> DetectorMethod {
        DetectorMethod::Hog
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let mat = Self::to_mat(frame)?;
        let mut found = Vector::<Rect>::new();
        let [stride_x, stride_y] = self.settings.win_stride;
        let [pad_x, pad_y] = self.settings.padding;
        self.hog
            .detect_multi_scale(
                &mat,
                &mut found,
                self.settings.hit_threshold,
                Size::new(stride_x, stride_y),
                Size::new(pad_x, pad_y),
                self.settings.scale,
                self.settings.group_threshold,
                false,
            )
            .context("HOG detectMultiScale failed")?;

        Ok(found
            .iter()
            .map(|r| BoundingBox::from_xywh(r.x as f32, r.y as f32, r.width as f32, r.height as f32))
            .collect())
    }
}
