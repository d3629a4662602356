use std::collections::BTreeMap;

use anyhow::Result;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::detect::backend::{DetectorBackend, DetectorMethod};
use crate::frame::{BoundingBox, Frame};
use crate::ingest::FIGURE_COLOR;

/// Stub backend for synthetic scenes.
///
/// Reports one region per connected blob painted in `FIGURE_COLOR`, the color
/// the `stub://` camera draws its walkers with. Stands in for HOG in builds
/// without the `backend-opencv` feature.
pub struct StubBackend {
    min_area: u32,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { min_area: 16 }
    }

    /// Ignore blobs smaller than `min_area` pixels of bounding area.
    pub fn with_min_area(mut self, min_area: u32) -> Self {
        self.min_area = min_area;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn method(&self) -> DetectorMethod {
        DetectorMethod::Hog
    }

    fn synthetic_only(&self) -> bool {
        true
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let image = frame.as_image();
        let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if image.get_pixel(x, y).0 == FIGURE_COLOR {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        // label -> (min_x, min_y, max_x, max_y), inclusive pixel bounds
        let mut extents: BTreeMap<u32, (u32, u32, u32, u32)> = BTreeMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0];
            if label == 0 {
                continue;
            }
            extents
                .entry(label)
                .and_modify(|e| {
                    e.0 = e.0.min(x);
                    e.1 = e.1.min(y);
                    e.2 = e.2.max(x);
                    e.3 = e.3.max(y);
                })
                .or_insert((x, y, x, y));
        }

        let mut regions: Vec<BoundingBox> = extents
            .into_values()
            .filter(|&(x1, y1, x2, y2)| (x2 - x1 + 1) * (y2 - y1 + 1) >= self.min_area)
            .map(|(x1, y1, x2, y2)| {
                BoundingBox::new(x1 as f32, y1 as f32, (x2 + 1) as f32, (y2 + 1) as f32)
            })
            .collect();
        regions.sort_by(|a, b| a.x1.total_cmp(&b.x1).then(a.y1.total_cmp(&b.y1)));
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn scene(blobs: &[(u32, u32, u32, u32)]) -> Frame {
        let mut image = RgbImage::from_pixel(64, 48, Rgb([20, 40, 60]));
        for &(x, y, w, h) in blobs {
            for yy in y..y + h {
                for xx in x..x + w {
                    image.put_pixel(xx, yy, Rgb(FIGURE_COLOR));
                }
            }
        }
        Frame::from_image(image)
    }

    #[test]
    fn empty_scene_has_no_regions() {
        let mut backend = StubBackend::new();
        assert!(backend.detect(&scene(&[])).unwrap().is_empty());
    }

    #[test]
    fn reports_blobs_left_to_right() {
        let mut backend = StubBackend::new();
        let regions = backend
            .detect(&scene(&[(40, 5, 6, 20), (2, 10, 5, 12)]))
            .unwrap();
        assert_eq!(
            regions,
            vec![
                BoundingBox::new(2.0, 10.0, 7.0, 22.0),
                BoundingBox::new(40.0, 5.0, 46.0, 25.0),
            ]
        );
    }

    #[test]
    fn small_blobs_are_ignored() {
        let mut backend = StubBackend::new().with_min_area(10);
        let regions = backend.detect(&scene(&[(1, 1, 2, 2), (20, 20, 4, 4)])).unwrap();
        assert_eq!(regions.len(), 1);
    }
}
