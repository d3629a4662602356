//! Synthetic camera for `stub://` devices.
//!
//! Renders a static gradient background with a varying number of walkers,
//! solid rectangles painted in `FIGURE_COLOR`, moving left to right. The
//! population follows a fixed schedule so counts, averages and maxima change
//! over a run without any hardware.

use anyhow::{bail, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::config::CameraSettings;
use crate::frame::Frame;

/// Color walkers are painted with. The background never uses it.
pub const FIGURE_COLOR: [u8; 3] = [255, 0, 255];

/// Walkers visible per schedule slot.
const POPULATION_SCHEDULE: [usize; 8] = [1, 2, 3, 2, 0, 1, 3, 2];
/// Frames spent in each schedule slot.
const FRAMES_PER_SLOT: u64 = 45;

#[derive(Clone, Debug)]
struct Walker {
    x: f32,
    y: u32,
    w: u32,
    h: u32,
    speed: f32,
}

pub struct SyntheticSource {
    config: CameraSettings,
    walkers: Vec<Walker>,
    frame_count: u64,
    opened: bool,
}

impl SyntheticSource {
    pub fn new(config: CameraSettings) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let max_slot = POPULATION_SCHEDULE.iter().copied().max().unwrap_or(0);
        // One horizontal lane per walker with a gap between lanes, so walkers
        // never touch each other.
        let lanes = max_slot.max(1) as u32;
        let lane_h = (config.height / lanes).max(1);
        let w = (config.width / 12).max(2);
        let h = (lane_h * 3 / 4).max(1);
        let walkers = (0..max_slot)
            .map(|i| Walker {
                x: rng.gen_range(0.0..config.width as f32),
                y: lane_h * i as u32 + (lane_h - h) / 2,
                w,
                h,
                speed: rng.gen_range(1.0..4.0),
            })
            .collect();
        Self {
            config,
            walkers,
            frame_count: 0,
            opened: false,
        }
    }

    /// Walkers on screen for a given frame number.
    fn population(frame_count: u64) -> usize {
        let slot = (frame_count / FRAMES_PER_SLOT) as usize % POPULATION_SCHEDULE.len();
        POPULATION_SCHEDULE[slot]
    }

    fn render(&mut self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 200) as u8, (y % 200) as u8, 64])
        });

        let visible = Self::population(self.frame_count);
        for walker in self.walkers.iter_mut().take(visible) {
            let x0 = walker.x as u32;
            for y in walker.y..(walker.y + walker.h).min(height) {
                for x in x0..(x0 + walker.w).min(width) {
                    image.put_pixel(x, y, Rgb(FIGURE_COLOR));
                }
            }
        }
        for walker in self.walkers.iter_mut() {
            walker.x += walker.speed;
            // Wrap once fully off the right edge; walkers never straddle the
            // seam, so each stays a single blob.
            if walker.x >= width as f32 {
                walker.x = 0.0;
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        log::info!("SyntheticSource: connected to {}", self.config.device);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            bail!("synthetic source {} is not open", self.config.device);
        }
        let image = self.render();
        self.frame_count += 1;
        Ok(Some(Frame::from_image(image)))
    }

    fn close(&mut self) {
        if self.opened {
            log::info!("SyntheticSource: closed {}", self.config.device);
        }
        self.opened = false;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
