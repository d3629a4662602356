#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, DetectorMethod};
use crate::frame::{BoundingBox, Frame};

/// COCO class index for "person".
const PERSON_CLASS: usize = 0;
/// Offset of the first class score in a YOLOv8 prediction column (cx, cy, w, h).
const CXYWH_OFFSET: usize = 4;
/// Padding value used by the letterbox, as in the reference exporter.
const PAD_VALUE: f32 = 144.0 / 255.0;

/// Tract-based YOLOv8 person detector.
///
/// Loads a local ONNX export with a square `1x3xSxS` input and a
/// `1x(4+classes)xN` output, keeps person predictions and applies IoU NMS.
pub struct YoloBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!("model file not found: {}", model_path.display()));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    /// Letterbox into the model input. Returns the tensor and the scale ratio.
    fn build_input(&self, frame: &Frame) -> Result<(Tensor, f32)> {
        let side = self.input_size as usize;
        let (w0, h0) = (frame.width() as f32, frame.height() as f32);
        if w0 == 0.0 || h0 == 0.0 {
            return Err(anyhow!("cannot run detection on an empty frame"));
        }
        let ratio = (self.input_size as f32 / w0).min(self.input_size as f32 / h0);
        let w_new = ((w0 * ratio).round() as u32).max(1);
        let h_new = ((h0 * ratio).round() as u32).max(1);
        let resized = image::imageops::resize(frame.as_image(), w_new, h_new, FilterType::Triangle);

        let mut input = tract_ndarray::Array4::from_elem((1, 3, side, side), PAD_VALUE);
        for (x, y, rgb) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            input[[0, 0, y, x]] = r as f32 / 255.0;
            input[[0, 1, y, x]] = g as f32 / 255.0;
            input[[0, 2, y, x]] = b as f32 / 255.0;
        }
        Ok((input.into_tensor(), ratio))
    }

    fn decode(&self, output: &Tensor, ratio: f32) -> Result<Vec<(BoundingBox, f32)>> {
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape();
        if shape.len() != 3 || shape[1] <= CXYWH_OFFSET {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }

        let mut candidates = Vec::new();
        for i in 0..shape[2] {
            let (class, confidence) = (CXYWH_OFFSET..shape[1])
                .map(|row| (row - CXYWH_OFFSET, preds[[0, row, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if class != PERSON_CLASS || confidence < self.confidence_threshold {
                continue;
            }
            let cx = preds[[0, 0, i]] / ratio;
            let cy = preds[[0, 1, i]] / ratio;
            let w = preds[[0, 2, i]] / ratio;
            let h = preds[[0, 3, i]] / ratio;
            candidates.push((
                BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
                confidence,
            ));
        }
        Ok(candidates)
    }
}

/// Greedy NMS, highest confidence first.
fn non_max_suppression(mut xs: Vec<(BoundingBox, f32)>, iou_threshold: f32) -> Vec<BoundingBox> {
    xs.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut kept: Vec<BoundingBox> = Vec::new();
    for (bbox, _) in xs {
        if kept.iter().all(|k| k.iou(&bbox) <= iou_threshold) {
            kept.push(bbox);
        }
    }
    kept
}

impl DetectorBackend for YoloBackend {
    fn name(&self) -> &'static str {
        "tract-yolo"
    }

    fn method(&self) -> DetectorMethod {
        DetectorMethod::Neural
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let (input, ratio) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let candidates = self.decode(output, ratio)?;
        Ok(non_max_suppression(candidates, self.iou_threshold))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, [0, 0, 0]);
        self.detect(&blank).map(|_| ())
    }
}
