//! Overlay layout and rasterization for annotated frames.
//!
//! Layout (`plan`) and drawing (`render`) are split so the placement of every
//! label and text line can be inspected without decoding pixels.
//!
//! Text is drawn with the 8x8 bitmap font from `font8x8`, each font pixel
//! scaled to an `n x n` block.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use serde::Serialize;

use crate::config::DisplaySettings;
use crate::detect::DetectorMethod;
use crate::frame::{BoundingBox, Frame};

/// Side of one font glyph in font pixels.
pub const GLYPH_SIZE: u32 = 8;

const TEXT_MARGIN: i32 = 10;
const LINE_GAP: u32 = 14;
const LABEL_PADDING: u32 = 5;

/// A "Person N" tag drawn on a filled background above its box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Label {
    pub text: String,
    /// Top-left corner of the background.
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One line of the top-left text block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextLine {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub color: [u8; 3],
    pub scale: u32,
}

impl TextLine {
    /// `(x, y, width, height)` covered by the rendered glyphs.
    pub fn bounds(&self) -> (i32, i32, u32, u32) {
        let (width, height) = text_size(&self.text, self.scale);
        (self.x, self.y, width, height)
    }
}

/// Everything drawn on one frame, in drawing order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OverlayPlan {
    pub boxes: Vec<BoundingBox>,
    pub labels: Vec<Label>,
    /// Timestamp, status and count, top to bottom.
    pub lines: Vec<TextLine>,
}

/// Pixel size of `text` rendered at `scale`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    (chars * GLYPH_SIZE * scale, GLYPH_SIZE * scale)
}

/// Lay out the overlay for `regions`, which must already be normalized.
///
/// Each label sits directly above its box. A box too close to the top of the
/// frame gets its label at row 0 instead, overlapping the top of the box.
pub fn plan(
    regions: &[BoundingBox],
    timestamp: &str,
    method: DetectorMethod,
    style: &DisplaySettings,
) -> OverlayPlan {
    let labels = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let text = format!("Person {}", i + 1);
            let (text_w, text_h) = text_size(&text, style.label_scale);
            let height = text_h + 2 * LABEL_PADDING;
            let top = region.y1.round() as i32 - height as i32;
            Label {
                text,
                x: region.x1.round() as i32,
                y: top.max(0),
                width: text_w,
                height,
            }
        })
        .collect();

    let pitch = (GLYPH_SIZE * style.text_scale + LINE_GAP) as i32;
    let texts = [
        (timestamp.to_string(), style.time_color),
        (
            format!("Status: Detecting ({})", method.label()),
            style.text_color,
        ),
        (format!("Total Persons: {}", regions.len()), style.text_color),
    ];
    let lines = texts
        .into_iter()
        .enumerate()
        .map(|(i, (text, color))| TextLine {
            text,
            x: TEXT_MARGIN,
            y: TEXT_MARGIN + pitch * i as i32,
            color,
            scale: style.text_scale,
        })
        .collect();

    OverlayPlan {
        boxes: regions.to_vec(),
        labels,
        lines,
    }
}

/// Draw `plan` onto a copy of `frame`. The input is left untouched.
pub fn render(frame: &Frame, plan: &OverlayPlan, style: &DisplaySettings) -> Frame {
    let mut annotated = frame.clone();
    let image = annotated.as_image_mut();
    let box_color = Rgb(style.box_color);

    for region in &plan.boxes {
        draw_box(image, region, box_color, style.box_thickness);
    }

    for label in &plan.labels {
        if label.width > 0 && label.height > 0 {
            let rect = Rect::at(label.x, label.y).of_size(label.width, label.height);
            draw_filled_rect_mut(image, rect, box_color);
        }
        draw_text(
            image,
            &label.text,
            label.x,
            label.y + LABEL_PADDING as i32,
            style.label_scale,
            Rgb(style.label_text_color),
        );
    }

    for line in &plan.lines {
        draw_text(image, &line.text, line.x, line.y, line.scale, Rgb(line.color));
    }

    annotated
}

fn draw_box(image: &mut RgbImage, region: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let x = region.x1.round() as i32;
    let y = region.y1.round() as i32;
    let w = region.width().round() as u32;
    let h = region.height().round() as u32;
    for t in 0..thickness.max(1) {
        let (Some(w), Some(h)) = (w.checked_sub(2 * t), h.checked_sub(2 * t)) else {
            break;
        };
        if w == 0 || h == 0 {
            break;
        }
        let inset = t as i32;
        draw_hollow_rect_mut(image, Rect::at(x + inset, y + inset).of_size(w, h), color);
    }
}

fn draw_text(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let step = (GLYPH_SIZE * scale) as i32;
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = x + step * i as i32;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // Bit 0 is the leftmost column.
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px = origin_x + (col * scale) as i32;
                let py = y + (row as u32 * scale) as i32;
                draw_filled_rect_mut(image, Rect::at(px, py).of_size(scale, scale), color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> DisplaySettings {
        DisplaySettings::default()
    }

    #[test]
    fn plan_labels_follow_input_order() {
        let regions = [
            BoundingBox::new(50.0, 100.0, 90.0, 180.0),
            BoundingBox::new(10.0, 40.0, 30.0, 90.0),
        ];
        let plan = plan(&regions, "2024-01-01 12:00:00", DetectorMethod::Hog, &style());
        let texts: Vec<_> = plan.labels.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["Person 1", "Person 2"]);
        assert_eq!(plan.labels[0].x, 50);
        assert_eq!(plan.labels[0].y + plan.labels[0].height as i32, 100);
    }

    #[test]
    fn fractional_corners_round_like_boxes() {
        let regions = [BoundingBox::new(20.6, 60.7, 40.0, 90.0)];
        let plan = plan(&regions, "t", DetectorMethod::Neural, &style());
        assert_eq!(plan.labels[0].x, 21);
        assert_eq!(plan.labels[0].y + plan.labels[0].height as i32, 61);
    }

    #[test]
    fn labels_near_top_clamp_to_row_zero() {
        let regions = [BoundingBox::new(5.0, 3.0, 40.0, 60.0)];
        let plan = plan(&regions, "t", DetectorMethod::Hog, &style());
        assert_eq!(plan.labels[0].y, 0);
    }

    #[test]
    fn text_lines_read_timestamp_status_count() {
        let regions = [BoundingBox::new(0.0, 50.0, 10.0, 60.0)];
        let plan = plan(&regions, "2024-01-01 12:00:00", DetectorMethod::Neural, &style());
        let texts: Vec<_> = plan.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            [
                "2024-01-01 12:00:00",
                "Status: Detecting (YOLO)",
                "Total Persons: 1"
            ]
        );
        assert_eq!(plan.lines[0].color, [255, 255, 255]);
        assert_eq!(plan.lines[2].color, [255, 0, 0]);
        assert!(plan.lines[0].y < plan.lines[1].y && plan.lines[1].y < plan.lines[2].y);
    }

    #[test]
    fn render_draws_box_outline_in_box_color() {
        let frame = Frame::filled(200, 200, [0, 0, 0]);
        let regions = [BoundingBox::new(100.0, 120.0, 150.0, 190.0)];
        let style = style();
        let plan = plan(&regions, "", DetectorMethod::Hog, &style);
        let out = render(&frame, &plan, &style);
        assert_eq!(out.as_image().get_pixel(100, 150).0, style.box_color);
        assert_eq!(out.as_image().get_pixel(101, 150).0, style.box_color);
        assert_eq!(out.as_image().get_pixel(125, 150).0, [0, 0, 0]);
        assert_eq!(frame, Frame::filled(200, 200, [0, 0, 0]));
    }

    #[test]
    fn text_draws_only_inside_bounds() {
        let frame = Frame::filled(64, 32, [0, 0, 0]);
        let line = TextLine {
            text: "AB".to_string(),
            x: 4,
            y: 4,
            color: [255, 255, 255],
            scale: 1,
        };
        let plan = OverlayPlan {
            lines: vec![line.clone()],
            ..OverlayPlan::default()
        };
        let out = render(&frame, &plan, &style());
        let (bx, by, bw, bh) = line.bounds();
        let mut lit = 0;
        for (x, y, p) in out.as_image().enumerate_pixels() {
            let inside = (x as i32) >= bx
                && (x as i32) < bx + bw as i32
                && (y as i32) >= by
                && (y as i32) < by + bh as i32;
            if p.0 != [0, 0, 0] {
                assert!(inside, "pixel ({x}, {y}) drawn outside text bounds");
                lit += 1;
            }
        }
        assert!(lit > 0);
    }
}
