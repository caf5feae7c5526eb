//! Frame annotation: color-coded detection boxes and a summary overlay.

mod font;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::classify::{ClassifiedDetection, FrameResult};
use crate::frame::Frame;

pub const VIOLATION_COLOR: Rgb<u8> = Rgb([220, 20, 20]);
pub const COMPLIANT_COLOR: Rgb<u8> = Rgb([20, 200, 20]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PANEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: u32 = 2;
const SUMMARY_SCALE: u32 = 2;
const PADDING: u32 = 3;

/// Draw `result` onto a copy of `frame`'s image.
pub fn annotate(frame: &Frame, result: &FrameResult) -> RgbImage {
    let mut canvas = frame.image().clone();
    for detection in &result.detections {
        draw_detection(&mut canvas, detection);
    }
    draw_summary(&mut canvas, result);
    canvas
}

fn status_color(detection: &ClassifiedDetection) -> Rgb<u8> {
    if detection.is_violation() {
        VIOLATION_COLOR
    } else {
        COMPLIANT_COLOR
    }
}

fn draw_detection(canvas: &mut RgbImage, detection: &ClassifiedDetection) {
    let Some(rect) = detection.detection.bbox.clamp_to(canvas.width(), canvas.height()) else {
        log::debug!("skipping degenerate box for '{}'", detection.label());
        return;
    };
    let color = status_color(detection);
    for inset in 0..BOX_THICKNESS {
        if rect.width <= 2 * inset || rect.height <= 2 * inset {
            break;
        }
        let outline = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32)
            .of_size(rect.width - 2 * inset, rect.height - 2 * inset);
        draw_hollow_rect_mut(canvas, outline, color);
    }

    let text = format!("{} {:.2}", detection.label(), detection.detection.confidence);
    let label_w = font::text_width(&text, LABEL_SCALE) + 2 * PADDING;
    let label_h = font::text_height(LABEL_SCALE) + 2 * PADDING;
    // Above the box when there is room, otherwise inside its top edge.
    let label_y = if rect.y >= label_h { rect.y - label_h } else { rect.y };
    draw_panel(canvas, rect.x, label_y, label_w, label_h, color);
    font::draw_text(
        canvas,
        &text,
        (rect.x + PADDING) as i64,
        (label_y + PADDING) as i64,
        LABEL_SCALE,
        TEXT_COLOR,
    );
}

fn draw_summary(canvas: &mut RgbImage, result: &FrameResult) {
    let (status, status_color) = if result.has_violations() {
        (format!("VIOLATIONS: {}", result.violation_count), VIOLATION_COLOR)
    } else {
        ("OK".to_string(), COMPLIANT_COLOR)
    };
    let timestamp = result.timestamp.to_string();
    let line_h = font::text_height(SUMMARY_SCALE) + PADDING;
    let panel_w = font::text_width(&timestamp, SUMMARY_SCALE)
        .max(font::text_width(&status, SUMMARY_SCALE))
        + 2 * PADDING;
    let panel_h = 2 * line_h + PADDING;
    draw_panel(canvas, 0, 0, panel_w, panel_h, PANEL_COLOR);

    let x = PADDING as i64;
    font::draw_text(canvas, &timestamp, x, PADDING as i64, SUMMARY_SCALE, TEXT_COLOR);
    font::draw_text(
        canvas,
        &status,
        x,
        (PADDING + line_h) as i64,
        SUMMARY_SCALE,
        status_color,
    );
}

/// Filled rectangle clipped to the canvas.
fn draw_panel(canvas: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    if x >= canvas.width() || y >= canvas.height() {
        return;
    }
    let width = width.min(canvas.width() - x);
    let height = height.min(canvas.height() - y);
    if width == 0 || height == 0 {
        return;
    }
    draw_filled_rect_mut(canvas, Rect::at(x as i32, y as i32).of_size(width, height), color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, ViolationLabels};
    use crate::detect::{BoundingBox, Detection};
    use crate::frame::FrameTimestamp;

    fn frame() -> Frame {
        Frame::new(0, FrameTimestamp::ZERO, RgbImage::from_pixel(200, 150, Rgb([90, 90, 90])))
    }

    fn result_for(detections: &[Detection]) -> FrameResult {
        let labels = ViolationLabels::new(["no-helmet"]);
        FrameResult::new(0, FrameTimestamp::ZERO, classify(detections, 0.5, &labels))
    }

    #[test]
    fn input_frame_is_not_mutated() {
        let frame = frame();
        let before = frame.image().clone();
        let result = result_for(&[Detection::new(
            "no-helmet",
            0.9,
            BoundingBox::new(50.0, 60.0, 120.0, 140.0),
        )]);
        let annotated = annotate(&frame, &result);
        assert_eq!(frame.image(), &before);
        assert_ne!(annotated, before);
        assert_eq!(annotated.dimensions(), before.dimensions());
    }

    #[test]
    fn boxes_are_colored_by_status() {
        let result = result_for(&[
            Detection::new("no-helmet", 0.9, BoundingBox::new(40.0, 60.0, 90.0, 140.0)),
            Detection::new("helmet", 0.9, BoundingBox::new(120.0, 60.0, 180.0, 140.0)),
        ]);
        let annotated = annotate(&frame(), &result);
        // Bottom-left corners sit below any label or summary panel.
        assert_eq!(*annotated.get_pixel(40, 140), VIOLATION_COLOR);
        assert_eq!(*annotated.get_pixel(120, 140), COMPLIANT_COLOR);
    }

    #[test]
    fn degenerate_and_out_of_frame_boxes_are_skipped() {
        let result = result_for(&[
            Detection::new("no-helmet", 0.9, BoundingBox::new(10.0, 10.0, 10.0, 10.0)),
            Detection::new("no-helmet", 0.9, BoundingBox::new(-50.0, -50.0, -10.0, -10.0)),
            Detection::new("no-helmet", 0.9, BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0)),
        ]);
        let annotated = annotate(&frame(), &result);
        assert_eq!(annotated.dimensions(), (200, 150));
    }

    #[test]
    fn summary_uses_status_color() {
        let clean = annotate(&frame(), &result_for(&[]));
        assert!(clean.pixels().any(|p| *p == COMPLIANT_COLOR));
        assert!(!clean.pixels().any(|p| *p == VIOLATION_COLOR));

        let flagged = annotate(
            &frame(),
            &result_for(&[Detection::new("no-helmet", 0.9, BoundingBox::new(150.0, 100.0, 190.0, 140.0))]),
        );
        assert!(flagged.pixels().any(|p| *p == VIOLATION_COLOR));
    }

    #[test]
    fn tiny_canvas_does_not_panic() {
        let tiny = Frame::new(0, FrameTimestamp::ZERO, RgbImage::new(3, 2));
        let result = result_for(&[Detection::new("no-helmet", 0.9, BoundingBox::new(0.0, 0.0, 2.0, 1.0))]);
        assert_eq!(annotate(&tiny, &result).dimensions(), (3, 2));
    }
}
