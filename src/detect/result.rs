use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel coordinates, `(x1, y1)` top-left and
/// `(x2, y2)` bottom-right.
///
/// Serialized as a four-element array `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a YOLO-style centre/size box.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_over_union(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Scale both axes, e.g. from model input space back to frame space.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }

    /// Clamp to a `width` x `height` frame.
    ///
    /// Coordinates outside the frame are clamped rather than rejected. Returns
    /// `None` when nothing of the box remains visible (or it is not finite).
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        if width == 0 || height == 0 {
            return None;
        }
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let x1 = self.x1.min(self.x2).clamp(0.0, max_x).round() as u32;
        let x2 = self.x1.max(self.x2).clamp(0.0, max_x).round() as u32;
        let y1 = self.y1.min(self.y2).clamp(0.0, max_y).round() as u32;
        let y2 = self.y1.max(self.y2).clamp(0.0, max_y).round() as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1,
            y: y1,
            width: x2 - x1 + 1,
            height: y2 - y1 + 1,
        })
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Integer rectangle fully inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One raw detector output. Produced fresh per frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_boxes_outside_frame() {
        let b = BoundingBox::new(-20.0, -5.0, 700.0, 100.0);
        let rect = b.clamp_to(640, 480).unwrap();
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.width, 640);
        assert_eq!(rect.height, 101);
    }

    #[test]
    fn swapped_corners_are_normalised() {
        let b = BoundingBox::new(50.0, 60.0, 10.0, 20.0);
        let rect = b.clamp_to(100, 100).unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10, 20, 41, 41));
    }

    #[test]
    fn fully_outside_or_degenerate_boxes_vanish() {
        assert!(BoundingBox::new(700.0, 10.0, 800.0, 20.0).clamp_to(640, 480).is_none());
        assert!(BoundingBox::new(10.0, 10.0, 10.0, 50.0).clamp_to(640, 480).is_none());
        assert!(BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0).clamp_to(640, 480).is_none());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.intersection_over_union(&a) - 1.0).abs() < f32::EPSILON);
        assert_eq!(a.intersection_over_union(&b), 0.0);
    }

    #[test]
    fn detection_reads_array_bbox() {
        let json = r#"{"label":"no-helmet","confidence":0.91,"bbox":[10,20,110,220]}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.label, "no-helmet");
        assert_eq!(det.bbox, BoundingBox::new(10.0, 20.0, 110.0, 220.0));
    }
}
