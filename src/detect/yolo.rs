//! Decoding of YOLO-style detection heads.
//!
//! Expects the common `[1, 4 + num_classes, num_anchors]` layout: rows 0..4
//! hold `cx, cy, w, h` in model-input pixels, the remaining rows hold one
//! score per class. Kept free of any inference runtime so it can be tested
//! on plain slices.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Scores below this never leave the decoder. The policy threshold applied by
/// the classifier is usually much higher.
pub const MIN_DECODE_SCORE: f32 = 0.05;

pub const DEFAULT_NMS_IOU: f32 = 0.45;

/// Decode a channel-major output tensor.
///
/// `scale_x`/`scale_y` map model-input coordinates back to frame pixels.
pub fn decode_channel_major(
    data: &[f32],
    channels: usize,
    anchors: usize,
    class_names: &[String],
    scale_x: f32,
    scale_y: f32,
) -> Result<Vec<Detection>> {
    if channels < 5 {
        return Err(anyhow!("detection head has {} channels, need at least 5", channels));
    }
    if data.len() != channels * anchors {
        return Err(anyhow!(
            "output has {} values, expected {}x{}",
            data.len(),
            channels,
            anchors
        ));
    }
    let num_classes = channels - 4;
    let at = |channel: usize, anchor: usize| data[channel * anchors + anchor];

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (best_class, best_score) = (0..num_classes)
            .map(|class| (class, at(4 + class, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });
        if !best_score.is_finite() || best_score < MIN_DECODE_SCORE {
            continue;
        }
        let label = class_names
            .get(best_class)
            .cloned()
            .unwrap_or_else(|| format!("class_{best_class}"));
        let bbox = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        )
        .scaled(scale_x, scale_y);
        detections.push(Detection::new(label, best_score.min(1.0), bbox));
    }
    Ok(non_maximum_suppression(detections, DEFAULT_NMS_IOU))
}

/// Remove overlapping duplicates of the same label, keeping the most confident.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let duplicate = kept.iter().any(|k| {
            k.label == candidate.label
                && k.bbox.intersection_over_union(&candidate.bbox) > iou_threshold
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["helmet".to_string(), "no-helmet".to_string()]
    }

    #[test]
    fn decodes_best_class_per_anchor() {
        // 6 channels (cx, cy, w, h, helmet, no-helmet) x 2 anchors.
        let data = vec![
            10.0, 50.0, // cx
            10.0, 50.0, // cy
            4.0, 10.0, // w
            4.0, 10.0, // h
            0.9, 0.1, // helmet
            0.2, 0.8, // no-helmet
        ];
        let dets = decode_channel_major(&data, 6, 2, &names(), 2.0, 2.0).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].label, "helmet");
        assert_eq!(dets[0].bbox, BoundingBox::new(16.0, 16.0, 24.0, 24.0));
        assert_eq!(dets[1].label, "no-helmet");
        assert!((dets[1].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn low_scores_are_dropped() {
        let data = vec![1.0, 1.0, 1.0, 1.0, 0.01, 0.02];
        let dets = decode_channel_major(&data, 6, 1, &names(), 1.0, 1.0).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn rejects_shape_mismatch() {
        assert!(decode_channel_major(&[0.0; 5], 6, 1, &names(), 1.0, 1.0).is_err());
        assert!(decode_channel_major(&[0.0; 4], 4, 1, &names(), 1.0, 1.0).is_err());
    }

    #[test]
    fn nms_keeps_best_of_overlapping_same_label() {
        let dets = vec![
            Detection::new("helmet", 0.6, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new("helmet", 0.9, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            Detection::new("no-helmet", 0.5, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
        ];
        let kept = non_maximum_suppression(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].label, "no-helmet");
    }
}
