//! Classification of raw detections into violations and compliant objects.
//!
//! The label taxonomy is data: a set of label strings that mean "required
//! PPE is missing". Adding a class only requires a config change.

use std::collections::HashSet;

use serde::Serialize;

use crate::detect::Detection;
use crate::error::ConfigError;
use crate::frame::FrameTimestamp;

/// Labels that indicate missing PPE. Matching is exact and case-sensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViolationLabels(HashSet<String>);

impl ViolationLabels {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// Fails with `ConfigError::EmptyViolationLabels` for an empty set, for
    /// callers that expect violation detection to be possible.
    pub fn require_non_empty(self) -> Result<Self, ConfigError> {
        if self.0.is_empty() {
            Err(ConfigError::EmptyViolationLabels)
        } else {
            Ok(self)
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Labels in sorted order, for logs and summaries.
    pub fn sorted(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.0.iter().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    Violation,
    Compliant,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub status: SafetyStatus,
}

impl ClassifiedDetection {
    pub fn is_violation(&self) -> bool {
        self.status == SafetyStatus::Violation
    }

    pub fn label(&self) -> &str {
        &self.detection.label
    }
}

/// Drop detections below `confidence_threshold`, then tag the rest.
///
/// A detection is kept when `confidence >= confidence_threshold`; a NaN
/// confidence never passes. Input order is preserved.
pub fn classify(
    detections: &[Detection],
    confidence_threshold: f32,
    violation_labels: &ViolationLabels,
) -> Vec<ClassifiedDetection> {
    detections
        .iter()
        .filter(|d| d.confidence >= confidence_threshold)
        .map(|d| ClassifiedDetection {
            detection: d.clone(),
            status: if violation_labels.contains(&d.label) {
                SafetyStatus::Violation
            } else {
                SafetyStatus::Compliant
            },
        })
        .collect()
}

/// Classification policy for one run.
#[derive(Clone, Debug)]
pub struct Classifier {
    confidence_threshold: f32,
    violation_labels: ViolationLabels,
}

impl Classifier {
    pub fn new(confidence_threshold: f32, violation_labels: ViolationLabels) -> Self {
        Self {
            confidence_threshold,
            violation_labels,
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn violation_labels(&self) -> &ViolationLabels {
        &self.violation_labels
    }

    pub fn classify(&self, detections: &[Detection]) -> Vec<ClassifiedDetection> {
        classify(detections, self.confidence_threshold, &self.violation_labels)
    }
}

/// Classified view of a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameResult {
    pub frame_index: u64,
    pub timestamp: FrameTimestamp,
    pub detections: Vec<ClassifiedDetection>,
    pub violation_count: usize,
}

impl FrameResult {
    pub fn new(
        frame_index: u64,
        timestamp: FrameTimestamp,
        detections: Vec<ClassifiedDetection>,
    ) -> Self {
        let violation_count = detections.iter().filter(|d| d.is_violation()).count();
        Self {
            frame_index,
            timestamp,
            detections,
            violation_count,
        }
    }

    pub fn has_violations(&self) -> bool {
        self.violation_count > 0
    }

    /// Distinct violation labels in first-seen order.
    pub fn violation_types(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.detections
            .iter()
            .filter(|d| d.is_violation())
            .filter(|d| seen.insert(d.label()))
            .map(|d| d.label().to_string())
            .collect()
    }
}
