//! Per-frame face observations and the face model boundary.
//!
//! The tracker never sees images. Whatever turns a frame into faces (an
//! on-device detector, a remote service, a recorded feed) implements
//! [`FaceModel`] and hands the tracker a [`DetectionResult`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative size of a detected face box, as a fraction of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub width: f32,
    pub height: f32,
}

/// One face reported by the model for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Probability that the left eye is open, in `[0, 1]`.
    pub left_eye_open: f32,
    /// Probability that the right eye is open, in `[0, 1]`.
    pub right_eye_open: f32,
    /// Probability that the face is smiling, in `[0, 1]`.
    pub smiling: f32,
    /// Face box size relative to the frame, when the model reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<FaceBounds>,
    /// 5-point landmarks: left eye, right eye, nose, left mouth, right mouth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<[(f32, f32); 5]>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObservationError {
    #[error("{field} probability out of range: {value}")]
    ProbabilityOutOfRange { field: &'static str, value: f32 },
    #[error("face bounds out of range: {width}x{height}")]
    BoundsOutOfRange { width: f32, height: f32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("face model failed: {0}")]
    Model(String),
    #[error("malformed observation: {0}")]
    Malformed(#[from] ObservationError),
}

/// Output of the face model for exactly one frame.
pub type DetectionResult = Result<Vec<FaceObservation>, DetectionError>;

/// Converts one frame into a [`DetectionResult`].
pub trait FaceModel {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> DetectionResult;
}

fn unit_interval(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

impl FaceObservation {
    pub fn new(left_eye_open: f32, right_eye_open: f32, smiling: f32) -> Self {
        Self {
            left_eye_open,
            right_eye_open,
            smiling,
            bounds: None,
            landmarks: None,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, width: f32, height: f32) -> Self {
        self.bounds = Some(FaceBounds { width, height });
        self
    }

    /// Reject NaN or out-of-range values before they reach the tracker.
    pub fn validate(&self) -> Result<(), ObservationError> {
        for (field, value) in [
            ("left_eye_open", self.left_eye_open),
            ("right_eye_open", self.right_eye_open),
            ("smiling", self.smiling),
        ] {
            if !unit_interval(value) {
                return Err(ObservationError::ProbabilityOutOfRange { field, value });
            }
        }
        if let Some(FaceBounds { width, height }) = self.bounds {
            if !unit_interval(width) || !unit_interval(height) {
                return Err(ObservationError::BoundsOutOfRange { width, height });
            }
        }
        Ok(())
    }

    /// Both eyes strictly below `threshold` open probability.
    pub fn eyes_closed(&self, threshold: f32) -> bool {
        self.left_eye_open < threshold && self.right_eye_open < threshold
    }

    /// Smaller side of the face box, or `None` if the model gave no bounds.
    pub fn relative_size(&self) -> Option<f32> {
        self.bounds.map(|b| b.width.min(b.height))
    }
}
