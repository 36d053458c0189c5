//! Livecheck core: active liveness checklist driven by face detections.
//!
//! Frames never enter this crate. A [`FaceModel`] turns each frame into a
//! [`DetectionResult`], the [`LivenessTracker`] folds those into checklist
//! state, and [`checklist`] projects a [`Snapshot`] into display rows.

pub mod checklist;
pub mod config;
pub mod face;
pub mod step;
pub mod tracker;

pub use checklist::{checklist, ChecklistRow};
pub use config::{ConfigError, DetectorOptions, TrackerConfig, MAX_BLINK_DELAY};
pub use face::{
    DetectionError, DetectionResult, FaceBounds, FaceModel, FaceObservation, ObservationError,
};
pub use step::{Step, StepSet};
pub use tracker::{BlinkPhase, BlinkTicket, LivenessState, LivenessTracker, Snapshot, TrackerStats};
