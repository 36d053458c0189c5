use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    #[error("max_blinks must be at least 1")]
    ZeroMaxBlinks,
    #[error("blink_delay must be greater than zero")]
    ZeroBlinkDelay,
    #[error("blink_delay must be at most {max:?}, got {value:?}")]
    BlinkDelayTooLong { value: Duration, max: Duration },
    #[error("min_face_size must be within [0, 1], got {0}")]
    MinFaceSizeOutOfRange(f32),
}

/// Longest accepted blink confirmation delay.
pub const MAX_BLINK_DELAY: Duration = Duration::from_secs(60);

/// Thresholds and timing for the liveness tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Both eye-open probabilities must fall below this to count as closed.
    pub eye_closed_threshold: f32,
    /// Smiling probability must exceed this to complete the smile step.
    pub smile_threshold: f32,
    /// Blink count saturates here; no further debounce starts once reached.
    pub max_blinks: u32,
    /// Delay between eyes-closed and the blink being counted. Also the
    /// debounce window: no second blink can start inside it.
    pub blink_delay: Duration,
    /// Clear the smile step on frames with zero or several faces.
    /// Off by default: such frames leave blink and smile untouched.
    pub reset_on_face_loss: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            eye_closed_threshold: 0.01,
            smile_threshold: 0.3,
            max_blinks: 3,
            blink_delay: Duration::from_secs(1),
            reset_on_face_loss: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("eye_closed_threshold", self.eye_closed_threshold),
            ("smile_threshold", self.smile_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.max_blinks == 0 {
            return Err(ConfigError::ZeroMaxBlinks);
        }
        if self.blink_delay.is_zero() {
            return Err(ConfigError::ZeroBlinkDelay);
        }
        if self.blink_delay > MAX_BLINK_DELAY {
            return Err(ConfigError::BlinkDelayTooLong {
                value: self.blink_delay,
                max: MAX_BLINK_DELAY,
            });
        }
        Ok(())
    }
}

/// Options applied by face model implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    /// Faces smaller than this fraction of the frame are ignored.
    pub min_face_size: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self { min_face_size: 0.1 }
    }
}

impl DetectorOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_face_size) {
            return Err(ConfigError::MinFaceSizeOutOfRange(self.min_face_size));
        }
        Ok(())
    }
}
