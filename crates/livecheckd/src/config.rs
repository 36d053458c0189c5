//! Session configuration.
//!
//! Layered, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file: explicit path, else `$LIVECHECK_CONFIG` if set
//! 3. `LIVECHECK_*` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use livecheck_core::{ConfigError, DetectorOptions, TrackerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
    #[error("fps must be greater than zero")]
    ZeroFps,
}

/// Effective configuration for a liveness session.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub detector: DetectorOptions,
    /// Frame rate used to pace feed records that carry no timestamp.
    pub fps: u32,
    /// Stop reading the feed once every step is complete.
    pub exit_when_complete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            detector: DetectorOptions::default(),
            fps: 15,
            exit_when_complete: false,
        }
    }
}

/// On-disk TOML layout. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub tracker: TrackerSection,
    pub detector: DetectorSection,
    pub feed: FeedSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerSection {
    pub eye_closed_threshold: Option<f32>,
    pub smile_threshold: Option<f32>,
    pub max_blinks: Option<u32>,
    pub blink_delay_ms: Option<u64>,
    pub reset_on_face_loss: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorSection {
    pub min_face_size: Option<f32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedSection {
    pub fps: Option<u32>,
    pub exit_when_complete: Option<bool>,
}

impl Config {
    /// Load defaults, then the config file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with variables read through `lookup` instead of the
    /// process environment.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigLoadError> {
        let mut config = Self::default();

        let env_path = lookup("LIVECHECK_CONFIG").map(PathBuf::from);
        if let Some(path) = path.or(env_path.as_deref()) {
            tracing::info!(path = %path.display(), "loading config file");
            config.apply_file(read_file(path)?);
        }

        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        let t = file.tracker;
        if let Some(v) = t.eye_closed_threshold {
            self.tracker.eye_closed_threshold = v;
        }
        if let Some(v) = t.smile_threshold {
            self.tracker.smile_threshold = v;
        }
        if let Some(v) = t.max_blinks {
            self.tracker.max_blinks = v;
        }
        if let Some(v) = t.blink_delay_ms {
            self.tracker.blink_delay = Duration::from_millis(v);
        }
        if let Some(v) = t.reset_on_face_loss {
            self.tracker.reset_on_face_loss = v;
        }
        if let Some(v) = file.detector.min_face_size {
            self.detector.min_face_size = v;
        }
        if let Some(v) = file.feed.fps {
            self.fps = v;
        }
        if let Some(v) = file.feed.exit_when_complete {
            self.exit_when_complete = v;
        }
    }

    /// Apply `LIVECHECK_*` overrides. Unparsable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_var(&lookup, "LIVECHECK_EYE_CLOSED_THRESHOLD") {
            self.tracker.eye_closed_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_SMILE_THRESHOLD") {
            self.tracker.smile_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_MAX_BLINKS") {
            self.tracker.max_blinks = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "LIVECHECK_BLINK_DELAY_MS") {
            self.tracker.blink_delay = Duration::from_millis(v);
        }
        if let Some(Flag(v)) = parse_var(&lookup, "LIVECHECK_RESET_ON_FACE_LOSS") {
            self.tracker.reset_on_face_loss = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_MIN_FACE_SIZE") {
            self.detector.min_face_size = v;
        }
        if let Some(v) = parse_var(&lookup, "LIVECHECK_FPS") {
            self.fps = v;
        }
        if let Some(Flag(v)) = parse_var(&lookup, "LIVECHECK_EXIT_WHEN_COMPLETE") {
            self.exit_when_complete = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.tracker.validate()?;
        self.detector.validate()?;
        if self.fps == 0 {
            return Err(ConfigLoadError::ZeroFps);
        }
        Ok(())
    }

    /// Spacing between feed records that carry no timestamp.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    /// Effective values in the on-disk layout.
    pub fn to_file_config(&self) -> FileConfig {
        FileConfig {
            tracker: TrackerSection {
                eye_closed_threshold: Some(self.tracker.eye_closed_threshold),
                smile_threshold: Some(self.tracker.smile_threshold),
                max_blinks: Some(self.tracker.max_blinks),
                blink_delay_ms: Some(self.tracker.blink_delay.as_millis() as u64),
                reset_on_face_loss: Some(self.tracker.reset_on_face_loss),
            },
            detector: DetectorSection {
                min_face_size: Some(self.detector.min_face_size),
            },
            feed: FeedSection {
                fps: Some(self.fps),
                exit_when_complete: Some(self.exit_when_complete),
            },
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Boolean environment value: `1/true/yes/on` or `0/false/no/off`.
struct Flag(bool);

impl std::str::FromStr for Flag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Flag(true)),
            "0" | "false" | "no" | "off" => Ok(Flag(false)),
            _ => Err(()),
        }
    }
}

fn parse_var<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
