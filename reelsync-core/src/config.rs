//! # Playback Configuration
//!
//! Buffering, sync and decode-scheduling knobs. Loadable from JSON; every
//! field is optional and falls back to its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decoder::{DecodeMode, WorkerTiming};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Video frames held ahead of presentation
    pub video_queue_capacity: usize,
    /// Audio packets held ahead of presentation
    pub audio_queue_capacity: usize,
    /// Video look-ahead in seconds at 1x
    pub video_buffer_ahead: f64,
    /// Audio look-ahead in seconds at 1x
    pub audio_buffer_ahead: f64,
    /// Scales both look-ahead windows
    pub playback_rate: f64,
    /// Snap engine time to the backend clock when enabled
    pub drift_correction: bool,
    /// Seconds of divergence tolerated before snapping
    pub drift_tolerance: f64,
    /// Slack around the buffered audio range before audio is resynced
    pub audio_sync_tolerance: f64,
    pub decode_mode: DecodeMode,
    /// Threaded workers: max wait for queue space per push attempt
    pub push_timeout_ms: u64,
    /// Threaded workers: sleep while paused or after end of stream
    pub worker_idle_ms: u64,
    /// Threaded workers: backoff after an empty read
    pub worker_retry_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            video_queue_capacity: 5,
            audio_queue_capacity: 5,
            video_buffer_ahead: 0.5,
            audio_buffer_ahead: 1.0,
            playback_rate: 1.0,
            drift_correction: true,
            drift_tolerance: 0.1,
            audio_sync_tolerance: 0.1,
            decode_mode: DecodeMode::Sync,
            push_timeout_ms: 50,
            worker_idle_ms: 10,
            worker_retry_ms: 5,
        }
    }
}

impl PlaybackConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_queue_capacity == 0 || self.audio_queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacity must be at least 1".into()));
        }
        if !(self.video_buffer_ahead > 0.0 && self.audio_buffer_ahead > 0.0) {
            return Err(ConfigError::Invalid("buffer-ahead windows must be positive".into()));
        }
        if !(self.playback_rate > 0.0 && self.playback_rate.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "playback rate {} out of range",
                self.playback_rate
            )));
        }
        if self.drift_tolerance < 0.0 || self.audio_sync_tolerance < 0.0 {
            return Err(ConfigError::Invalid("tolerances cannot be negative".into()));
        }
        Ok(())
    }

    pub fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode_mode = mode;
        self
    }

    pub fn worker_timing(&self) -> WorkerTiming {
        WorkerTiming {
            push_timeout: Duration::from_millis(self.push_timeout_ms),
            idle: Duration::from_millis(self.worker_idle_ms),
            retry: Duration::from_millis(self.worker_retry_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            PlaybackConfig::from_json_str(r#"{ "video_queue_capacity": 8, "decode_mode": "Threaded" }"#)
                .unwrap();
        assert_eq!(config.video_queue_capacity, 8);
        assert_eq!(config.decode_mode, DecodeMode::Threaded);
        assert_eq!(config.audio_queue_capacity, 5);
        assert_eq!(config.drift_tolerance, 0.1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            PlaybackConfig::from_json_str(r#"{ "audio_queue_capacity": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PlaybackConfig::from_json_str(r#"{ "playback_rate": -1.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PlaybackConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playback.json");

        let config = PlaybackConfig {
            audio_buffer_ahead: 2.0,
            drift_correction: false,
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(PlaybackConfig::load(&path).unwrap(), config);
        assert!(matches!(
            PlaybackConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
