//! Recorder configuration
//!
//! All knobs live in one serde struct so a JSON file can override any subset of
//! them. Durations are written as integer milliseconds.

use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Marker recorded in place of sensitive input values.
pub const MASK_MARKER: &str = "***MASKED***";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub readiness: ReadinessConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

/// Timing caps for the page readiness pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Hard upper bound for one readiness check
    #[serde(with = "duration_ms")]
    pub max_timeout: Duration,

    /// How long the DOM must go without mutations to count as stable
    #[serde(with = "duration_ms")]
    pub quiet_period: Duration,

    /// Cap for each individual pending image/iframe/video
    #[serde(with = "duration_ms")]
    pub resource_timeout: Duration,

    /// Interval between loading-indicator polls
    #[serde(with = "duration_ms")]
    pub skeleton_poll_interval: Duration,

    /// Give up on loading indicators after this long
    #[serde(with = "duration_ms")]
    pub skeleton_max_wait: Duration,

    /// How long to wait for the host to report a completed page load
    #[serde(with = "duration_ms")]
    pub page_load_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_timeout: Duration::from_secs(10),
            quiet_period: Duration::from_millis(300),
            resource_timeout: Duration::from_secs(3),
            skeleton_poll_interval: Duration::from_millis(100),
            skeleton_max_wait: Duration::from_secs(5),
            page_load_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum spacing between two screenshot calls (host quota is ~2/s)
    #[serde(with = "duration_ms")]
    pub min_capture_interval: Duration,

    /// Replacement for sensitive input values
    pub mask_marker: String,

    /// Maximum characters of visible text kept on click steps
    pub text_limit: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_capture_interval: Duration::from_millis(500),
            mask_marker: MASK_MARKER.to_string(),
            text_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per session
    pub output_dir: PathBuf,

    /// Recorder state file used to resume after a crash
    pub state_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./recordings"),
            state_file: Some(PathBuf::from("./recordings/recorder-state.json")),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            RecorderError::Other(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: RecorderConfig = serde_json::from_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.readiness.max_timeout, Duration::from_secs(10));
        assert_eq!(config.readiness.quiet_period, Duration::from_millis(300));
        assert_eq!(config.capture.min_capture_interval, Duration::from_millis(500));
        assert_eq!(config.capture.mask_marker, "***MASKED***");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "readiness": { "max_timeout": 4000 } }"#;
        let config: RecorderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.readiness.max_timeout, Duration::from_secs(4));
        assert_eq!(config.readiness.quiet_period, Duration::from_millis(300));
        assert_eq!(config.capture.text_limit, 100);
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let json = serde_json::to_value(ReadinessConfig::default()).unwrap();
        assert_eq!(json["quiet_period"], 300);
        assert_eq!(json["skeleton_max_wait"], 5000);
    }
}
