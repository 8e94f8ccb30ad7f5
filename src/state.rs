//! Application state
//!
//! Holds configuration and the shared orchestrator handle

use crate::error::{Error, Result};
use crate::orchestrator::MonitorOrchestrator;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Camera registry base URL
    pub registry_url: String,
    /// Threat detector base URL
    pub detector_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Registry refresh period
    pub registry_interval: Duration,
    /// Detection sampling period
    pub detection_interval: Duration,
    /// Capacity of each log buffer
    pub log_capacity: usize,
    /// Timeout for registry and detector requests
    pub http_timeout: Duration,
    /// Capture input; `{camera_id}` is replaced per camera
    pub capture_input: String,
    /// ffmpeg input format (e.g. `v4l2`), passed as `-f`
    pub capture_input_format: Option<String>,
    /// Frames per second decoded from each capture stream
    pub capture_fps: u32,
    /// ffmpeg executable
    pub ffmpeg_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://127.0.0.1:8000".to_string(),
            detector_url: "http://127.0.0.1:8000".to_string(),
            port: 8080,
            host: "0.0.0.0".to_string(),
            registry_interval: Duration::from_secs(10),
            detection_interval: Duration::from_secs(4),
            log_capacity: 21,
            http_timeout: Duration::from_secs(30),
            capture_input: "/dev/video0".to_string(),
            capture_input_format: None,
            capture_fps: 2,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        let config = Self {
            registry_url: lookup("REGISTRY_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.registry_url),
            detector_url: lookup("DETECTOR_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.detector_url),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            host: lookup("HOST").unwrap_or(defaults.host),
            registry_interval: secs("REGISTRY_INTERVAL_SECS", defaults.registry_interval),
            detection_interval: secs("DETECTION_INTERVAL_SECS", defaults.detection_interval),
            log_capacity: lookup("LOG_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_capacity),
            http_timeout: secs("HTTP_TIMEOUT_SECS", defaults.http_timeout),
            capture_input: lookup("CAPTURE_INPUT").unwrap_or(defaults.capture_input),
            capture_input_format: lookup("CAPTURE_INPUT_FORMAT").filter(|f| !f.is_empty()),
            capture_fps: lookup("CAPTURE_FPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capture_fps),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.registry_interval.is_zero() {
            return Err(Error::Config("REGISTRY_INTERVAL_SECS must be > 0".to_string()));
        }
        if self.detection_interval.is_zero() {
            return Err(Error::Config("DETECTION_INTERVAL_SECS must be > 0".to_string()));
        }
        if self.log_capacity == 0 {
            return Err(Error::Config("LOG_CAPACITY must be > 0".to_string()));
        }
        if self.capture_fps == 0 {
            return Err(Error::Config("CAPTURE_FPS must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// MonitorOrchestrator (registry, streams, logs, scheduler)
    pub orchestrator: Arc<MonitorOrchestrator>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.registry_interval, Duration::from_secs(10));
        assert_eq!(config.detection_interval, Duration::from_secs(4));
        assert_eq!(config.log_capacity, 21);
        assert!(config.capture_input_format.is_none());
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("REGISTRY_URL", "http://registry:8000/"),
            ("DETECTION_INTERVAL_SECS", "2"),
            ("LOG_CAPACITY", "5"),
            ("CAPTURE_INPUT_FORMAT", "v4l2"),
            ("PORT", "not-a-port"),
        ]))
        .unwrap();

        assert_eq!(config.registry_url, "http://registry:8000");
        assert_eq!(config.detection_interval, Duration::from_secs(2));
        assert_eq!(config.log_capacity, 5);
        assert_eq!(config.capture_input_format.as_deref(), Some("v4l2"));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[("REGISTRY_INTERVAL_SECS", "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
