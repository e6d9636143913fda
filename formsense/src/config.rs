//! Configuration types and defaults

use formsense_core::{validate_endpoint, ConnectionConfig, TrackerError, TrackerResult};
use formsense_media::{CameraConfig, DEFAULT_JPEG_QUALITY};
use std::time::Duration;

/// Inference service endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

/// Environment variable that overrides the endpoint in [`SessionConfig::from_env`]
pub const ENDPOINT_ENV_VAR: &str = "FORMSENSE_ENDPOINT";

/// Capture cadence used when nothing else is configured (10 Hz)
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(100);

/// Tracking session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inference service URL (`ws://` or `wss://`)
    pub endpoint: String,
    /// Time between capture cycles
    pub capture_interval: Duration,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// Camera request
    pub camera: CameraConfig,
    /// Service link settings
    pub connection: ConnectionConfig,
    /// Buffered session events per subscriber
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            camera: CameraConfig::default(),
            connection: ConnectionConfig::default(),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Defaults with the endpoint taken from `FORMSENSE_ENDPOINT` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV_VAR) {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                config.endpoint = endpoint.to_string();
            }
        }
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> TrackerResult<()> {
        validate_endpoint(&self.endpoint)?;

        if self.capture_interval.is_zero() {
            return Err(TrackerError::InvalidConfiguration {
                message: "Capture interval must be non-zero".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(TrackerError::InvalidConfiguration {
                message: format!("JPEG quality {} out of range 1-100", self.jpeg_quality),
            });
        }
        if self.event_capacity == 0 {
            return Err(TrackerError::InvalidConfiguration {
                message: "Event capacity must be at least 1".to_string(),
            });
        }
        if self.connection.connect_timeout.is_zero() {
            return Err(TrackerError::InvalidConfiguration {
                message: "Connect timeout must be non-zero".to_string(),
            });
        }
        self.camera.validate()?;

        Ok(())
    }
}
