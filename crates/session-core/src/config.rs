//! Session configuration.
//!
//! All timing behavior lives here rather than in hidden constants: the
//! reconnect window, the quality sampling cadence, and the quality
//! classification thresholds. Values load from environment variables with
//! these defaults.

use crate::media::CameraConstraints;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// How long a peer session keeps attempting ICE restart after transport loss
/// before giving up and reporting `NegotiationFailed`.
pub const DEFAULT_RECONNECT_WINDOW_SECONDS: u64 = 15;

/// Cadence of connection-quality sampling per peer.
pub const DEFAULT_QUALITY_SAMPLE_INTERVAL_SECONDS: u64 = 3;

/// Retained chat history per meeting (oldest entries are dropped past this).
pub const DEFAULT_CHAT_HISTORY_LIMIT: usize = 500;

/// Fixed backoff between WebSocket signaling reconnect attempts.
pub const DEFAULT_SIGNALING_RETRY_SECONDS: u64 = 2;

/// Default camera capture width.
pub const DEFAULT_CAMERA_WIDTH: u32 = 1280;

/// Default camera capture height.
pub const DEFAULT_CAMERA_HEIGHT: u32 = 720;

/// Round-trip time below which a connection is classified `Good` (ms).
pub const QUALITY_GOOD_MAX_RTT_MS: u32 = 150;

/// Packet loss below which a connection is classified `Good` (%).
pub const QUALITY_GOOD_MAX_LOSS_PCT: f32 = 2.0;

/// Round-trip time above which a connection is classified `Poor` (ms).
pub const QUALITY_POOR_MIN_RTT_MS: u32 = 400;

/// Packet loss above which a connection is classified `Poor` (%).
pub const QUALITY_POOR_MIN_LOSS_PCT: f32 = 8.0;

/// Session configuration, loaded from environment variables with defaults.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnect window after transport loss (default: 15s).
    pub reconnect_window: Duration,

    /// Connection-quality sampling interval (default: 3s).
    pub quality_sample_interval: Duration,

    /// Maximum retained chat messages (default: 500).
    pub chat_history_limit: usize,

    /// Backoff between signaling reconnect attempts (default: 2s).
    pub signaling_retry_interval: Duration,

    /// Camera acquisition constraints.
    pub camera: CameraConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_window: Duration::from_secs(DEFAULT_RECONNECT_WINDOW_SECONDS),
            quality_sample_interval: Duration::from_secs(DEFAULT_QUALITY_SAMPLE_INTERVAL_SECONDS),
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
            signaling_retry_interval: Duration::from_secs(DEFAULT_SIGNALING_RETRY_SECONDS),
            camera: CameraConstraints::default(),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was present but not parseable / out of range.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is set but invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let reconnect_window = Duration::from_secs(parse_nonzero_u64(
            vars,
            "MEET_RECONNECT_WINDOW_SECONDS",
            DEFAULT_RECONNECT_WINDOW_SECONDS,
        )?);

        let quality_sample_interval = Duration::from_secs(parse_nonzero_u64(
            vars,
            "MEET_QUALITY_SAMPLE_INTERVAL_SECONDS",
            DEFAULT_QUALITY_SAMPLE_INTERVAL_SECONDS,
        )?);

        let signaling_retry_interval = Duration::from_secs(parse_nonzero_u64(
            vars,
            "MEET_SIGNALING_RETRY_SECONDS",
            DEFAULT_SIGNALING_RETRY_SECONDS,
        )?);

        let chat_history_limit = match vars.get("MEET_CHAT_HISTORY_LIMIT") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue(format!("MEET_CHAT_HISTORY_LIMIT={raw}"))
            })?,
            None => DEFAULT_CHAT_HISTORY_LIMIT,
        };

        let camera_width = parse_nonzero_u64(vars, "MEET_CAMERA_WIDTH", u64::from(DEFAULT_CAMERA_WIDTH))?;
        let camera_height =
            parse_nonzero_u64(vars, "MEET_CAMERA_HEIGHT", u64::from(DEFAULT_CAMERA_HEIGHT))?;

        let camera = CameraConstraints {
            width: u32::try_from(camera_width)
                .map_err(|_| ConfigError::InvalidValue(format!("MEET_CAMERA_WIDTH={camera_width}")))?,
            height: u32::try_from(camera_height).map_err(|_| {
                ConfigError::InvalidValue(format!("MEET_CAMERA_HEIGHT={camera_height}"))
            })?,
            ..CameraConstraints::default()
        };

        Ok(Self {
            reconnect_window,
            quality_sample_interval,
            chat_history_limit,
            signaling_retry_interval,
            camera,
        })
    }
}

fn parse_nonzero_u64(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match vars.get(key) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(format!("{key}={raw}"))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.reconnect_window, Duration::from_secs(15));
        assert_eq!(config.quality_sample_interval, Duration::from_secs(3));
        assert_eq!(config.chat_history_limit, 500);
        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.camera.height, 720);
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("MEET_RECONNECT_WINDOW_SECONDS".to_string(), "30".to_string()),
            ("MEET_CAMERA_WIDTH".to_string(), "640".to_string()),
            ("MEET_CAMERA_HEIGHT".to_string(), "480".to_string()),
        ]);

        let config = SessionConfig::from_vars(&vars).unwrap();
        assert_eq!(config.reconnect_window, Duration::from_secs(30));
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
    }

    #[test]
    fn test_zero_window_is_invalid() {
        let vars = HashMap::from([("MEET_RECONNECT_WINDOW_SECONDS".to_string(), "0".to_string())]);
        assert!(matches!(
            SessionConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_garbage_value_is_invalid() {
        let vars = HashMap::from([(
            "MEET_QUALITY_SAMPLE_INTERVAL_SECONDS".to_string(),
            "soon".to_string(),
        )]);
        assert!(matches!(
            SessionConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
