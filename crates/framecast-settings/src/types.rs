//! Settings structures.
//!
//! Every struct deserializes with `#[serde(default)]` so a partial JSON file
//! only overrides the keys it names.

use std::time::Duration;

use framecast_core::constants::{
    FRAME_INTERVAL, IDLE_CHECK_INTERVAL, IDLE_TIMEOUT, KEEPALIVE_INTERVAL, PONG_TIMEOUT,
};
use framecast_core::logging::LogFormat;
use framecast_core::pattern::PatternKind;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FramecastSettings {
    /// Network and capacity settings.
    pub server: ServerSettings,
    /// Session lifecycle settings.
    pub session: SessionSettings,
    /// Per-connection stream settings.
    pub stream: StreamSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl FramecastSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("session.idleTimeoutSecs", self.session.idle_timeout_secs),
            ("session.idleCheckIntervalSecs", self.session.idle_check_interval_secs),
            ("stream.frameIntervalMs", self.stream.frame_interval_ms),
            ("stream.keepaliveIntervalSecs", self.stream.keepalive_interval_secs),
            ("stream.pongTimeoutSecs", self.stream.pong_timeout_secs),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
            }
        }
        if self.server.max_sessions == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSessions must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` = auto-assign).
    pub port: u16,
    /// Maximum number of live sessions.
    pub max_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_sessions: 1024,
        }
    }
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Evict a session unused for longer than this.
    pub idle_timeout_secs: u64,
    /// How often each session's idle monitor runs.
    pub idle_check_interval_secs: u64,
    /// Evict the session when its stream ends instead of allowing reconnects.
    pub single_use: bool,
    /// Frame producer for new sessions.
    pub pattern: PatternKind,
}

impl SessionSettings {
    /// Idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Idle check interval as a [`Duration`].
    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: IDLE_TIMEOUT.as_secs(),
            idle_check_interval_secs: IDLE_CHECK_INTERVAL.as_secs(),
            single_use: false,
            pattern: PatternKind::default(),
        }
    }
}

/// Per-connection stream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Delay between frames in milliseconds.
    pub frame_interval_ms: u64,
    /// Ping interval in seconds.
    pub keepalive_interval_secs: u64,
    /// Close the connection after this long without a Pong.
    pub pong_timeout_secs: u64,
}

impl StreamSettings {
    /// Frame interval as a [`Duration`].
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Keepalive interval as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Pong timeout as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: FRAME_INTERVAL.as_millis() as u64,
            keepalive_interval_secs: KEEPALIVE_INTERVAL.as_secs(),
            pong_timeout_secs: PONG_TIMEOUT.as_secs(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_lifecycle_constants() {
        let settings = FramecastSettings::default();
        assert_eq!(settings.session.idle_timeout(), Duration::from_secs(300));
        assert_eq!(settings.session.idle_check_interval(), Duration::from_secs(30));
        assert_eq!(settings.stream.keepalive_interval(), Duration::from_secs(3));
        assert_eq!(settings.stream.frame_interval(), Duration::from_millis(33));
        assert!(!settings.session.single_use);
        assert_eq!(settings.session.pattern, PatternKind::Quadrants);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"server":{"port":9000},"session":{"singleUse":true}}"#;
        let settings: FramecastSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(settings.session.single_use);
        assert_eq!(settings.session.idle_timeout_secs, 300);
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(FramecastSettings::default()).unwrap();
        assert!(json["session"]["idleTimeoutSecs"].is_number());
        assert!(json["stream"]["frameIntervalMs"].is_number());
        assert_eq!(json["logging"]["format"], "compact");
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut settings = FramecastSettings::default();
        settings.stream.frame_interval_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("stream.frameIntervalMs"));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut settings = FramecastSettings::default();
        settings.server.max_sessions = 0;
        assert!(settings.validate().is_err());
    }
}
