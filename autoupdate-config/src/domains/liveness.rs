//! Liveness ping/pong configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Timings for the out-of-band liveness exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// How often the installer announces itself while working
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub ping_interval: Duration,

    /// How long either side waits for the peer before giving up
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub response_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl Validatable for LivenessConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.ping_interval.as_millis(),
            "ping_interval",
            self.domain_name(),
        )?;
        validate_positive(
            self.response_timeout.as_millis(),
            "response_timeout",
            self.domain_name(),
        )?;

        // Pings must arrive before the peer gives up on us
        if self.ping_interval >= self.response_timeout {
            return Err(self.validation_error(format!(
                "ping_interval ({}s) must be shorter than response_timeout ({}s)",
                self.ping_interval.as_secs(),
                self.response_timeout.as_secs()
            )));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "liveness"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_defaults() {
        let config = LivenessConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.response_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = LivenessConfig {
            ping_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LivenessConfig {
            response_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ping_interval_must_beat_timeout() {
        let config = LivenessConfig {
            ping_interval: Duration::from_secs(30),
            response_timeout: Duration::from_secs(30),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("liveness"));
    }

    #[test]
    fn test_durations_are_seconds_in_yaml() {
        let config: LivenessConfig =
            serde_yaml::from_str("ping_interval: 2\nresponse_timeout: 10\n").unwrap();
        assert_eq!(config.ping_interval, Duration::from_secs(2));
        assert_eq!(config.response_timeout, Duration::from_secs(10));
    }
}
