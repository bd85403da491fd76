//! Configuration loading and environment variable handling

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::installation::InstallationType;
use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::AutoupdateConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "AUTOUPDATE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<AutoupdateConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AutoupdateConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<AutoupdateConfig> {
        let mut config = AutoupdateConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<AutoupdateConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut AutoupdateConfig) -> ConfigResult<()> {
        if let Ok(kind) = self.get_env_var("INSTALLATION_TYPE") {
            config.installation.default_type = InstallationType::from_str(&kind)?;
        }

        if let Ok(key) = self.get_env_var("ARCHIVE_KEY") {
            config.installation.archive_key = key;
        }

        if let Ok(directory) = self.get_env_var("RECORD_DIRECTORY") {
            config.installation.record_directory = directory.into();
        }

        if let Ok(interval) = self.get_env_var("PING_INTERVAL_SECONDS") {
            config.liveness.ping_interval = self.parse_seconds("PING_INTERVAL_SECONDS", &interval)?;
        }

        if let Ok(timeout) = self.get_env_var("RESPONSE_TIMEOUT_SECONDS") {
            config.liveness.response_timeout =
                self.parse_seconds("RESPONSE_TIMEOUT_SECONDS", &timeout)?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    fn parse_seconds(&self, name: &str, value: &str) -> ConfigResult<Duration> {
        let seconds: u64 = value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))?;
        Ok(Duration::from_secs(seconds))
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
