//! Domain-specific configuration modules

pub mod installation;
pub mod liveness;
pub mod logging;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Complete configuration table, loaded once per process
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AutoupdateConfig {
    /// Installation type and payload key constants
    #[serde(default)]
    pub installation: installation::InstallationConfig,

    /// Liveness ping/pong timings
    #[serde(default)]
    pub liveness: liveness::LivenessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl AutoupdateConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.installation.validate()?;
        self.liveness.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = AutoupdateConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
