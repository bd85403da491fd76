//! Configuration for the autoupdate installer protocol
//!
//! The configuration is split by domain (installation, liveness, logging), loaded once at process start from YAML and/or environment
//! variables, validated, and then exposed through [`global`].

pub mod error;
pub mod loader;
pub mod validation;

pub mod domains;

use once_cell::sync::OnceCell;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    installation::{InstallationConfig, InstallationType, DEFAULT_ARCHIVE_KEY},
    liveness::LivenessConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    AutoupdateConfig,
};

pub use domains::utils::serde_duration;

static GLOBAL_CONFIG: OnceCell<AutoupdateConfig> = OnceCell::new();

/// Install the process-wide configuration.
///
/// Only the first call wins; later calls return the rejected config back
/// to the caller.
pub fn install_global(config: AutoupdateConfig) -> Result<(), AutoupdateConfig> {
    GLOBAL_CONFIG.set(config)
}

/// Access the process-wide configuration, falling back to the built-in
/// defaults if nothing was installed.
pub fn global() -> &'static AutoupdateConfig {
    GLOBAL_CONFIG.get_or_init(AutoupdateConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_defaults_to_builtin_table() {
        let config = global();
        assert_eq!(config.installation.default_type, InstallationType::Application);
        assert_eq!(config.installation.archive_key, DEFAULT_ARCHIVE_KEY);
        // Already initialised by the call above
        assert!(install_global(AutoupdateConfig::default()).is_err());
    }
}
