//! Installation type table and payload key constants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_required_string, Validatable};

/// Payload key under which the appcast item's archive descriptor travels
pub const DEFAULT_ARCHIVE_KEY: &str = "SPUAppcastItemArchiveKey";

/// Class of installer behaviour that handles an update payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallationType {
    /// Standard application bundle replacement
    Application,
    /// Installer package flow with guided UX
    GuidedPackage,
    /// Interactive installer package flow (deprecated, use `GuidedPackage`)
    InteractivePackage,
}

impl InstallationType {
    /// Every recognised installation type
    pub const ALL: [InstallationType; 3] = [
        InstallationType::Application,
        InstallationType::GuidedPackage,
        InstallationType::InteractivePackage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationType::Application => "Application",
            InstallationType::GuidedPackage => "GuidedPackage",
            InstallationType::InteractivePackage => "InteractivePackage",
        }
    }

    pub fn is_deprecated(&self) -> bool {
        matches!(self, InstallationType::InteractivePackage)
    }

    /// Whether the payload is an installer package rather than an app bundle
    pub fn is_package(&self) -> bool {
        !matches!(self, InstallationType::Application)
    }

    /// Parse a possibly-absent value; absence is as invalid as an unknown name
    pub fn parse_optional(value: Option<&str>) -> ConfigResult<Self> {
        match value {
            Some(value) => value.parse(),
            None => Err(ConfigError::InvalidInstallationType(
                "no installation type given".to_string(),
            )),
        }
    }
}

impl Default for InstallationType {
    fn default() -> Self {
        InstallationType::Application
    }
}

impl fmt::Display for InstallationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallationType {
    type Err = ConfigError;

    // Names are matched exactly; the set is closed
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstallationType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidInstallationType(s.to_string()))
    }
}

/// Installation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    /// Installation type used when the caller does not name one
    pub default_type: InstallationType,

    /// Payload key for the archive descriptor
    #[serde(default = "default_archive_key")]
    pub archive_key: String,

    /// Where the installer keeps stage-1 completion records
    #[serde(default = "default_record_directory")]
    pub record_directory: PathBuf,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            default_type: InstallationType::default(),
            archive_key: default_archive_key(),
            record_directory: default_record_directory(),
        }
    }
}

impl Validatable for InstallationConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.archive_key, "archive_key", self.domain_name())?;
        if self.record_directory.as_os_str().is_empty() {
            return Err(self.validation_error("record_directory cannot be empty"));
        }

        if self.default_type.is_deprecated() {
            tracing::warn!(
                installation_type = %self.default_type,
                "Deprecated installation type configured; prefer GuidedPackage"
            );
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "installation"
    }
}

fn default_archive_key() -> String {
    DEFAULT_ARCHIVE_KEY.to_string()
}

fn default_record_directory() -> PathBuf {
    std::env::temp_dir().join("autoupdate").join("records")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installation_type_from_str() {
        assert_eq!(
            InstallationType::from_str("Application").unwrap(),
            InstallationType::Application
        );
        assert_eq!(
            InstallationType::from_str("GuidedPackage").unwrap(),
            InstallationType::GuidedPackage
        );
        assert_eq!(
            InstallationType::from_str("InteractivePackage").unwrap(),
            InstallationType::InteractivePackage
        );
        assert!(InstallationType::from_str("application").is_err());
        assert!(InstallationType::from_str("").is_err());
        assert!(InstallationType::from_str("Package").is_err());
    }

    #[test]
    fn test_missing_installation_type_is_invalid() {
        let err = InstallationType::parse_optional(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInstallationType(_)));
        assert_eq!(
            InstallationType::parse_optional(Some("GuidedPackage")).unwrap(),
            InstallationType::GuidedPackage
        );
    }

    #[test]
    fn test_default_is_application() {
        assert_eq!(InstallationType::default(), InstallationType::Application);
        assert!(!InstallationType::Application.is_package());
        assert!(InstallationType::GuidedPackage.is_package());
        assert!(InstallationType::InteractivePackage.is_deprecated());
    }

    #[test]
    fn test_serde_uses_exact_names() {
        let yaml = serde_yaml::to_string(&InstallationType::GuidedPackage).unwrap();
        assert_eq!(yaml.trim(), "GuidedPackage");
        assert!(serde_yaml::from_str::<InstallationType>("Bogus").is_err());
    }

    #[test]
    fn test_installation_config_validation() {
        let mut config = InstallationConfig::default();
        assert!(config.validate().is_ok());

        config.archive_key.clear();
        assert!(config.validate().is_err());

        let mut no_records = InstallationConfig::default();
        assert!(no_records.record_directory.ends_with("autoupdate/records"));
        no_records.record_directory = PathBuf::new();
        let err = no_records.validate().unwrap_err();
        assert!(err.to_string().contains("record_directory"));
    }
}
