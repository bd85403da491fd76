//! Version display capability
//!
//! Used only to present versions in log lines and progress output; never
//! consulted for protocol decisions.

/// Adjusts a pair of version strings for display
pub trait VersionDisplay: Send + Sync {
    fn format_versions(&self, version_a: &str, version_b: &str) -> (String, String);
}

/// Shows versions exactly as given
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityVersionDisplay;

impl VersionDisplay for IdentityVersionDisplay {
    fn format_versions(&self, version_a: &str, version_b: &str) -> (String, String) {
        (version_a.to_string(), version_b.to_string())
    }
}

impl<F> VersionDisplay for F
where
    F: Fn(&str, &str) -> (String, String) + Send + Sync,
{
    fn format_versions(&self, version_a: &str, version_b: &str) -> (String, String) {
        self(version_a, version_b)
    }
}
