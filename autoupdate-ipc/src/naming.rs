//! Endpoint naming derived from an application's bundle identifier
//!
//! Both processes compute the same names independently. Names are
//! `<bundle-id>-<suffix>`; identifiers too long for [`MAX_SERVICE_NAME_LEN`]
//! are truncated and tagged with a digest of the full identifier so distinct
//! identifiers still map to distinct names. No validation of the identifier
//! happens here.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const INSTALLER_SUFFIX: &str = "spki";
const STATUS_INFO_SUFFIX: &str = "spks";
const PROGRESS_AGENT_SUFFIX: &str = "spkp";

const INSTALLER_JOB_SUFFIX: &str = "sparkle-updater";
const PROGRESS_JOB_SUFFIX: &str = "sparkle-progress";
const AUTHORIZATION_RIGHT_SUFFIX: &str = "sparkle-auth";

/// Hex digits of the identifier digest used for long names
const DIGEST_LEN: usize = 16;

/// Longest service name either side derives.
///
/// Part of the protocol: it is not configurable, since both processes must
/// arrive at the same name without talking to each other.
pub const MAX_SERVICE_NAME_LEN: usize = 128;

/// Service names for one application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointIdentity {
    pub installer_service: String,
    pub status_info_service: String,
    pub progress_agent_service: String,
}

impl EndpointIdentity {
    /// Derive all three names
    pub fn for_bundle(bundle_identifier: &str) -> Self {
        Self::with_limit(bundle_identifier, MAX_SERVICE_NAME_LEN)
    }

    fn with_limit(bundle_identifier: &str, max_len: usize) -> Self {
        Self {
            installer_service: service_name(bundle_identifier, INSTALLER_SUFFIX, max_len),
            status_info_service: service_name(bundle_identifier, STATUS_INFO_SUFFIX, max_len),
            progress_agent_service: service_name(bundle_identifier, PROGRESS_AGENT_SUFFIX, max_len),
        }
    }
}

pub fn installer_service_name(bundle_identifier: &str) -> String {
    EndpointIdentity::for_bundle(bundle_identifier).installer_service
}

pub fn status_info_service_name(bundle_identifier: &str) -> String {
    EndpointIdentity::for_bundle(bundle_identifier).status_info_service
}

pub fn progress_agent_service_name(bundle_identifier: &str) -> String {
    EndpointIdentity::for_bundle(bundle_identifier).progress_agent_service
}

/// Job label under which the installer process is registered
pub fn installer_job_label(bundle_identifier: &str) -> String {
    format!("{}-{}", bundle_identifier, INSTALLER_JOB_SUFFIX)
}

/// Job label under which the progress agent is registered
pub fn progress_job_label(bundle_identifier: &str) -> String {
    format!("{}-{}", bundle_identifier, PROGRESS_JOB_SUFFIX)
}

/// Name of the authorization right requested before a system-domain launch
pub fn authorization_right_name(bundle_identifier: &str) -> String {
    format!("{}-{}", bundle_identifier, AUTHORIZATION_RIGHT_SUFFIX)
}

fn service_name(bundle_identifier: &str, suffix: &str, max_len: usize) -> String {
    let plain = format!("{}-{}", bundle_identifier, suffix);
    if plain.len() <= max_len {
        return plain;
    }

    let digest = Sha256::digest(bundle_identifier.as_bytes());
    let mut tag = hex::encode(digest);
    tag.truncate(DIGEST_LEN);

    // <prefix>-<digest>-<suffix>
    let reserved = DIGEST_LEN + suffix.len() + 2;
    let budget = max_len.saturating_sub(reserved);
    let prefix = truncate_on_char_boundary(bundle_identifier, budget);
    format!("{}-{}-{}", prefix, tag, suffix)
}

fn truncate_on_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
