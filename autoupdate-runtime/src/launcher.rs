//! Launching the installer process
//!
//! The launcher decides whether an install may start right now, obtains
//! system authorization when the install needs it, and spawns the installer
//! with its stdio wired up as the control channel.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use autoupdate_config::InstallationType;
use autoupdate_ipc::{
    authorization_right_name, installer_job_label, ChildProcessTransport, EndpointIdentity,
};
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Result of a launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum LaunchStatus {
    Success = 0,
    Canceled = 1,
    /// System authorization is needed but may not be requested yet
    AuthorizeLater = 3,
    Failure = 4,
}

impl LaunchStatus {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Everything needed to start one installer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub host_bundle_path: PathBuf,
    pub bundle_identifier: String,
    pub installer_path: PathBuf,
    /// Shown when asking for system authorization
    pub authorization_prompt: String,
    pub installation_type: InstallationType,
    pub allowing_driver_interaction: bool,
    pub allowing_updater_interaction: bool,
    pub needs_system_authorization: bool,
}

/// Answer from the system authorization prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Granted,
    Canceled,
    Denied,
}

/// Obtains the right to launch the installer in the system domain
#[async_trait]
pub trait SystemAuthorizer: Send + Sync {
    async fn authorize(&self, right_name: &str, prompt: &str) -> AuthorizationOutcome;
}

/// Authorizer for environments where the launcher already holds the right
#[derive(Debug, Clone, Copy, Default)]
pub struct PreauthorizedAuthorizer;

#[async_trait]
impl SystemAuthorizer for PreauthorizedAuthorizer {
    async fn authorize(&self, _right_name: &str, _prompt: &str) -> AuthorizationOutcome {
        AuthorizationOutcome::Granted
    }
}

/// A running installer and the channel to it
pub struct LaunchedInstaller {
    pub child: Child,
    pub transport: ChildProcessTransport,
    pub endpoints: EndpointIdentity,
    pub job_label: String,
}

/// What a launch attempt produced
pub enum LaunchOutcome {
    Launched(LaunchedInstaller),
    NotLaunched(LaunchStatus),
}

impl LaunchOutcome {
    pub fn status(&self) -> LaunchStatus {
        match self {
            LaunchOutcome::Launched(_) => LaunchStatus::Success,
            LaunchOutcome::NotLaunched(status) => *status,
        }
    }

    pub fn into_installer(self) -> Option<LaunchedInstaller> {
        match self {
            LaunchOutcome::Launched(installer) => Some(installer),
            LaunchOutcome::NotLaunched(_) => None,
        }
    }
}

pub struct InstallerLauncher<A> {
    authorizer: A,
}

impl<A: SystemAuthorizer> InstallerLauncher<A> {
    pub fn new(authorizer: A) -> Self {
        Self { authorizer }
    }

    /// Decide whether the request may proceed without spawning anything.
    ///
    /// `None` means the launch may go ahead.
    pub fn preflight(request: &LaunchRequest) -> Option<LaunchStatus> {
        let needs_interaction = request.needs_system_authorization
            || request.installation_type == InstallationType::InteractivePackage;

        if !request.allowing_updater_interaction && needs_interaction {
            error!(
                bundle_id = %request.bundle_identifier,
                "Updater is not allowing user interaction in the launcher"
            );
            return Some(LaunchStatus::Failure);
        }
        if request.needs_system_authorization && !request.allowing_driver_interaction {
            return Some(LaunchStatus::AuthorizeLater);
        }
        None
    }

    pub async fn launch(&self, request: &LaunchRequest) -> LaunchOutcome {
        if let Some(status) = Self::preflight(request) {
            return LaunchOutcome::NotLaunched(status);
        }

        if request.needs_system_authorization {
            let right = authorization_right_name(&request.bundle_identifier);
            match self
                .authorizer
                .authorize(&right, &request.authorization_prompt)
                .await
            {
                AuthorizationOutcome::Granted => {}
                AuthorizationOutcome::Canceled => {
                    warn!(bundle_id = %request.bundle_identifier, "Authorization canceled");
                    return LaunchOutcome::NotLaunched(LaunchStatus::Canceled);
                }
                AuthorizationOutcome::Denied => {
                    error!(bundle_id = %request.bundle_identifier, right = %right, "Authorization denied");
                    return LaunchOutcome::NotLaunched(LaunchStatus::Failure);
                }
            }
        }

        match Self::spawn(request) {
            Ok(installer) => {
                info!(
                    bundle_id = %request.bundle_identifier,
                    job_label = %installer.job_label,
                    pid = ?installer.child.id(),
                    "Installer launched"
                );
                LaunchOutcome::Launched(installer)
            }
            Err(err) => {
                error!(
                    bundle_id = %request.bundle_identifier,
                    path = %request.installer_path.display(),
                    error = %err,
                    "Failed to launch installer"
                );
                LaunchOutcome::NotLaunched(LaunchStatus::Failure)
            }
        }
    }

    // argv is exactly [installer path, bundle identifier]; everything else
    // travels over the channel.
    fn spawn(request: &LaunchRequest) -> RuntimeResult<LaunchedInstaller> {
        let mut child = Command::new(&request.installer_path)
            .arg(&request.bundle_identifier)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                RuntimeError::Launch(format!("{}: {}", request.installer_path.display(), err))
            })?;

        let transport = ChildProcessTransport::from_child(&mut child)?;

        Ok(LaunchedInstaller {
            child,
            transport,
            endpoints: EndpointIdentity::for_bundle(&request.bundle_identifier),
            job_label: installer_job_label(&request.bundle_identifier),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request() -> LaunchRequest {
        LaunchRequest {
            host_bundle_path: PathBuf::from("/Applications/Example.app"),
            bundle_identifier: "com.example.App".to_string(),
            installer_path: PathBuf::from("/nonexistent/Autoupdate"),
            authorization_prompt: "Example wants to install an update.".to_string(),
            installation_type: InstallationType::Application,
            allowing_driver_interaction: true,
            allowing_updater_interaction: true,
            needs_system_authorization: false,
        }
    }

    struct CountingAuthorizer {
        outcome: AuthorizationOutcome,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SystemAuthorizer for CountingAuthorizer {
        async fn authorize(&self, right_name: &str, _prompt: &str) -> AuthorizationOutcome {
            assert_eq!(right_name, "com.example.App-sparkle-auth");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(LaunchStatus::Success.code(), 0);
        assert_eq!(LaunchStatus::Canceled.code(), 1);
        assert_eq!(LaunchStatus::AuthorizeLater.code(), 3);
        assert_eq!(LaunchStatus::Failure.code(), 4);
    }

    #[test]
    fn test_preflight_rules() {
        type Launcher = InstallerLauncher<PreauthorizedAuthorizer>;

        assert_eq!(Launcher::preflight(&request()), None);

        let mut no_updater = request();
        no_updater.allowing_updater_interaction = false;
        assert_eq!(Launcher::preflight(&no_updater), None);

        no_updater.installation_type = InstallationType::InteractivePackage;
        assert_eq!(Launcher::preflight(&no_updater), Some(LaunchStatus::Failure));

        no_updater.installation_type = InstallationType::GuidedPackage;
        no_updater.needs_system_authorization = true;
        assert_eq!(Launcher::preflight(&no_updater), Some(LaunchStatus::Failure));

        let mut no_driver = request();
        no_driver.needs_system_authorization = true;
        no_driver.allowing_driver_interaction = false;
        assert_eq!(Launcher::preflight(&no_driver), Some(LaunchStatus::AuthorizeLater));
    }

    #[tokio::test]
    async fn test_missing_installer_is_failure() {
        let launcher = InstallerLauncher::new(PreauthorizedAuthorizer);
        let outcome = launcher.launch(&request()).await;
        assert_eq!(outcome.status(), LaunchStatus::Failure);
        assert!(outcome.into_installer().is_none());
    }

    #[tokio::test]
    async fn test_spawn_error_names_installer_path() {
        let err = InstallerLauncher::<PreauthorizedAuthorizer>::spawn(&request())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RuntimeError::Launch(ref message) if message.contains("/nonexistent/Autoupdate")
        ));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_canceled_authorization_skips_spawn() {
        let calls = Arc::new(AtomicUsize::new(0));
        let launcher = InstallerLauncher::new(CountingAuthorizer {
            outcome: AuthorizationOutcome::Canceled,
            calls: calls.clone(),
        });
        let mut needs_auth = request();
        needs_auth.needs_system_authorization = true;

        assert_eq!(launcher.launch(&needs_auth).await.status(), LaunchStatus::Canceled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // No authorization requested when the system domain is not involved
        assert_eq!(launcher.launch(&request()).await.status(), LaunchStatus::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_authorization_is_failure() {
        let launcher = InstallerLauncher::new(CountingAuthorizer {
            outcome: AuthorizationOutcome::Denied,
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let mut needs_auth = request();
        needs_auth.needs_system_authorization = true;
        assert_eq!(launcher.launch(&needs_auth).await.status(), LaunchStatus::Failure);
    }
}
