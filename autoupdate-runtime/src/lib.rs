//! Autoupdate session runtime
//!
//! This crate drives the install exchange from either end of the control
//! channel: the installer session and the install steps it runs, the
//! updater session, the stage record store used to resume after stage 1, and
//! the launcher that starts the installer process.

pub mod display;
pub mod error;
pub mod installer;
pub mod launcher;
pub mod record;
pub mod steps;
pub mod updater;

// Re-export main types
pub use display::{IdentityVersionDisplay, VersionDisplay};
pub use error::{RuntimeError, RuntimeResult};
pub use installer::{InstallerInput, InstallerSession};
pub use launcher::{
    AuthorizationOutcome, InstallerLauncher, LaunchOutcome, LaunchRequest, LaunchStatus,
    LaunchedInstaller, PreauthorizedAuthorizer, SystemAuthorizer,
};
pub use record::{FileStageRecordStore, MemoryStageRecordStore, StageRecord, StageRecordStore};
pub use steps::{FileInstallSteps, InstallSteps};
pub use updater::UpdaterSession;
