//! The work an installer performs between stage reports

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autoupdate_ipc::{ArchiveDescriptor, InstallationInput};
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};

const STAGED_DIR: &str = "staged";
const PREVIOUS_DIR: &str = "previous";

/// One implementation per kind of payload.
///
/// Each step runs while the session heartbeats, so a step may take longer
/// than the updater's response timeout.
#[async_trait]
pub trait InstallSteps: Send + Sync {
    /// Make the update's contents available for installation
    async fn extract(&self, input: &InstallationInput) -> RuntimeResult<()>;

    /// Check the extracted update against what the updater asked for
    async fn validate(
        &self,
        input: &InstallationInput,
        appcast_item: Option<&ArchiveDescriptor>,
    ) -> RuntimeResult<()>;

    /// Prepare the install without touching the installed application
    async fn install_stage1(&self, input: &InstallationInput) -> RuntimeResult<()>;

    /// Put the new version in place
    async fn install_stage2(&self, input: &InstallationInput) -> RuntimeResult<()>;

    /// Clean up after a successful install
    async fn install_stage3(&self, input: &InstallationInput) -> RuntimeResult<()>;
}

/// Application installs on the local filesystem.
///
/// The download named in the installation input is taken as already
/// unarchived. Extraction moves it into `<update dir>/staged`, stage 2 moves
/// the old bundle into `<update dir>/previous` and the staged one into its
/// place, and stage 3 removes both directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileInstallSteps;

impl FileInstallSteps {
    fn update_directory(input: &InstallationInput) -> &Path {
        Path::new(&input.update_directory_path)
    }

    fn staged_path(input: &InstallationInput) -> PathBuf {
        Self::update_directory(input)
            .join(STAGED_DIR)
            .join(&input.download_name)
    }

    fn previous_path(input: &InstallationInput) -> RuntimeResult<PathBuf> {
        let host = Path::new(&input.host_bundle_path);
        let name = host.file_name().ok_or_else(|| {
            RuntimeError::Install(format!("host bundle path {} has no file name", host.display()))
        })?;
        Ok(Self::update_directory(input).join(PREVIOUS_DIR).join(name))
    }

    async fn require(path: &Path, what: &str) -> RuntimeResult<()> {
        if tokio::fs::try_exists(path).await? {
            Ok(())
        } else {
            Err(RuntimeError::Install(format!("{} {} does not exist", what, path.display())))
        }
    }
}

async fn remove_all(path: &Path) -> RuntimeResult<()> {
    let result = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl InstallSteps for FileInstallSteps {
    async fn extract(&self, input: &InstallationInput) -> RuntimeResult<()> {
        let download = Self::update_directory(input).join(&input.download_name);
        Self::require(&download, "update archive").await?;

        let staged = Self::staged_path(input);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        remove_all(&staged).await?;
        tokio::fs::rename(&download, &staged).await?;
        debug!(staged = %staged.display(), "Staged update");
        Ok(())
    }

    async fn validate(
        &self,
        input: &InstallationInput,
        appcast_item: Option<&ArchiveDescriptor>,
    ) -> RuntimeResult<()> {
        if input.installation_type.is_package() {
            return Err(RuntimeError::Install(format!(
                "{} installs are not handled by file installs",
                input.installation_type
            )));
        }

        if let Some(item) = appcast_item {
            if item.version != input.expected_version {
                return Err(RuntimeError::Install(format!(
                    "appcast item is version {}, expected {}",
                    item.version, input.expected_version
                )));
            }
            if let (Some(expected), Some(listed)) = (&input.ed_signature, &item.ed_signature) {
                if expected != listed {
                    return Err(RuntimeError::Install(
                        "signature does not match the appcast item".to_string(),
                    ));
                }
            }
        }

        Self::require(&Self::staged_path(input), "staged update").await
    }

    async fn install_stage1(&self, input: &InstallationInput) -> RuntimeResult<()> {
        let host = Path::new(&input.host_bundle_path);
        if let Some(parent) = host.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            Self::require(parent, "install location").await?;
        }
        Self::require(&Self::staged_path(input), "staged update").await
    }

    async fn install_stage2(&self, input: &InstallationInput) -> RuntimeResult<()> {
        let host = Path::new(&input.host_bundle_path);
        let staged = Self::staged_path(input);
        Self::require(&staged, "staged update").await?;

        if tokio::fs::try_exists(host).await? {
            let previous = Self::previous_path(input)?;
            if let Some(parent) = previous.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            remove_all(&previous).await?;
            tokio::fs::rename(host, &previous).await?;
        }

        tokio::fs::rename(&staged, host).await?;
        info!(host = %host.display(), version = %input.expected_version, "Installed new version");
        Ok(())
    }

    async fn install_stage3(&self, input: &InstallationInput) -> RuntimeResult<()> {
        let update_directory = Self::update_directory(input);
        remove_all(&update_directory.join(PREVIOUS_DIR)).await?;
        remove_all(&update_directory.join(STAGED_DIR)).await
    }
}
