//! Installer process started by the launcher
//!
//! argv is `[path, bundle identifier]`. The control channel is this process's
//! stdin/stdout, so everything the installer logs goes to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use autoupdate_config::ConfigLoader;
use autoupdate_ipc::StdioTransport;
use autoupdate_runtime::{FileInstallSteps, FileStageRecordStore, InstallerSession};

#[derive(Parser)]
#[command(author, version, about = "Install an update on behalf of an updater", long_about = None)]
struct InstallerCli {
    /// Bundle identifier of the host application
    bundle_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = InstallerCli::parse();

    let config = ConfigLoader::new()
        .from_env()
        .context("Failed to load configuration from environment")?;
    autoupdate_logging::init_logging_from_config(&config.logging)?;
    if autoupdate_config::install_global(config.clone()).is_err() {
        debug!("Global configuration already installed");
    }

    let records = FileStageRecordStore::new(config.installation.record_directory.clone());
    debug!(directory = %records.directory().display(), "Using stage records");

    let mut session =
        InstallerSession::with_config(&cli.bundle_id, StdioTransport::stdio(), records, &config);

    match session.run(&FileInstallSteps).await {
        Ok(()) => {
            info!(bundle_id = %cli.bundle_id, "Installer finished");
            Ok(())
        }
        Err(e) => {
            error!(bundle_id = %cli.bundle_id, phase = %session.state().phase(), "Install failed: {}", e);
            Err(e.into())
        }
    }
}
