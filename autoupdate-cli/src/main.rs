use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use autoupdate_config::{AutoupdateConfig, ConfigLoader, LogLevel};
use autoupdate_ipc::{
    authorization_right_name, installer_job_label, progress_job_label, ArchiveDescriptor,
    EndpointIdentity, InstallationInput, InstallerMessage, InstallerMessageKind,
};
use autoupdate_runtime::{
    IdentityVersionDisplay, InstallerLauncher, LaunchOutcome, LaunchRequest, LaunchedInstaller,
    PreauthorizedAuthorizer, UpdaterSession,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<AutoupdateConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn names_document(bundle_id: &str) -> serde_json::Value {
    let endpoints = EndpointIdentity::for_bundle(bundle_id);
    json!({
        "bundle_identifier": bundle_id,
        "installer_service": endpoints.installer_service,
        "status_info_service": endpoints.status_info_service,
        "progress_agent_service": endpoints.progress_agent_service,
        "installer_job_label": installer_job_label(bundle_id),
        "progress_job_label": progress_job_label(bundle_id),
        "authorization_right": authorization_right_name(bundle_id),
    })
}

fn handle_names(bundle_id: &str, format: &str) -> Result<()> {
    let document = names_document(bundle_id);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&document)?),
        "text" => {
            if let Some(fields) = document.as_object() {
                for (key, value) in fields {
                    println!("{:<24} {}", key, value.as_str().unwrap_or_default());
                }
            }
        }
        other => return Err(anyhow::anyhow!("Unsupported format: {}", other)),
    }
    Ok(())
}

fn print_installer_message(message: &InstallerMessage) {
    match message.progress() {
        Some(progress) => println!("Extracting: {:.0}%", progress * 100.0),
        None if message.kind != InstallerMessageKind::ExtractedArchiveWithProgress => {
            println!("{}", message.kind)
        }
        None => {}
    }
}

struct UpdateOptions<'a> {
    installer: &'a Path,
    bundle_id: &'a str,
    input: &'a Path,
    appcast: Option<&'a Path>,
    host_version: &'a str,
    resume: bool,
    needs_system_authorization: bool,
    allowing_driver_interaction: bool,
    allowing_updater_interaction: bool,
}

async fn update_command(options: UpdateOptions<'_>, config: &AutoupdateConfig) -> Result<()> {
    let input: InstallationInput = read_json(options.input)?;
    let appcast: Option<ArchiveDescriptor> = options.appcast.map(read_json).transpose()?;

    let request = LaunchRequest {
        host_bundle_path: PathBuf::from(&input.host_bundle_path),
        bundle_identifier: options.bundle_id.to_string(),
        installer_path: options.installer.to_path_buf(),
        authorization_prompt: format!("{} wants to install an update.", options.bundle_id),
        installation_type: input.installation_type,
        allowing_driver_interaction: options.allowing_driver_interaction,
        allowing_updater_interaction: options.allowing_updater_interaction,
        needs_system_authorization: options.needs_system_authorization,
    };

    let launcher = InstallerLauncher::new(PreauthorizedAuthorizer);
    let LaunchedInstaller {
        mut child,
        transport,
        job_label,
        ..
    } = match launcher.launch(&request).await {
        LaunchOutcome::Launched(installer) => installer,
        LaunchOutcome::NotLaunched(status) => {
            return Err(anyhow::anyhow!(
                "Installer was not launched: {:?} (status {})",
                status,
                status.code()
            ));
        }
    };
    info!(job_label = %job_label, "Driving installer");

    let mut session =
        UpdaterSession::with_config(options.bundle_id, transport, IdentityVersionDisplay, config);

    let outcome = async {
        if options.resume {
            session.await_announcement().await?;
            session.resume_to_stage2(true).await?;
        } else {
            session
                .begin(options.host_version, &input, appcast.as_ref())
                .await?;
            session.wait_for_stage1(print_installer_message).await?;
            session.resume_to_stage2(false).await?;
        }
        session.wait_for_terminal(print_installer_message).await
    }
    .await;

    match outcome {
        Ok(phase) => {
            println!("✅ Update finished ({})", phase);
            drop(session);
            let status = child.wait().await.context("Failed to wait for installer")?;
            debug!(?status, "Installer exited");
            Ok(())
        }
        Err(e) => {
            error!("Update failed: {}", e);
            if let Err(cancel_err) = session.cancel().await {
                debug!("Channel already closed: {}", cancel_err);
            }
            if let Err(kill_err) = child.kill().await {
                debug!("Installer already exited: {}", kill_err);
            }
            Err(e.into())
        }
    }
}

/// Handle configuration validation
fn handle_config_validate(config_file: &Path) -> Result<()> {
    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_config) => {
            println!("✅ Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("❌ Configuration validation failed: {}", e);
            error!("Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, AutoupdateConfig::generate_sample())
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Generated sample configuration at {:?}", output);
    Ok(())
}

fn handle_config_show(config: &AutoupdateConfig, format: &str) -> Result<()> {
    match format {
        "yaml" => print!("{}", serde_yaml::to_string(config)?),
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        other => return Err(anyhow::anyhow!("Unsupported format: {}", other)),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = LogLevel::from_str(level).map_err(|e| anyhow::anyhow!(e))?;
    }
    autoupdate_logging::init_logging_from_config(&config.logging)?;

    if autoupdate_config::install_global(config.clone()).is_err() {
        debug!("Global configuration already installed");
    }

    match &cli.command {
        Commands::Names { bundle_id, format } => handle_names(bundle_id, format),
        Commands::Update {
            installer,
            bundle_id,
            input,
            appcast,
            host_version,
            resume,
            needs_system_authorization,
            no_driver_interaction,
            no_updater_interaction,
        } => {
            let options = UpdateOptions {
                installer,
                bundle_id,
                input,
                appcast: appcast.as_deref(),
                host_version,
                resume: *resume,
                needs_system_authorization: *needs_system_authorization,
                allowing_driver_interaction: !*no_driver_interaction,
                allowing_updater_interaction: !*no_updater_interaction,
            };
            update_command(options, &config).await
        }
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
            ConfigCommands::Show { format } => handle_config_show(&config, format),
        },
    }
}
