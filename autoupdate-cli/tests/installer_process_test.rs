//! The installer binary driven through the launcher over its stdio

use anyhow::Result;
use std::path::{Path, PathBuf};

use autoupdate_config::{AutoupdateConfig, InstallationType};
use autoupdate_ipc::{ExchangePhase, InstallationInput, InstallerMessageKind, IpcError};
use autoupdate_runtime::{
    FileStageRecordStore, IdentityVersionDisplay, InstallerLauncher, LaunchRequest,
    LaunchedInstaller, PreauthorizedAuthorizer, RuntimeError, StageRecord, StageRecordStore,
    UpdaterSession,
};

fn bundle_id(name: &str) -> String {
    format!("com.example.Process{}.{}", std::process::id(), name)
}

fn installation_input(root: &Path) -> InstallationInput {
    InstallationInput {
        host_bundle_path: root.join("Example.app").display().to_string(),
        relaunch_path: root.join("Example.app").display().to_string(),
        update_directory_path: root.join("update").display().to_string(),
        download_name: "Example-2.0.app".to_string(),
        installation_type: InstallationType::Application,
        expected_version: "2.0".to_string(),
        ed_signature: None,
    }
}

fn seed_host(root: &Path) {
    std::fs::write(root.join("Example.app"), "1.0").unwrap();
    std::fs::create_dir_all(root.join("update")).unwrap();
}

fn records() -> FileStageRecordStore {
    FileStageRecordStore::new(AutoupdateConfig::default().installation.record_directory)
}

async fn launch(bundle_id: &str, root: &Path) -> LaunchedInstaller {
    autoupdate_logging::init_simple_tracing("debug").ok();

    let request = LaunchRequest {
        host_bundle_path: root.join("Example.app"),
        bundle_identifier: bundle_id.to_string(),
        installer_path: PathBuf::from(env!("CARGO_BIN_EXE_autoupdate-installer")),
        authorization_prompt: "Example wants to install an update.".to_string(),
        installation_type: InstallationType::Application,
        allowing_driver_interaction: true,
        allowing_updater_interaction: true,
        needs_system_authorization: false,
    };
    InstallerLauncher::new(PreauthorizedAuthorizer)
        .launch(&request)
        .await
        .into_installer()
        .expect("installer binary should launch")
}

#[tokio::test]
async fn test_installer_process_replaces_host() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_host(dir.path());
    std::fs::write(dir.path().join("update/Example-2.0.app"), "2.0")?;
    let bundle_id = bundle_id("Fresh");
    let input = installation_input(dir.path());

    let LaunchedInstaller {
        mut child,
        transport,
        job_label,
        ..
    } = launch(&bundle_id, dir.path()).await;
    assert_eq!(job_label, format!("{}-sparkle-updater", bundle_id));
    let config = AutoupdateConfig::default();
    let mut updater =
        UpdaterSession::with_config(&bundle_id, transport, IdentityVersionDisplay, &config);

    let mut seen = Vec::new();
    updater.begin("1.0", &input, None).await?;
    updater.wait_for_stage1(|message| seen.push(message.kind)).await?;
    // Stage 1 is on record until the install finishes
    assert!(records().stage1_completed(&bundle_id).await?);
    updater.resume_to_stage2(false).await?;
    let phase = updater.wait_for_terminal(|message| seen.push(message.kind)).await?;
    drop(updater);

    assert_eq!(phase, ExchangePhase::Finished);
    assert_eq!(seen.first(), Some(&InstallerMessageKind::NotStarted));
    assert_eq!(seen.last(), Some(&InstallerMessageKind::InstallationFinishedStage3));
    assert!(child.wait().await?.success());

    assert_eq!(std::fs::read_to_string(dir.path().join("Example.app"))?, "2.0");
    assert!(!dir.path().join("update/previous").exists());
    assert!(!records().stage1_completed(&bundle_id).await?);
    Ok(())
}

#[tokio::test]
async fn test_installer_process_reports_missing_download() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_host(dir.path());
    let bundle_id = bundle_id("Missing");

    let LaunchedInstaller {
        mut child,
        transport,
        ..
    } = launch(&bundle_id, dir.path()).await;
    let config = AutoupdateConfig::default();
    let mut updater =
        UpdaterSession::with_config(&bundle_id, transport, IdentityVersionDisplay, &config);

    updater.begin("1.0", &installation_input(dir.path()), None).await?;
    let err = updater.wait_for_stage1(|_| {}).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Ipc(IpcError::ExtractionFailed)));
    assert_eq!(updater.state().phase(), ExchangePhase::Failed);
    drop(updater);

    assert!(!child.wait().await?.success());
    assert_eq!(std::fs::read_to_string(dir.path().join("Example.app"))?, "1.0");
    Ok(())
}

#[tokio::test]
async fn test_installer_process_resumes_at_stage2() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_host(dir.path());
    std::fs::create_dir_all(dir.path().join("update/staged"))?;
    std::fs::write(dir.path().join("update/staged/Example-2.0.app"), "2.0")?;
    let bundle_id = bundle_id("Resume");

    records()
        .save(&StageRecord {
            bundle_identifier: bundle_id.clone(),
            version: "2.0".to_string(),
            stage1_completed_at: chrono::Utc::now(),
            input: Some(installation_input(dir.path())),
        })
        .await?;

    let LaunchedInstaller {
        mut child,
        transport,
        ..
    } = launch(&bundle_id, dir.path()).await;
    let config = AutoupdateConfig::default();
    let mut updater =
        UpdaterSession::with_config(&bundle_id, transport, IdentityVersionDisplay, &config);

    updater.await_announcement().await?;
    updater.resume_to_stage2(true).await?;
    let phase = updater.wait_for_terminal(|_| {}).await?;
    drop(updater);

    assert_eq!(phase, ExchangePhase::Finished);
    assert!(child.wait().await?.success());
    assert_eq!(std::fs::read_to_string(dir.path().join("Example.app"))?, "2.0");
    assert!(!records().stage1_completed(&bundle_id).await?);
    Ok(())
}
