//! Installer side of the install exchange
//!
//! The installer waits for installation input from the updater, reports its
//! progress through the staged sequence, and proves it is alive with
//! `AlivePing`s while long-running work is under way. Every stage report is
//! checked against the legality table before it leaves the process.

use std::future::Future;
use std::time::Duration;

use autoupdate_config::{AutoupdateConfig, LivenessConfig};
use autoupdate_ipc::{
    ArchiveDescriptor, ExchangePhase, ExchangeState, InstallationInput, InstallerMessage,
    InstallerMessageKind, IpcError, IpcTransport, MessageEnvelope, UpdaterMessage,
    UpdaterMessageKind,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};
use crate::record::{StageRecord, StageRecordStore};
use crate::steps::InstallSteps;

/// What the updater asked the installer to do
#[derive(Debug, Clone, PartialEq)]
pub enum InstallerInput {
    /// Start a fresh install
    Fresh {
        input: InstallationInput,
        appcast_item: Option<ArchiveDescriptor>,
    },
    /// Stage 1 completed in an earlier session; continue with stage 2
    ResumeAtStage2(StageRecord),
}

/// Installer end of one channel session
pub struct InstallerSession<T, S> {
    bundle_identifier: String,
    transport: T,
    records: S,
    state: ExchangeState,
    liveness: LivenessConfig,
    archive_key: String,
    appcast_item: Option<ArchiveDescriptor>,
    input: Option<InstallationInput>,
    stage2_acknowledged: bool,
}

impl<T, S> InstallerSession<T, S>
where
    T: IpcTransport,
    S: StageRecordStore,
{
    /// Create a session using the process-wide configuration
    pub fn new(bundle_identifier: impl Into<String>, transport: T, records: S) -> Self {
        Self::with_config(bundle_identifier, transport, records, autoupdate_config::global())
    }

    pub fn with_config(
        bundle_identifier: impl Into<String>,
        transport: T,
        records: S,
        config: &AutoupdateConfig,
    ) -> Self {
        Self {
            bundle_identifier: bundle_identifier.into(),
            transport,
            records,
            state: ExchangeState::new(),
            liveness: config.liveness.clone(),
            archive_key: config.installation.archive_key.clone(),
            appcast_item: None,
            input: None,
            stage2_acknowledged: false,
        }
    }

    pub fn bundle_identifier(&self) -> &str {
        &self.bundle_identifier
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn appcast_item(&self) -> Option<&ArchiveDescriptor> {
        self.appcast_item.as_ref()
    }

    /// Announce the installer and wait for the updater's instructions
    pub async fn start(&mut self) -> RuntimeResult<InstallerInput> {
        info!(bundle_id = %self.bundle_identifier, "Installer session started");
        self.report_stage(InstallerMessageKind::NotStarted).await?;
        self.await_input().await
    }

    /// Run a whole install with `steps`, from the announcement to stage 3.
    ///
    /// A resumed install skips straight to stage 2 using the installation
    /// data saved with the stage record.
    pub async fn run<I: InstallSteps>(&mut self, steps: &I) -> RuntimeResult<()> {
        let input = match self.start().await? {
            InstallerInput::Fresh {
                input,
                appcast_item,
            } => {
                self.run_stage1(steps, &input, appcast_item.as_ref()).await?;
                input
            }
            InstallerInput::ResumeAtStage2(record) => record.input.ok_or_else(|| {
                RuntimeError::StageRecord(format!(
                    "record for {} carries no installation data",
                    record.bundle_identifier
                ))
            })?,
        };

        self.await_stage2_acknowledgment().await?;
        self.while_working(steps.install_stage2(&input)).await??;
        self.report_stage(InstallerMessageKind::InstallationFinishedStage2).await?;
        self.while_working(steps.install_stage3(&input)).await??;
        self.report_stage(InstallerMessageKind::InstallationFinishedStage3).await?;
        self.close().await
    }

    async fn run_stage1<I: InstallSteps>(
        &mut self,
        steps: &I,
        input: &InstallationInput,
        appcast_item: Option<&ArchiveDescriptor>,
    ) -> RuntimeResult<()> {
        self.report_stage(InstallerMessageKind::ExtractionStarted).await?;
        if let Err(err) = self.while_working(steps.extract(input)).await? {
            warn!(bundle_id = %self.bundle_identifier, error = %err, "Extraction step failed");
            self.report_stage(InstallerMessageKind::ArchiveExtractionFailed).await?;
            return Err(err);
        }
        self.report_progress(1.0).await?;

        self.report_stage(InstallerMessageKind::ValidationStarted).await?;
        self.while_working(steps.validate(input, appcast_item)).await??;

        self.report_stage(InstallerMessageKind::InstallationStartedStage1).await?;
        self.while_working(steps.install_stage1(input)).await??;
        self.report_stage(InstallerMessageKind::InstallationFinishedStage1).await
    }

    /// Wait for installation data or a resume request
    pub async fn await_input(&mut self) -> RuntimeResult<InstallerInput> {
        loop {
            let envelope = self.receive_with_timeout().await?;
            let message = envelope.message;

            match message.kind {
                UpdaterMessageKind::SentUpdateAppcastItemData => {
                    let descriptor = message.decode_appcast_item(&self.archive_key)?;
                    debug!(version = %descriptor.version, "Received appcast item");
                    self.appcast_item = Some(descriptor);
                }
                UpdaterMessageKind::InstallationData => {
                    let input = message.decode_installation_data()?;
                    self.state.apply_updater(message.kind, false)?;
                    self.input = Some(input.clone());
                    info!(
                        bundle_id = %self.bundle_identifier,
                        installation_type = %input.installation_type,
                        version = %input.expected_version,
                        "Received installation data"
                    );
                    return Ok(InstallerInput::Fresh {
                        input,
                        appcast_item: self.appcast_item.clone(),
                    });
                }
                UpdaterMessageKind::ResumeInstallationToStage2 => {
                    return match self.accept_resume().await? {
                        Some(record) => {
                            self.input = record.input.clone();
                            Ok(InstallerInput::ResumeAtStage2(record))
                        }
                        None => Err(RuntimeError::InvalidState(
                            "resume accepted without a stage record".to_string(),
                        )),
                    };
                }
                UpdaterMessageKind::AlivePong => {
                    debug!("Ignoring unsolicited pong");
                }
            }
        }
    }

    /// Report a staged message, refusing anything the legality table rejects.
    ///
    /// Stage 2 and stage 3 completions are also refused until the updater has
    /// acknowledged stage 1.
    pub async fn report(&mut self, message: InstallerMessage) -> RuntimeResult<()> {
        let kind = message.kind;
        if kind.is_past_stage1() && !self.stage2_acknowledged {
            error!(
                bundle_id = %self.bundle_identifier,
                kind = %kind,
                phase = %self.state.phase(),
                "Refusing to continue past stage 1 without acknowledgement"
            );
            return Err(IpcError::Stage2Unacknowledged { next: kind }.into());
        }

        let stage1_was_completed = self.state.stage1_completed();
        self.state.apply_installer(kind)?;

        // On disk before the updater hears about it
        if !stage1_was_completed && self.state.stage1_completed() {
            self.records
                .save(&StageRecord {
                    bundle_identifier: self.bundle_identifier.clone(),
                    version: self
                        .input
                        .as_ref()
                        .map(|input| input.expected_version.clone())
                        .unwrap_or_default(),
                    stage1_completed_at: Utc::now(),
                    input: self.input.clone(),
                })
                .await?;
        }

        self.transport.send(&MessageEnvelope::new(message)).await?;
        debug!(kind = %kind, phase = %self.state.phase(), "Reported installer stage");

        match kind {
            InstallerMessageKind::InstallationFinishedStage3 => {
                self.records.clear(&self.bundle_identifier).await?;
                info!(bundle_id = %self.bundle_identifier, "Installation finished");
            }
            _ if kind.is_failure() => {
                error!(bundle_id = %self.bundle_identifier, "Archive extraction failed");
            }
            _ => {}
        }

        Ok(())
    }

    pub async fn report_stage(&mut self, kind: InstallerMessageKind) -> RuntimeResult<()> {
        self.report(InstallerMessage::signal(kind)).await
    }

    pub async fn report_progress(&mut self, progress: f64) -> RuntimeResult<()> {
        self.report(InstallerMessage::extraction_progress(progress)).await
    }

    /// Ping the updater and wait for its pong
    pub async fn heartbeat(&mut self) -> RuntimeResult<()> {
        let correlation_id = Uuid::new_v4();
        self.state.apply_installer(InstallerMessageKind::AlivePing)?;
        self.transport
            .send(
                &MessageEnvelope::new(InstallerMessage::signal(InstallerMessageKind::AlivePing))
                    .with_correlation_id(correlation_id),
            )
            .await?;

        loop {
            let envelope = self.receive_with_timeout().await?;
            match envelope.message.kind {
                UpdaterMessageKind::AlivePong if envelope.correlation_id == Some(correlation_id) => {
                    return Ok(());
                }
                UpdaterMessageKind::AlivePong => {
                    debug!("Ignoring stale pong");
                }
                UpdaterMessageKind::ResumeInstallationToStage2 => {
                    self.accept_resume().await?;
                }
                other => {
                    warn!(kind = %other, "Ignoring updater message while waiting for pong");
                }
            }
        }
    }

    /// Run `work` to completion, heartbeating every ping interval
    pub async fn while_working<F>(&mut self, work: F) -> RuntimeResult<F::Output>
    where
        F: Future,
    {
        tokio::pin!(work);
        let mut ticker = tokio::time::interval(self.liveness.ping_interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                output = &mut work => return Ok(output),
                _ = ticker.tick() => {}
            }
            self.heartbeat().await?;
        }
    }

    /// Block until the updater allows the install to continue past stage 1.
    ///
    /// Channel closure here is fatal: stage 2 never runs unacknowledged.
    pub async fn await_stage2_acknowledgment(&mut self) -> RuntimeResult<()> {
        if self.state.phase() != ExchangePhase::InstallingStage2 {
            return Err(RuntimeError::InvalidState(format!(
                "stage 2 acknowledgment requested in {}",
                self.state.phase()
            )));
        }

        while !self.stage2_acknowledged {
            let envelope = match self.transport.receive::<UpdaterMessage>().await {
                Ok(envelope) => envelope,
                Err(err) => {
                    error!(error = %err, "Channel lost before stage 2 was acknowledged");
                    return Err(err.into());
                }
            };

            match envelope.message.kind {
                UpdaterMessageKind::ResumeInstallationToStage2 => {
                    self.accept_resume().await?;
                }
                other => debug!(kind = %other, "Waiting for stage 2 acknowledgment"),
            }
        }

        Ok(())
    }

    /// Close the channel
    pub async fn close(&mut self) -> RuntimeResult<()> {
        self.transport.close().await?;
        Ok(())
    }

    /// Apply a resume request; returns the stage record it was checked against
    async fn accept_resume(&mut self) -> RuntimeResult<Option<StageRecord>> {
        let record = self.records.load(&self.bundle_identifier).await?;
        match self
            .state
            .apply_updater(UpdaterMessageKind::ResumeInstallationToStage2, record.is_some())
        {
            Ok(transition) => {
                info!(
                    bundle_id = %self.bundle_identifier,
                    phase = %transition.phase(),
                    "Resuming installation at stage 2"
                );
                self.stage2_acknowledged = true;
                Ok(record)
            }
            Err(err) => {
                error!(bundle_id = %self.bundle_identifier, error = %err, "Rejecting resume request");
                Err(err.into())
            }
        }
    }

    async fn receive_with_timeout(&mut self) -> RuntimeResult<MessageEnvelope<UpdaterMessage>> {
        let waited: Duration = self.liveness.response_timeout;
        match tokio::time::timeout(waited, self.transport.receive::<UpdaterMessage>()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(bundle_id = %self.bundle_identifier, ?waited, "Updater stopped responding");
                Err(IpcError::PeerUnresponsive { waited }.into())
            }
        }
    }
}
