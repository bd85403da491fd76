//! Updater side of the install exchange

use std::time::Duration;

use autoupdate_config::{AutoupdateConfig, LivenessConfig};
use autoupdate_ipc::{
    ArchiveDescriptor, ExchangePhase, ExchangeState, InstallationInput, InstallerMessage,
    InstallerMessageKind, IpcError, IpcTransport, MessageEnvelope, UpdaterMessage,
    UpdaterMessageKind,
};
use tracing::{debug, error, info, warn};

use crate::display::VersionDisplay;
use crate::error::{RuntimeError, RuntimeResult};

/// Updater end of one channel session
pub struct UpdaterSession<T, D> {
    bundle_identifier: String,
    transport: T,
    display: D,
    state: ExchangeState,
    liveness: LivenessConfig,
    archive_key: String,
}

impl<T, D> UpdaterSession<T, D>
where
    T: IpcTransport,
    D: VersionDisplay,
{
    pub fn new(bundle_identifier: impl Into<String>, transport: T, display: D) -> Self {
        Self::with_config(bundle_identifier, transport, display, autoupdate_config::global())
    }

    pub fn with_config(
        bundle_identifier: impl Into<String>,
        transport: T,
        display: D,
        config: &AutoupdateConfig,
    ) -> Self {
        Self {
            bundle_identifier: bundle_identifier.into(),
            transport,
            display,
            state: ExchangeState::new(),
            liveness: config.liveness.clone(),
            archive_key: config.installation.archive_key.clone(),
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub async fn send_appcast_item(&mut self, descriptor: &ArchiveDescriptor) -> RuntimeResult<()> {
        let message = UpdaterMessage::appcast_item(descriptor, &self.archive_key)?;
        self.transport.send(&MessageEnvelope::new(message)).await?;
        Ok(())
    }

    pub async fn send_installation_data(&mut self, input: &InstallationInput) -> RuntimeResult<()> {
        let message = UpdaterMessage::installation_data(input)?;
        self.state.apply_updater(message.kind, false)?;
        self.transport.send(&MessageEnvelope::new(message)).await?;
        Ok(())
    }

    /// Hand the installer everything it needs for a fresh install.
    ///
    /// The appcast item goes first so the installer has it by the time the
    /// installation data arrives.
    pub async fn begin(
        &mut self,
        host_version: &str,
        input: &InstallationInput,
        appcast_item: Option<&ArchiveDescriptor>,
    ) -> RuntimeResult<()> {
        let (from, to) = self
            .display
            .format_versions(host_version, &input.expected_version);
        info!(
            bundle_id = %self.bundle_identifier,
            installation_type = %input.installation_type,
            "Starting update from {} to {}",
            from,
            to
        );

        if let Some(descriptor) = appcast_item {
            self.send_appcast_item(descriptor).await?;
        }
        self.send_installation_data(input).await
    }

    /// Wait for the installer to announce itself with `NotStarted`.
    ///
    /// Needed before resuming a previous install, since the announcement is
    /// not legal once the exchange has moved on to stage 2.
    pub async fn await_announcement(&mut self) -> RuntimeResult<()> {
        let message = self.next_event().await?;
        if message.kind != InstallerMessageKind::NotStarted {
            return Err(RuntimeError::InvalidState(format!(
                "expected installer announcement, got {}",
                message.kind
            )));
        }
        Ok(())
    }

    /// Ask the installer to continue at stage 2.
    ///
    /// Used both to resume an install whose stage 1 completed in an earlier
    /// session and to acknowledge stage 1 completion in this one. Nothing is
    /// sent once the installer has already reported past stage 2.
    pub async fn resume_to_stage2(&mut self, stage1_completed_previously: bool) -> RuntimeResult<()> {
        let kind = UpdaterMessageKind::ResumeInstallationToStage2;
        let transition = self.state.apply_updater(kind, stage1_completed_previously)?;
        if transition.phase() != ExchangePhase::InstallingStage2 {
            warn!(
                bundle_id = %self.bundle_identifier,
                phase = %transition.phase(),
                "Installer is already past stage 2, not acknowledging"
            );
            return Ok(());
        }

        self.transport
            .send(&MessageEnvelope::new(UpdaterMessage::signal(kind)))
            .await?;
        debug!(bundle_id = %self.bundle_identifier, "Sent resume to stage 2");
        Ok(())
    }

    /// Next staged installer message, answering pings along the way
    pub async fn next_event(&mut self) -> RuntimeResult<InstallerMessage> {
        loop {
            let envelope = self.receive_with_timeout().await?;
            let message = envelope.message;

            if let Err(err) = self.state.apply_installer(message.kind) {
                error!(
                    bundle_id = %self.bundle_identifier,
                    error = %err,
                    "Installer broke the stage sequence, closing channel"
                );
                self.transport.close().await?;
                return Err(err.into());
            }

            if message.kind.is_liveness() {
                let mut pong = MessageEnvelope::new(UpdaterMessage::signal(
                    UpdaterMessageKind::AlivePong,
                ));
                pong.correlation_id = envelope.correlation_id;
                self.transport.send(&pong).await?;
                continue;
            }

            if let Some(progress) = message.progress() {
                debug!(progress, "Extraction progress");
            } else {
                debug!(kind = %message.kind, phase = %self.state.phase(), "Installer reported stage");
            }
            return Ok(message);
        }
    }

    /// Receive installer messages until stage 1 has completed
    pub async fn wait_for_stage1<F>(&mut self, mut observer: F) -> RuntimeResult<()>
    where
        F: FnMut(&InstallerMessage),
    {
        while !self.state.stage1_completed() {
            let message = self.next_event().await?;
            observer(&message);
            self.check_failed()?;
        }
        Ok(())
    }

    /// Receive installer messages until the install finishes or fails
    pub async fn wait_for_terminal<F>(&mut self, mut observer: F) -> RuntimeResult<ExchangePhase>
    where
        F: FnMut(&InstallerMessage),
    {
        while !self.state.phase().is_terminal() {
            let message = self.next_event().await?;
            observer(&message);
            self.check_failed()?;
        }
        info!(bundle_id = %self.bundle_identifier, "Installation finished");
        Ok(self.state.phase())
    }

    /// Close the channel without waiting for the installer
    pub async fn cancel(&mut self) -> RuntimeResult<()> {
        warn!(bundle_id = %self.bundle_identifier, phase = %self.state.phase(), "Cancelling install exchange");
        self.transport.close().await?;
        Ok(())
    }

    fn check_failed(&self) -> RuntimeResult<()> {
        if self.state.phase() == ExchangePhase::Failed {
            error!(bundle_id = %self.bundle_identifier, "Installer failed to extract the archive");
            return Err(RuntimeError::Ipc(IpcError::ExtractionFailed));
        }
        Ok(())
    }

    async fn receive_with_timeout(&mut self) -> RuntimeResult<MessageEnvelope<InstallerMessage>> {
        let waited: Duration = self.liveness.response_timeout;
        match tokio::time::timeout(waited, self.transport.receive::<InstallerMessage>()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                error!(bundle_id = %self.bundle_identifier, ?waited, "Installer stopped responding");
                Err(IpcError::PeerUnresponsive { waited }.into())
            }
        }
    }
}
