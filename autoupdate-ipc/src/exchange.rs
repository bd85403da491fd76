//! Install exchange state machine
//!
//! Both sides keep one [`ExchangeState`] per channel session. Installer stage
//! reports only move it when the legality table accepts them; updater
//! commands move it only where noted on [`ExchangeState::apply_updater`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

use crate::error::{IpcError, IpcResult};
use crate::protocol::{InstallerMessageKind, UpdaterMessageKind};
use crate::stage::{is_legal_first, is_legal_transition};

/// Primary state of an install exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangePhase {
    Idle,
    AwaitingInstallationData,
    Extracting,
    Validating,
    InstallingStage1,
    InstallingStage2,
    InstallingStage3,
    Finished,
    Failed,
}

impl ExchangePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangePhase::Finished | ExchangePhase::Failed)
    }

    /// Phase the exchange enters once `kind` has been accepted
    fn after(kind: InstallerMessageKind) -> Option<ExchangePhase> {
        let phase = match kind {
            InstallerMessageKind::NotStarted => ExchangePhase::AwaitingInstallationData,
            InstallerMessageKind::ExtractionStarted
            | InstallerMessageKind::ExtractedArchiveWithProgress => ExchangePhase::Extracting,
            InstallerMessageKind::ArchiveExtractionFailed => ExchangePhase::Failed,
            InstallerMessageKind::ValidationStarted => ExchangePhase::Validating,
            InstallerMessageKind::InstallationStartedStage1 => ExchangePhase::InstallingStage1,
            InstallerMessageKind::InstallationFinishedStage1 => ExchangePhase::InstallingStage2,
            InstallerMessageKind::InstallationFinishedStage2 => ExchangePhase::InstallingStage3,
            InstallerMessageKind::InstallationFinishedStage3 => ExchangePhase::Finished,
            InstallerMessageKind::AlivePing => return None,
        };
        Some(phase)
    }
}

impl fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What an accepted message did to the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved from one phase to another
    Advanced { from: ExchangePhase, to: ExchangePhase },
    /// Accepted without changing the phase (pings, pongs, progress repeats)
    Unchanged(ExchangePhase),
}

impl Transition {
    pub fn phase(&self) -> ExchangePhase {
        match self {
            Transition::Advanced { to, .. } => *to,
            Transition::Unchanged(phase) => *phase,
        }
    }
}

/// Protocol state of one channel session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeState {
    phase: ExchangePhase,
    last_stage: Option<InstallerMessageKind>,
}

impl ExchangeState {
    pub fn new() -> Self {
        Self {
            phase: ExchangePhase::Idle,
            last_stage: None,
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// Last staged installer message accepted this session; never `AlivePing`
    pub fn last_stage(&self) -> Option<InstallerMessageKind> {
        self.last_stage
    }

    /// Whether stage 1 has completed in this session
    pub fn stage1_completed(&self) -> bool {
        matches!(
            self.last_stage,
            Some(
                InstallerMessageKind::InstallationFinishedStage1
                    | InstallerMessageKind::InstallationFinishedStage2
                    | InstallerMessageKind::InstallationFinishedStage3
            )
        )
    }

    /// Whether `next` would be accepted, without applying it
    pub fn accepts(&self, next: InstallerMessageKind) -> bool {
        match self.last_stage {
            Some(previous) => is_legal_transition(previous, next),
            None => is_legal_first(next),
        }
    }

    /// Apply an installer message, rejecting illegal stage reports
    pub fn apply_installer(&mut self, next: InstallerMessageKind) -> IpcResult<Transition> {
        if !self.accepts(next) {
            let previous = self.last_stage.unwrap_or(InstallerMessageKind::NotStarted);
            error!(
                previous = %previous,
                next = %next,
                phase = %self.phase,
                "Rejecting illegal installer stage transition"
            );
            return Err(IpcError::ProtocolViolation { previous, next });
        }

        let Some(to) = ExchangePhase::after(next) else {
            return Ok(Transition::Unchanged(self.phase));
        };

        self.last_stage = Some(next);
        Ok(self.move_to(to))
    }

    /// Apply an updater command.
    ///
    /// `InstallationData` takes an idle exchange to `AwaitingInstallationData`.
    /// `ResumeInstallationToStage2` is legal from `Idle` or
    /// `AwaitingInstallationData` when `stage1_completed_previously` is set,
    /// and as an acknowledgement in any phase reached after stage 1 completed
    /// in this session. Everything else leaves the phase alone.
    pub fn apply_updater(
        &mut self,
        kind: UpdaterMessageKind,
        stage1_completed_previously: bool,
    ) -> IpcResult<Transition> {
        match kind {
            UpdaterMessageKind::InstallationData if self.phase == ExchangePhase::Idle => {
                Ok(self.move_to(ExchangePhase::AwaitingInstallationData))
            }
            UpdaterMessageKind::ResumeInstallationToStage2 => {
                self.resume_to_stage2(stage1_completed_previously)
            }
            _ => Ok(Transition::Unchanged(self.phase)),
        }
    }

    fn resume_to_stage2(&mut self, stage1_completed_previously: bool) -> IpcResult<Transition> {
        match self.phase {
            ExchangePhase::Idle | ExchangePhase::AwaitingInstallationData
                if stage1_completed_previously =>
            {
                self.last_stage = Some(InstallerMessageKind::InstallationFinishedStage1);
                Ok(self.move_to(ExchangePhase::InstallingStage2))
            }
            phase @ (ExchangePhase::Idle | ExchangePhase::AwaitingInstallationData) => {
                Err(IpcError::ResumeRejected {
                    phase,
                    reason: "no completed stage 1 on record",
                })
            }
            _ if self.stage1_completed() => Ok(Transition::Unchanged(self.phase)),
            phase => Err(IpcError::ResumeRejected {
                phase,
                reason: "stage 1 has not completed in this session",
            }),
        }
    }

    /// Start over for a fresh install attempt
    pub fn reset(&mut self) {
        debug!(phase = %self.phase, "Resetting install exchange");
        *self = Self::new();
    }

    fn move_to(&mut self, to: ExchangePhase) -> Transition {
        let from = self.phase;
        self.phase = to;
        if from == to {
            Transition::Unchanged(to)
        } else {
            debug!(from = %from, to = %to, "Install exchange advanced");
            Transition::Advanced { from, to }
        }
    }
}

impl Default for ExchangeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstallerMessageKind::*;

    fn drive(kinds: &[InstallerMessageKind]) -> IpcResult<ExchangeState> {
        let mut state = ExchangeState::new();
        for kind in kinds {
            state.apply_installer(*kind)?;
        }
        Ok(state)
    }

    #[test]
    fn test_successful_install_reaches_finished() {
        let state = drive(&[
            NotStarted,
            ExtractionStarted,
            ExtractedArchiveWithProgress,
            ExtractedArchiveWithProgress,
            ValidationStarted,
            InstallationStartedStage1,
            InstallationFinishedStage1,
            InstallationFinishedStage2,
            InstallationFinishedStage3,
        ])
        .unwrap();
        assert_eq!(state.phase(), ExchangePhase::Finished);
        assert!(state.phase().is_terminal());
    }

    #[test]
    fn test_phases_follow_stages() {
        let mut state = ExchangeState::new();
        let expected = [
            (NotStarted, ExchangePhase::AwaitingInstallationData),
            (ExtractionStarted, ExchangePhase::Extracting),
            (ExtractedArchiveWithProgress, ExchangePhase::Extracting),
            (ValidationStarted, ExchangePhase::Validating),
            (InstallationStartedStage1, ExchangePhase::InstallingStage1),
            (InstallationFinishedStage1, ExchangePhase::InstallingStage2),
            (InstallationFinishedStage2, ExchangePhase::InstallingStage3),
            (InstallationFinishedStage3, ExchangePhase::Finished),
        ];
        for (kind, phase) in expected {
            assert_eq!(state.apply_installer(kind).unwrap().phase(), phase);
        }
    }

    #[test]
    fn test_extraction_failure_is_terminal() {
        let mut state = drive(&[NotStarted, ExtractionStarted, ArchiveExtractionFailed]).unwrap();
        assert_eq!(state.phase(), ExchangePhase::Failed);

        let err = state.apply_installer(ValidationStarted).unwrap_err();
        assert!(matches!(
            err,
            IpcError::ProtocolViolation {
                previous: ArchiveExtractionFailed,
                next: ValidationStarted
            }
        ));
        assert!(state.apply_installer(ArchiveExtractionFailed).is_err());
        assert_eq!(state.phase(), ExchangePhase::Failed);
    }

    #[test]
    fn test_ping_never_changes_phase() {
        let mut state = drive(&[NotStarted, ExtractionStarted]).unwrap();
        let transition = state.apply_installer(AlivePing).unwrap();
        assert_eq!(transition, Transition::Unchanged(ExchangePhase::Extracting));
        assert_eq!(state.last_stage(), Some(ExtractionStarted));

        let mut finished = drive(&[NotStarted, InstallationFinishedStage3]).unwrap();
        assert!(finished.apply_installer(AlivePing).is_ok());
        assert!(finished.apply_installer(InstallationFinishedStage3).is_err());
    }

    #[test]
    fn test_regression_is_rejected_and_state_kept() {
        let mut state = drive(&[NotStarted, ExtractionStarted, ValidationStarted]).unwrap();
        assert!(state.apply_installer(ExtractionStarted).is_err());
        assert_eq!(state.phase(), ExchangePhase::Validating);
        assert_eq!(state.last_stage(), Some(ValidationStarted));
    }

    #[test]
    fn test_resume_requires_prior_stage1() {
        let mut state = ExchangeState::new();
        let err = state
            .apply_updater(UpdaterMessageKind::ResumeInstallationToStage2, false)
            .unwrap_err();
        assert!(matches!(
            err,
            IpcError::ResumeRejected {
                phase: ExchangePhase::Idle,
                ..
            }
        ));

        let transition = state
            .apply_updater(UpdaterMessageKind::ResumeInstallationToStage2, true)
            .unwrap();
        assert_eq!(
            transition,
            Transition::Advanced {
                from: ExchangePhase::Idle,
                to: ExchangePhase::InstallingStage2
            }
        );
        assert!(state.apply_installer(InstallationFinishedStage2).is_ok());
        assert!(state.apply_installer(InstallationFinishedStage3).is_ok());
        assert_eq!(state.phase(), ExchangePhase::Finished);
    }

    #[test]
    fn test_resume_acknowledges_stage1_in_session() {
        let mut state = drive(&[
            NotStarted,
            ExtractionStarted,
            ValidationStarted,
            InstallationStartedStage1,
            InstallationFinishedStage1,
        ])
        .unwrap();
        let transition = state
            .apply_updater(UpdaterMessageKind::ResumeInstallationToStage2, false)
            .unwrap();
        assert_eq!(transition, Transition::Unchanged(ExchangePhase::InstallingStage2));
    }

    #[test]
    fn test_acknowledgement_accepted_after_skipped_stage() {
        // Stage 1 finish is skipped; stage 2 finish still completes stage 1
        let mut state = drive(&[
            NotStarted,
            ExtractionStarted,
            ValidationStarted,
            InstallationStartedStage1,
            InstallationFinishedStage2,
        ])
        .unwrap();
        assert!(state.stage1_completed());
        let transition = state
            .apply_updater(UpdaterMessageKind::ResumeInstallationToStage2, false)
            .unwrap();
        assert_eq!(transition, Transition::Unchanged(ExchangePhase::InstallingStage3));
    }

    #[test]
    fn test_resume_rejected_mid_extraction() {
        let mut state = drive(&[NotStarted, ExtractionStarted]).unwrap();
        let err = state
            .apply_updater(UpdaterMessageKind::ResumeInstallationToStage2, true)
            .unwrap_err();
        assert!(matches!(
            err,
            IpcError::ResumeRejected {
                phase: ExchangePhase::Extracting,
                reason: "stage 1 has not completed in this session",
            }
        ));
    }

    #[test]
    fn test_installation_data_leaves_idle() {
        let mut state = ExchangeState::new();
        let transition = state
            .apply_updater(UpdaterMessageKind::InstallationData, false)
            .unwrap();
        assert_eq!(transition.phase(), ExchangePhase::AwaitingInstallationData);

        // NotStarted from the installer keeps us waiting for data
        assert_eq!(
            state.apply_installer(NotStarted).unwrap(),
            Transition::Unchanged(ExchangePhase::AwaitingInstallationData)
        );
        assert_eq!(
            state
                .apply_updater(UpdaterMessageKind::AlivePong, false)
                .unwrap(),
            Transition::Unchanged(ExchangePhase::AwaitingInstallationData)
        );
    }

    #[test]
    fn test_reset_allows_fresh_restart() {
        let mut state = drive(&[NotStarted, ExtractionStarted, ArchiveExtractionFailed]).unwrap();
        state.reset();
        assert_eq!(state.phase(), ExchangePhase::Idle);
        assert!(state.apply_installer(NotStarted).is_ok());
    }
}
