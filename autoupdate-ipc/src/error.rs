//! IPC error types

use std::time::Duration;
use thiserror::Error;

use crate::exchange::ExchangePhase;
use crate::protocol::InstallerMessageKind;

/// IPC result type
pub type IpcResult<T> = Result<T, IpcError>;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Stage report that the legality table rejects
    #[error("Protocol violation: {next} may not follow {previous}")]
    ProtocolViolation {
        previous: InstallerMessageKind,
        next: InstallerMessageKind,
    },

    /// The installer reported `ArchiveExtractionFailed`
    #[error("Installer failed to extract the update archive")]
    ExtractionFailed,

    /// No traffic from the peer within the liveness window
    #[error("Peer unresponsive after {waited:?}")]
    PeerUnresponsive { waited: Duration },

    /// Configuration outside the recognised set
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Resume to stage 2 requested where the exchange cannot take it
    #[error("Cannot resume installation to stage 2 from {phase}: {reason}")]
    ResumeRejected {
        phase: ExchangePhase,
        reason: &'static str,
    },

    /// Stage 2 work reported before the updater acknowledged stage 1
    #[error("{next} reported before the updater acknowledged stage 1")]
    Stage2Unacknowledged { next: InstallerMessageKind },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol version mismatch
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch { expected: u32, actual: u32 },

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Transport not connected
    #[error("Transport not connected")]
    NotConnected,
}

impl IpcError {
    /// Check if this error ends the current install attempt.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::ProtocolViolation { .. }
                | IpcError::ExtractionFailed
                | IpcError::PeerUnresponsive { .. }
                | IpcError::InvalidConfiguration(_)
                | IpcError::ResumeRejected { .. }
                | IpcError::Stage2Unacknowledged { .. }
                | IpcError::ConnectionClosed
                | IpcError::ProtocolVersionMismatch { .. }
                | IpcError::InvalidMessage(_)
        )
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
                IpcError::ConnectionClosed
            }
            _ => IpcError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            IpcError::IoError(err.to_string())
        } else if err.is_data() || err.is_syntax() || err.is_eof() {
            IpcError::DeserializationError(err.to_string())
        } else {
            IpcError::SerializationError(err.to_string())
        }
    }
}

impl From<autoupdate_config::ConfigError> for IpcError {
    fn from(err: autoupdate_config::ConfigError) -> Self {
        IpcError::InvalidConfiguration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_fatal() {
        assert!(IpcError::ProtocolViolation {
            previous: InstallerMessageKind::ArchiveExtractionFailed,
            next: InstallerMessageKind::ValidationStarted,
        }
        .is_fatal());
        assert!(IpcError::PeerUnresponsive {
            waited: Duration::from_secs(30)
        }
        .is_fatal());
        assert!(IpcError::InvalidConfiguration("Bundle".to_string()).is_fatal());
        assert!(IpcError::ConnectionClosed.is_fatal());
        assert!(IpcError::ResumeRejected {
            phase: ExchangePhase::Idle,
            reason: "no completed stage 1 on record",
        }
        .is_fatal());
        assert!(IpcError::Stage2Unacknowledged {
            next: InstallerMessageKind::InstallationFinishedStage2,
        }
        .is_fatal());
        assert!(!IpcError::IoError("network error".to_string()).is_fatal());
        assert!(!IpcError::NotConnected.is_fatal());
    }

    #[test]
    fn test_violation_message_names_both_kinds() {
        let err = IpcError::ProtocolViolation {
            previous: InstallerMessageKind::InstallationFinishedStage1,
            next: InstallerMessageKind::ValidationStarted,
        };
        let text = err.to_string();
        assert!(text.contains("InstallationFinishedStage1"));
        assert!(text.contains("ValidationStarted"));
    }

    #[test]
    fn test_resume_rejection_names_reason() {
        let err = IpcError::ResumeRejected {
            phase: ExchangePhase::Extracting,
            reason: "stage 1 has not completed in this session",
        };
        assert_eq!(
            err.to_string(),
            "Cannot resume installation to stage 2 from Extracting: stage 1 has not completed in this session"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let closed: IpcError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(matches!(closed, IpcError::ConnectionClosed));

        let other: IpcError = std::io::Error::other("boom").into();
        assert!(matches!(other, IpcError::IoError(_)));
    }
}
