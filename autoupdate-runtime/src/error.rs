//! Error types for installer and updater sessions

use autoupdate_ipc::IpcError;
use thiserror::Error;

/// Result alias for session operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Session errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Protocol and transport failures, including the protocol taxonomy
    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error("Stage record error: {0}")]
    StageRecord(String),

    #[error("Launch error: {0}")]
    Launch(String),

    /// An install step failed; the install attempt is over
    #[error("Install step failed: {0}")]
    Install(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// The underlying protocol error, if any
    pub fn as_ipc(&self) -> Option<&IpcError> {
        match self {
            RuntimeError::Ipc(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            RuntimeError::Ipc(err) => err.is_fatal(),
            RuntimeError::InvalidState(_) | RuntimeError::Install(_) => true,
            _ => false,
        }
    }
}

// Convert from config errors
impl From<autoupdate_config::ConfigError> for RuntimeError {
    fn from(err: autoupdate_config::ConfigError) -> Self {
        Self::Ipc(IpcError::from(err))
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::StageRecord(err.to_string())
    }
}
