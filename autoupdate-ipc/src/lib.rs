//! Installer/updater control-channel protocol
//!
//! This crate provides the message kinds exchanged between the updater and
//! the privileged installer, the stage legality table, the install exchange
//! state machine, endpoint naming, and the transports that carry envelopes
//! between the two processes.

pub mod error;
pub mod exchange;
pub mod naming;
pub mod protocol;
pub mod stage;
pub mod transport;

// Re-export commonly used types
pub use error::{IpcError, IpcResult};
pub use exchange::{ExchangePhase, ExchangeState, Transition};
pub use naming::{
    authorization_right_name, installer_job_label, installer_service_name,
    progress_agent_service_name, progress_job_label, status_info_service_name, EndpointIdentity,
    MAX_SERVICE_NAME_LEN,
};
pub use protocol::{
    ArchiveDescriptor, InstallationInput, InstallerMessage, InstallerMessageKind, MessageEnvelope,
    UpdaterMessage, UpdaterMessageKind, IPC_PROTOCOL_VERSION,
};
pub use stage::{is_legal_first, is_legal_transition};
pub use transport::{
    duplex_pair, ChildProcessTransport, DuplexTransport, IpcTransport, StdioTransport,
    StreamTransport,
};
