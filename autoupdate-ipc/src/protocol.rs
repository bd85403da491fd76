//! Message kinds, messages and the envelope that carries them

use autoupdate_config::InstallationType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::IpcError;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Messages sent by the installer, in temporal order.
///
/// The discriminant is the wire value. Stage legality is decided by
/// [`crate::stage::is_legal_transition`], never by comparing these numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum InstallerMessageKind {
    NotStarted = 0,
    ExtractionStarted = 1,
    ExtractedArchiveWithProgress = 2,
    ArchiveExtractionFailed = 3,
    ValidationStarted = 4,
    InstallationStartedStage1 = 5,
    InstallationFinishedStage1 = 6,
    InstallationFinishedStage2 = 7,
    InstallationFinishedStage3 = 8,
    AlivePing = 9,
}

impl InstallerMessageKind {
    /// All kinds, indexed by ordinal
    pub const ALL: [InstallerMessageKind; 10] = [
        InstallerMessageKind::NotStarted,
        InstallerMessageKind::ExtractionStarted,
        InstallerMessageKind::ExtractedArchiveWithProgress,
        InstallerMessageKind::ArchiveExtractionFailed,
        InstallerMessageKind::ValidationStarted,
        InstallerMessageKind::InstallationStartedStage1,
        InstallerMessageKind::InstallationFinishedStage1,
        InstallerMessageKind::InstallationFinishedStage2,
        InstallerMessageKind::InstallationFinishedStage3,
        InstallerMessageKind::AlivePing,
    ];

    pub const fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallerMessageKind::NotStarted => "NotStarted",
            InstallerMessageKind::ExtractionStarted => "ExtractionStarted",
            InstallerMessageKind::ExtractedArchiveWithProgress => "ExtractedArchiveWithProgress",
            InstallerMessageKind::ArchiveExtractionFailed => "ArchiveExtractionFailed",
            InstallerMessageKind::ValidationStarted => "ValidationStarted",
            InstallerMessageKind::InstallationStartedStage1 => "InstallationStartedStage1",
            InstallerMessageKind::InstallationFinishedStage1 => "InstallationFinishedStage1",
            InstallerMessageKind::InstallationFinishedStage2 => "InstallationFinishedStage2",
            InstallerMessageKind::InstallationFinishedStage3 => "InstallationFinishedStage3",
            InstallerMessageKind::AlivePing => "AlivePing",
        }
    }

    /// Liveness traffic sits outside the staged sequence
    pub fn is_liveness(&self) -> bool {
        matches!(self, InstallerMessageKind::AlivePing)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, InstallerMessageKind::ArchiveExtractionFailed)
    }

    /// Stage 2 and later; only reported once the updater acknowledged stage 1
    pub fn is_past_stage1(&self) -> bool {
        matches!(
            self,
            InstallerMessageKind::InstallationFinishedStage2
                | InstallerMessageKind::InstallationFinishedStage3
        )
    }
}

impl From<InstallerMessageKind> for i32 {
    fn from(kind: InstallerMessageKind) -> Self {
        kind.ordinal()
    }
}

impl TryFrom<i32> for InstallerMessageKind {
    type Error = IpcError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| InstallerMessageKind::ALL.get(index).copied())
            .ok_or_else(|| IpcError::InvalidMessage(format!("unknown installer message kind {}", value)))
    }
}

impl fmt::Display for InstallerMessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands sent by the updater. These are independent, not stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum UpdaterMessageKind {
    InstallationData = 0,
    SentUpdateAppcastItemData = 1,
    ResumeInstallationToStage2 = 2,
    AlivePong = 3,
}

impl UpdaterMessageKind {
    pub const ALL: [UpdaterMessageKind; 4] = [
        UpdaterMessageKind::InstallationData,
        UpdaterMessageKind::SentUpdateAppcastItemData,
        UpdaterMessageKind::ResumeInstallationToStage2,
        UpdaterMessageKind::AlivePong,
    ];

    pub const fn value(self) -> i32 {
        self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdaterMessageKind::InstallationData => "InstallationData",
            UpdaterMessageKind::SentUpdateAppcastItemData => "SentUpdateAppcastItemData",
            UpdaterMessageKind::ResumeInstallationToStage2 => "ResumeInstallationToStage2",
            UpdaterMessageKind::AlivePong => "AlivePong",
        }
    }
}

impl From<UpdaterMessageKind> for i32 {
    fn from(kind: UpdaterMessageKind) -> Self {
        kind.value()
    }
}

impl TryFrom<i32> for UpdaterMessageKind {
    type Error = IpcError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| UpdaterMessageKind::ALL.get(index).copied())
            .ok_or_else(|| IpcError::InvalidMessage(format!("unknown updater message kind {}", value)))
    }
}

impl fmt::Display for UpdaterMessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message emitted by the installer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerMessage {
    pub kind: InstallerMessageKind,
    #[serde(default)]
    pub payload: Bytes,
}

impl InstallerMessage {
    pub fn new(kind: InstallerMessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A message with no payload
    pub fn signal(kind: InstallerMessageKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Extraction progress, a fraction clamped to `[0, 1]`
    pub fn extraction_progress(progress: f64) -> Self {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        Self::new(
            InstallerMessageKind::ExtractedArchiveWithProgress,
            progress.to_le_bytes().to_vec(),
        )
    }

    /// Decode the progress fraction carried by `ExtractedArchiveWithProgress`
    pub fn progress(&self) -> Option<f64> {
        if self.kind != InstallerMessageKind::ExtractedArchiveWithProgress {
            return None;
        }
        let bytes: [u8; 8] = self.payload.as_ref().try_into().ok()?;
        Some(f64::from_le_bytes(bytes))
    }
}

/// Message emitted by the updater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterMessage {
    pub kind: UpdaterMessageKind,
    #[serde(default)]
    pub payload: Bytes,
}

impl UpdaterMessage {
    pub fn new(kind: UpdaterMessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn signal(kind: UpdaterMessageKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Wrap the installation input as an `InstallationData` message
    pub fn installation_data(input: &InstallationInput) -> Result<Self, IpcError> {
        let payload = serde_json::to_vec(input)?;
        Ok(Self::new(UpdaterMessageKind::InstallationData, payload))
    }

    /// Wrap an archive descriptor under `archive_key`
    pub fn appcast_item(descriptor: &ArchiveDescriptor, archive_key: &str) -> Result<Self, IpcError> {
        let mut body = BTreeMap::new();
        body.insert(archive_key, descriptor);
        let payload = serde_json::to_vec(&body)?;
        Ok(Self::new(UpdaterMessageKind::SentUpdateAppcastItemData, payload))
    }

    pub fn decode_installation_data(&self) -> Result<InstallationInput, IpcError> {
        self.expect_kind(UpdaterMessageKind::InstallationData)?;
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn decode_appcast_item(&self, archive_key: &str) -> Result<ArchiveDescriptor, IpcError> {
        self.expect_kind(UpdaterMessageKind::SentUpdateAppcastItemData)?;
        let mut body: BTreeMap<String, ArchiveDescriptor> = serde_json::from_slice(&self.payload)?;
        body.remove(archive_key).ok_or_else(|| {
            IpcError::InvalidMessage(format!("appcast item payload has no '{}' entry", archive_key))
        })
    }

    fn expect_kind(&self, kind: UpdaterMessageKind) -> Result<(), IpcError> {
        if self.kind != kind {
            return Err(IpcError::InvalidMessage(format!(
                "expected {} payload, got {}",
                kind, self.kind
            )));
        }
        Ok(())
    }
}

/// Input the installer needs to extract and apply an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationInput {
    pub host_bundle_path: String,
    pub relaunch_path: String,
    pub update_directory_path: String,
    pub download_name: String,
    pub installation_type: InstallationType,
    pub expected_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ed_signature: Option<String>,
}

/// Archive descriptor of the appcast item being installed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub url: String,
    pub content_length: u64,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ed_signature: Option<String>,
}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    /// Pairs an `AlivePing` with its `AlivePong`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            correlation_id: None,
            message,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}
