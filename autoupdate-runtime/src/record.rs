//! Persisted knowledge of completed install stages
//!
//! The installer writes a record when stage 1 completes so that a relaunched
//! installer can honour `ResumeInstallationToStage2` and still knows what it
//! was installing. Records are removed once the install finishes.

use async_trait::async_trait;
use autoupdate_ipc::InstallationInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// What a previous session left behind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub bundle_identifier: String,
    pub version: String,
    pub stage1_completed_at: DateTime<Utc>,
    /// Installation data of the interrupted install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InstallationInput>,
}

/// Storage for stage records, keyed by bundle identifier
#[async_trait]
pub trait StageRecordStore: Send + Sync {
    async fn load(&self, bundle_identifier: &str) -> RuntimeResult<Option<StageRecord>>;

    async fn save(&self, record: &StageRecord) -> RuntimeResult<()>;

    async fn clear(&self, bundle_identifier: &str) -> RuntimeResult<()>;

    async fn stage1_completed(&self, bundle_identifier: &str) -> RuntimeResult<bool> {
        Ok(self.load(bundle_identifier).await?.is_some())
    }
}

/// One JSON file per bundle identifier
#[derive(Debug, Clone)]
pub struct FileStageRecordStore {
    directory: PathBuf,
}

impl FileStageRecordStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, bundle_identifier: &str) -> PathBuf {
        let file_stem: String = bundle_identifier
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.directory.join(format!("{}.stage.json", file_stem))
    }
}

#[async_trait]
impl StageRecordStore for FileStageRecordStore {
    async fn load(&self, bundle_identifier: &str) -> RuntimeResult<Option<StageRecord>> {
        let path = self.path_for(bundle_identifier);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record: StageRecord = serde_json::from_slice(&content)?;
        if record.bundle_identifier != bundle_identifier {
            return Err(RuntimeError::StageRecord(format!(
                "record at {} belongs to {}",
                path.display(),
                record.bundle_identifier
            )));
        }
        Ok(Some(record))
    }

    async fn save(&self, record: &StageRecord) -> RuntimeResult<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(&record.bundle_identifier);
        let content = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), "Saved stage record");
        Ok(())
    }

    async fn clear(&self, bundle_identifier: &str) -> RuntimeResult<()> {
        match tokio::fs::remove_file(self.path_for(bundle_identifier)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and single-process setups
#[derive(Debug, Default)]
pub struct MemoryStageRecordStore {
    records: Mutex<HashMap<String, StageRecord>>,
}

impl MemoryStageRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StageRecordStore for MemoryStageRecordStore {
    async fn load(&self, bundle_identifier: &str) -> RuntimeResult<Option<StageRecord>> {
        Ok(self.records.lock().await.get(bundle_identifier).cloned())
    }

    async fn save(&self, record: &StageRecord) -> RuntimeResult<()> {
        self.records
            .lock()
            .await
            .insert(record.bundle_identifier.clone(), record.clone());
        Ok(())
    }

    async fn clear(&self, bundle_identifier: &str) -> RuntimeResult<()> {
        self.records.lock().await.remove(bundle_identifier);
        Ok(())
    }
}

#[async_trait]
impl<S: StageRecordStore + ?Sized> StageRecordStore for std::sync::Arc<S> {
    async fn load(&self, bundle_identifier: &str) -> RuntimeResult<Option<StageRecord>> {
        (**self).load(bundle_identifier).await
    }

    async fn save(&self, record: &StageRecord) -> RuntimeResult<()> {
        (**self).save(record).await
    }

    async fn clear(&self, bundle_identifier: &str) -> RuntimeResult<()> {
        (**self).clear(bundle_identifier).await
    }
}
