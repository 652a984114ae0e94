//! Durable journal providers.
//!
//! DESIGN
//! ======
//! A provider stores an ordered list of [`RecordedEvent`]s per project. The
//! recorder's writer task is the only caller of `append`, so providers never
//! see interleaved writes for one project. `load` returns events in append
//! order.
//!
//! ERROR HANDLING
//! ==============
//! A missing journal is an empty journal, not an error. `FileStorage` keeps
//! the readable prefix of a journal whose tail was torn by a crash and logs
//! what it dropped; any other read failure surfaces as a `StorageError`.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use journal::{CodecError, RecordedEvent};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// File extension of an on-disk journal.
pub const JOURNAL_EXTENSION: &str = "journal";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal is unreadable: {0}")]
    Codec(#[from] CodecError),
    #[error("invalid project id `{0}`")]
    InvalidProjectId(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Async journal backend. Enables swapping disk for memory in tests.
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// Every stored event for `project_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be read.
    async fn load(&self, project_id: &str) -> Result<Vec<RecordedEvent>, StorageError>;

    /// Append one event to the end of the project's journal.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the write fails; the caller may retry.
    async fn append(&self, project_id: &str, event: &RecordedEvent) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY
// =============================================================================

/// In-process journal. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    projects: Arc<RwLock<HashMap<String, Vec<RecordedEvent>>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with one project's events.
    #[must_use]
    pub fn with_events(project_id: &str, events: Vec<RecordedEvent>) -> Self {
        let mut projects = HashMap::new();
        projects.insert(project_id.to_owned(), events);
        Self { projects: Arc::new(RwLock::new(projects)) }
    }

    /// Copy of a project's events.
    pub async fn events(&self, project_id: &str) -> Vec<RecordedEvent> {
        self.projects
            .read()
            .await
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StorageProvider for MemoryStorage {
    async fn load(&self, project_id: &str) -> Result<Vec<RecordedEvent>, StorageError> {
        Ok(self.events(project_id).await)
    }

    async fn append(&self, project_id: &str, event: &RecordedEvent) -> Result<(), StorageError> {
        self.projects
            .write()
            .await
            .entry(project_id.to_owned())
            .or_default()
            .push(event.clone());
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// One length-delimited protobuf journal per project under `dir`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Journal path for a project.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidProjectId`] unless the id is non-empty
    /// ASCII alphanumerics, `-` and `_`.
    pub fn journal_path(&self, project_id: &str) -> Result<PathBuf, StorageError> {
        validate_project_id(project_id)?;
        Ok(self.dir.join(format!("{project_id}.{JOURNAL_EXTENSION}")))
    }
}

#[async_trait::async_trait]
impl StorageProvider for FileStorage {
    async fn load(&self, project_id: &str) -> Result<Vec<RecordedEvent>, StorageError> {
        let path = self.journal_path(project_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(project_id, "no journal on disk");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let prefix = journal::decode_journal_prefix(&bytes);
        if let Some(e) = prefix.error {
            warn!(
                error = %e,
                project_id,
                kept = prefix.events.len(),
                dropped_bytes = bytes.len() - prefix.consumed,
                "journal tail unreadable; truncating to readable prefix"
            );
            // Later appends must land right after the last whole record.
            let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
            file.set_len(prefix.consumed as u64).await?;
            file.sync_all().await?;
        }
        Ok(prefix.events)
    }

    async fn append(&self, project_id: &str, event: &RecordedEvent) -> Result<(), StorageError> {
        let path = self.journal_path(project_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut bytes = Vec::new();
        journal::append_event(event, &mut bytes);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

fn validate_project_id(project_id: &str) -> Result<(), StorageError> {
    let valid = !project_id.is_empty()
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid { Ok(()) } else { Err(StorageError::InvalidProjectId(project_id.to_owned())) }
}
