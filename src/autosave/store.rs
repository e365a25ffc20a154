//! Server-side progress store backing the persistence API.
//!
//! One record per (user, subject). Writes are partial and persisted to a JSON
//! file when a state path is set.

use crate::autosave::api::ProgressApi;
use crate::autosave::record::{ProgressRecord, ProgressUpdate, SubjectId};
use crate::error::{BoardError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// User id used when a request does not name one.
pub const ANONYMOUS_USER: &str = "anonymous";

type Records = BTreeMap<(String, SubjectId), ProgressRecord>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    user_id: String,
    record: ProgressRecord,
}

/// Cheaply cloneable progress store handle.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    records: Arc<Mutex<Records>>,
    state_path: Option<Arc<PathBuf>>,
}

impl ProgressStore {
    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading existing records when present.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path)?;
        Ok(Self {
            records: Arc::new(Mutex::new(records)),
            state_path: Some(Arc::new(path)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record for (`user`, `subject`).
    pub fn get(&self, user: &str, subject: SubjectId) -> Option<ProgressRecord> {
        self.lock().get(&(user.to_owned(), subject)).cloned()
    }

    /// Apply `update` to (`user`, `subject`), creating the record on first write.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if persisting fails; memory is unchanged then.
    pub fn upsert(&self, user: &str, subject: SubjectId, update: &ProgressUpdate) -> Result<ProgressRecord> {
        let mut guard = self.lock();
        let key = (user.to_owned(), subject);
        let mut record = guard
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ProgressRecord::new(subject));
        update.apply_to(&mut record);
        record.updated_at = Some(Utc::now());

        if let Some(path) = &self.state_path {
            let mut next = guard.clone();
            next.insert(key.clone(), record.clone());
            save_records(path, &next)?;
        }
        guard.insert(key, record.clone());
        Ok(record)
    }

    /// [`ProgressStore::upsert`] for async callers. A persisted store does the
    /// file write on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressStore::upsert`], plus [`BoardError::Store`] if the
    /// blocking task dies.
    pub async fn upsert_async(
        &self,
        user: &str,
        subject: SubjectId,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord> {
        if self.state_path.is_none() {
            return self.upsert(user, subject, update);
        }
        let store = self.clone();
        let user = user.to_owned();
        let update = update.clone();
        tokio::task::spawn_blocking(move || store.upsert(&user, subject, &update))
            .await
            .map_err(|e| BoardError::Store(format!("progress write task failed: {e}")))?
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A [`ProgressApi`] view of this store for one user.
    pub fn api_for(&self, user: impl Into<String>) -> LocalProgressApi {
        LocalProgressApi {
            store: self.clone(),
            user: user.into(),
        }
    }
}

/// In-process [`ProgressApi`] over a [`ProgressStore`].
#[derive(Debug, Clone)]
pub struct LocalProgressApi {
    store: ProgressStore,
    user: String,
}

#[async_trait]
impl ProgressApi for LocalProgressApi {
    async fn get(&self, subject: SubjectId) -> Result<Option<ProgressRecord>> {
        Ok(self.store.get(&self.user, subject))
    }

    async fn put(&self, subject: SubjectId, update: &ProgressUpdate) -> Result<ProgressRecord> {
        self.store.upsert(&self.user, subject, update)
    }
}

fn load_records(path: &Path) -> Result<Records> {
    let bytes = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
        Err(e) => return Err(BoardError::Store(format!("cannot read progress: {e}"))),
    };
    let entries: Vec<StoredEntry> = serde_json::from_slice(&bytes)
        .map_err(|e| BoardError::Store(format!("cannot parse progress: {e}")))?;
    Ok(entries
        .into_iter()
        .map(|e| ((e.user_id, e.record.subject_id), e.record))
        .collect())
}

fn save_records(path: &Path, records: &Records) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BoardError::Store(format!("cannot create state dir: {e}")))?;
    }
    let entries: Vec<StoredEntry> = records
        .iter()
        .map(|((user_id, _), record)| StoredEntry {
            user_id: user_id.clone(),
            record: record.clone(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&entries)
        .map_err(|e| BoardError::Store(format!("cannot serialize progress: {e}")))?;
    std::fs::write(path, json).map_err(|e| BoardError::Store(format!("cannot write progress: {e}")))
}
