//! Reminder template store.
//!
//! Templates live in memory and, when a state path is set, are written to a
//! versioned JSON file after every mutation. A mutation only takes effect in
//! memory once the file write succeeded. The write runs under the store mutex,
//! so the file never lags the map; template sets stay small and change at
//! admin rate.

use crate::error::{BoardError, Result};
use crate::reminders::template::{NewTemplate, ReminderTemplate, TemplateId, TemplatePatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Largest page a list call returns.
pub const MAX_PAGE_SIZE: usize = 200;

/// One page of templates, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePage {
    pub items: Vec<ReminderTemplate>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Persisted store state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    /// Schema version.
    #[serde(default = "default_state_version")]
    version: u8,
    #[serde(default)]
    next_id: TemplateId,
    #[serde(default)]
    templates: Vec<ReminderTemplate>,
}

fn default_state_version() -> u8 {
    1
}

#[derive(Debug, Clone)]
struct Inner {
    next_id: TemplateId,
    templates: BTreeMap<TemplateId, ReminderTemplate>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            next_id: 1,
            templates: BTreeMap::new(),
        }
    }
}

impl Inner {
    fn key_taken(&self, key: &str, except: Option<TemplateId>) -> bool {
        self.templates
            .values()
            .any(|t| t.key == key && Some(t.id) != except)
    }
}

/// Template store with key uniqueness enforced on insert and update.
#[derive(Debug)]
pub struct TemplateStore {
    inner: Mutex<Inner>,
    state_path: Option<PathBuf>,
}

impl TemplateStore {
    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            state_path: None,
        }
    }

    /// Open a store backed by `path`, loading existing state when present.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = load_state(&path)?;
        debug!(
            "loaded {} reminder template(s) from {}",
            inner.templates.len(),
            path.display()
        );
        Ok(Self {
            inner: Mutex::new(inner),
            state_path: Some(path),
        })
    }

    /// Path of the backing file, if any.
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, guard: &mut MutexGuard<'_, Inner>, next: Inner) -> Result<()> {
        if let Some(path) = &self.state_path {
            save_state(path, &next)?;
        }
        **guard = next;
        Ok(())
    }

    /// Insert a new template, assigning the next id.
    ///
    /// # Errors
    ///
    /// [`BoardError::Validation`] for a blank key, [`BoardError::DuplicateKey`]
    /// if the key is taken, [`BoardError::Store`] if persisting fails.
    pub fn insert(&self, new: NewTemplate) -> Result<ReminderTemplate> {
        let key = new.key.trim();
        if key.is_empty() {
            return Err(BoardError::Validation("template key is required".to_owned()));
        }

        let mut guard = self.lock();
        if guard.key_taken(key, None) {
            return Err(BoardError::DuplicateKey(key.to_owned()));
        }

        let mut next = guard.clone();
        let id = next.next_id;
        next.next_id += 1;
        let template = ReminderTemplate::from_new(id, new);
        next.templates.insert(id, template.clone());
        self.commit(&mut guard, next)?;
        Ok(template)
    }

    /// Apply `patch` to template `id`.
    ///
    /// # Errors
    ///
    /// [`BoardError::TemplateNotFound`], [`BoardError::Validation`] for a blank
    /// key, [`BoardError::DuplicateKey`], or [`BoardError::Store`].
    pub fn update(&self, id: TemplateId, patch: TemplatePatch) -> Result<ReminderTemplate> {
        let mut guard = self.lock();
        if !guard.templates.contains_key(&id) {
            return Err(BoardError::TemplateNotFound(id));
        }
        if let Some(key) = patch.key.as_deref().map(str::trim) {
            if key.is_empty() {
                return Err(BoardError::Validation("template key is required".to_owned()));
            }
            if guard.key_taken(key, Some(id)) {
                return Err(BoardError::DuplicateKey(key.to_owned()));
            }
        }

        let mut next = guard.clone();
        let Some(template) = next.templates.get_mut(&id) else {
            return Err(BoardError::TemplateNotFound(id));
        };
        patch.apply(template);
        let updated = template.clone();
        self.commit(&mut guard, next)?;
        Ok(updated)
    }

    /// Remove template `id`. Returns `true` when it existed.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if persisting fails.
    pub fn delete(&self, id: TemplateId) -> Result<bool> {
        let mut guard = self.lock();
        if !guard.templates.contains_key(&id) {
            return Ok(false);
        }
        let mut next = guard.clone();
        next.templates.remove(&id);
        self.commit(&mut guard, next)?;
        Ok(true)
    }

    /// Look up template `id`.
    pub fn get(&self, id: TemplateId) -> Option<ReminderTemplate> {
        self.lock().templates.get(&id).cloned()
    }

    /// Page through templates, newest (highest id) first.
    pub fn list(&self, limit: usize, offset: usize) -> TemplatePage {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let guard = self.lock();
        let items = guard
            .templates
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        TemplatePage {
            items,
            total: guard.templates.len(),
            limit,
            offset,
        }
    }

    /// Templates that are enabled and carry a cron expression.
    pub fn schedulable(&self) -> Vec<ReminderTemplate> {
        self.lock()
            .templates
            .values()
            .filter(|t| t.wants_schedule())
            .cloned()
            .collect()
    }

    /// Number of stored templates.
    pub fn len(&self) -> usize {
        self.lock().templates.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().templates.is_empty()
    }
}

fn load_state(path: &Path) -> Result<Inner> {
    let bytes = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Inner::default()),
        Err(e) => return Err(BoardError::Store(format!("cannot read templates: {e}"))),
    };

    let state: StoreState = serde_json::from_slice(&bytes)
        .map_err(|e| BoardError::Store(format!("cannot parse templates: {e}")))?;

    let templates: BTreeMap<_, _> = state.templates.into_iter().map(|t| (t.id, t)).collect();
    let max_id = templates.keys().next_back().copied().unwrap_or(0);
    Ok(Inner {
        next_id: state.next_id.max(max_id + 1),
        templates,
    })
}

fn save_state(path: &Path, inner: &Inner) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BoardError::Store(format!("cannot create state dir: {e}")))?;
    }

    let state = StoreState {
        version: default_state_version(),
        next_id: inner.next_id,
        templates: inner.templates.values().cloned().collect(),
    };
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| BoardError::Store(format!("cannot serialize templates: {e}")))?;
    std::fs::write(path, json).map_err(|e| BoardError::Store(format!("cannot write templates: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = TemplateStore::in_memory();
        let a = store.insert(NewTemplate::new("a")).unwrap();
        let b = store.insert(NewTemplate::new("b")).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let store = TemplateStore::in_memory();
        store.insert(NewTemplate::new("t1")).unwrap();
        let err = store.insert(NewTemplate::new(" t1 ")).unwrap_err();
        assert!(matches!(err, BoardError::DuplicateKey(ref k) if k == "t1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn blank_key_is_rejected() {
        let store = TemplateStore::in_memory();
        assert!(matches!(
            store.insert(NewTemplate::new("  ")),
            Err(BoardError::Validation(_))
        ));
    }

    #[test]
    fn update_checks_existence_and_key_uniqueness() {
        let store = TemplateStore::in_memory();
        let a = store.insert(NewTemplate::new("a")).unwrap();
        store.insert(NewTemplate::new("b")).unwrap();

        let rename = TemplatePatch {
            key: Some("b".to_owned()),
            ..TemplatePatch::default()
        };
        assert!(matches!(
            store.update(a.id, rename),
            Err(BoardError::DuplicateKey(_))
        ));

        let same_key = TemplatePatch {
            key: Some("a".to_owned()),
            title: Some("renamed".to_owned()),
            ..TemplatePatch::default()
        };
        assert_eq!(store.update(a.id, same_key).unwrap().title, "renamed");

        assert!(matches!(
            store.update(99, TemplatePatch::default()),
            Err(BoardError::TemplateNotFound(99))
        ));
    }

    #[test]
    fn list_is_newest_first_and_paged() {
        let store = TemplateStore::in_memory();
        for key in ["a", "b", "c", "d"] {
            store.insert(NewTemplate::new(key)).unwrap();
        }
        let page = store.list(2, 1);
        assert_eq!(page.total, 4);
        let keys: Vec<_> = page.items.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "b"]);

        assert_eq!(store.list(10_000, 0).limit, MAX_PAGE_SIZE);
        assert!(store.list(10, 10).items.is_empty());
    }

    #[test]
    fn schedulable_filters_disabled_and_cronless() {
        let store = TemplateStore::in_memory();
        store.insert(NewTemplate::new("on").cron("* * * * *")).unwrap();
        store
            .insert(NewTemplate::new("off").cron("* * * * *").enabled(false))
            .unwrap();
        store.insert(NewTemplate::new("none")).unwrap();
        let keys: Vec<_> = store.schedulable().into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["on".to_owned()]);
    }

    #[test]
    fn persisted_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("templates.json");

        {
            let store = TemplateStore::open(&path).unwrap();
            store.insert(NewTemplate::new("a").cron("0 6 * * *")).unwrap();
            let b = store.insert(NewTemplate::new("b")).unwrap();
            assert!(store.delete(b.id).unwrap());
        }

        let reopened = TemplateStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(1).unwrap().schedule_cron.as_deref(), Some("0 6 * * *"));
        // Ids are never reused after delete.
        let c = reopened.insert(NewTemplate::new("c")).unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(TemplateStore::open(&path), Err(BoardError::Store(_))));
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        let path = dir.path().join("templates.json");
        std::fs::create_dir_all(&path).unwrap();
        let store = TemplateStore {
            inner: Mutex::new(Inner::default()),
            state_path: Some(path),
        };
        assert!(matches!(store.insert(NewTemplate::new("a")), Err(BoardError::Store(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn delete_missing_is_false() {
        let store = TemplateStore::in_memory();
        assert!(!store.delete(5).unwrap());
    }
}
