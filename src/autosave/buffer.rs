//! Debounced progress autosave controller.
//!
//! One [`ProgressAutosave`] is owned per active subject. Rapid
//! [`schedule_save`](ProgressAutosave::schedule_save) calls accumulate into a
//! pending buffer that is flushed once after the inactivity delay. The first
//! call arms the timer; later calls only extend the buffer.
//!
//! Persistence is best-effort: failed writes are logged and dropped, leaving
//! the in-memory record untouched.

use crate::autosave::api::{HttpProgressApi, ProgressApi};
use crate::autosave::record::{ProgressRecord, ProgressUpdate, SubjectId};
use crate::config::AutosaveConfig;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Inactivity delay used when none is configured.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(5_000);

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct AutosaveState {
    pending: ProgressUpdate,
    timer: Option<JoinHandle<()>>,
    current: Option<ProgressRecord>,
    /// Sequence number of the most recently started request.
    write_seq: u64,
    /// Sequence number of the request whose result is in `current`.
    applied_seq: u64,
}

impl AutosaveState {
    fn begin_request(&mut self) -> u64 {
        self.write_seq += 1;
        self.write_seq
    }

    /// Store `record` unless a later-started request already landed.
    fn apply(&mut self, seq: u64, record: ProgressRecord) -> bool {
        if seq < self.applied_seq {
            return false;
        }
        self.applied_seq = seq;
        self.current = Some(record);
        true
    }
}

/// Per-subject autosave controller.
pub struct ProgressAutosave {
    subject_id: Option<SubjectId>,
    delay: Duration,
    api: Arc<dyn ProgressApi>,
    state: Arc<Mutex<AutosaveState>>,
}

impl std::fmt::Debug for ProgressAutosave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAutosave")
            .field("subject_id", &self.subject_id)
            .field("delay", &self.delay)
            .field("pending", &self.has_pending())
            .finish_non_exhaustive()
    }
}

impl ProgressAutosave {
    /// Controller for `subject_id`; `None` means nothing is selected and
    /// every save is a no-op.
    pub fn new(subject_id: Option<SubjectId>, api: Arc<dyn ProgressApi>) -> Self {
        Self {
            subject_id,
            delay: DEFAULT_AUTOSAVE_DELAY,
            api,
            state: Arc::new(Mutex::new(AutosaveState::default())),
        }
    }

    /// Controller talking to the HTTP persistence API at `config.api_base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BoardError::Progress`] if the HTTP client cannot be built.
    pub fn over_http(
        subject_id: Option<SubjectId>,
        config: &AutosaveConfig,
        user_id: Option<&str>,
    ) -> crate::Result<Self> {
        let mut api = HttpProgressApi::new(&config.api_base_url, HTTP_TIMEOUT)?;
        if let Some(user) = user_id {
            api = api.with_user(user);
        }
        Ok(Self::new(subject_id, Arc::new(api)).with_delay(config.delay()))
    }

    /// Override the inactivity delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn subject_id(&self) -> Option<SubjectId> {
        self.subject_id
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, AutosaveState> {
        lock_state(&self.state)
    }

    /// Last known authoritative record.
    pub fn progress(&self) -> Option<ProgressRecord> {
        self.lock().current.clone()
    }

    /// Whether a flush timer is armed.
    pub fn has_pending(&self) -> bool {
        self.lock().timer.is_some()
    }

    /// Buffer `update` and arm the flush timer if it is not already armed.
    ///
    /// Must be called from within a tokio runtime; outside one the update is
    /// buffered but no timer can be armed until a later call inside a runtime.
    pub fn schedule_save(&self, update: ProgressUpdate) {
        let Some(subject_id) = self.subject_id else {
            return;
        };
        let mut state = self.lock();
        state.pending.merge(update);
        if state.timer.is_some() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("cannot arm autosave timer for subject {subject_id}: {e}");
                return;
            }
        };
        let delay = self.delay;
        let api = Arc::clone(&self.api);
        let shared = Arc::clone(&self.state);
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            flush(subject_id, api.as_ref(), &shared).await;
        }));
        debug!("autosave armed for subject {subject_id} ({delay:?})");
    }

    /// Write `update` now, outside the debounce path.
    ///
    /// An armed timer is left alone and will still flush its own buffer.
    pub async fn immediate_save(&self, update: ProgressUpdate) {
        let Some(subject_id) = self.subject_id else {
            return;
        };
        let seq = self.lock().begin_request();
        match self.api.put(subject_id, &update).await {
            Ok(record) => {
                if !self.lock().apply(seq, record) {
                    debug!("immediate save for subject {subject_id} superseded by a newer write");
                }
            }
            Err(e) => warn!("immediate progress save for subject {subject_id} failed: {e}"),
        }
    }

    /// Fetch the stored record and seed the in-memory state with it.
    pub async fn load(&self) -> Option<ProgressRecord> {
        let subject_id = self.subject_id?;
        let seq = self.lock().begin_request();
        match self.api.get(subject_id).await {
            Ok(record) => {
                if let Some(record) = &record {
                    self.lock().apply(seq, record.clone());
                }
                record
            }
            Err(e) => {
                warn!("loading progress for subject {subject_id} failed: {e}");
                None
            }
        }
    }
}

impl Drop for ProgressAutosave {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
    }
}

fn lock_state(state: &Mutex<AutosaveState>) -> MutexGuard<'_, AutosaveState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn flush(subject_id: SubjectId, api: &dyn ProgressApi, state: &Mutex<AutosaveState>) {
    let (pending, seq) = {
        let mut guard = lock_state(state);
        guard.timer = None;
        let pending = std::mem::take(&mut guard.pending);
        if pending.is_empty() {
            return;
        }
        (pending, guard.begin_request())
    };
    match api.put(subject_id, &pending).await {
        Ok(record) => {
            if lock_state(state).apply(seq, record) {
                debug!("autosaved progress for subject {subject_id}");
            } else {
                debug!("autosave for subject {subject_id} superseded by a newer write");
            }
        }
        Err(e) => warn!("autosave for subject {subject_id} failed: {e}"),
    }
}
