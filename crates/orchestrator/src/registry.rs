//! Job state ownership and progress polling.
//!
//! The registry is the only writer-facing surface for job state: the
//! pipeline task for a job is its single writer, while any number of
//! callers poll concurrently. State is held behind the [`JobStore`] trait
//! so the in-memory store can be swapped for a shared one without touching
//! the orchestrator.

use crate::core::{JobState, ScanJob, ScanResult};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One job plus, once terminal, its result document.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub job: ScanJob,
    pub result: Option<ScanResult>,
}

/// Answer to a results poll.
#[derive(Debug, Clone)]
pub enum ResultPoll {
    /// Job reached a terminal state with a full result.
    Ready(ScanResult),
    /// Job reached `Timeout` or `Error`; no partial result exists.
    Failed { state: JobState, error: String },
    /// Still running.
    Running {
        state: JobState,
        progress: u8,
        message: String,
    },
}

pub trait JobStore: Send + Sync {
    fn insert(&self, entry: JobEntry);

    fn get(&self, id: &str) -> Option<JobEntry>;

    /// Apply `mutate` to an active job. Returns false when the id is
    /// unknown or already retired.
    fn update(&self, id: &str, mutate: &mut dyn FnMut(&mut JobEntry)) -> bool;

    /// Move a job out of the active set into the bounded terminal cache.
    fn retire(&self, id: &str);
}

/// Default single-process store: active jobs in a map, terminal jobs in an
/// LRU so history stays bounded over the process lifetime. Active jobs are
/// never evicted.
pub struct InMemoryJobStore {
    active: RwLock<HashMap<String, JobEntry>>,
    terminal: Mutex<LruCache<String, JobEntry>>,
}

impl InMemoryJobStore {
    pub fn new(max_terminal_jobs: usize) -> Self {
        let capacity = NonZeroUsize::new(max_terminal_jobs.max(1)).expect("capacity is non-zero");
        Self {
            active: RwLock::new(HashMap::new()),
            terminal: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, entry: JobEntry) {
        self.active.write().insert(entry.job.id.clone(), entry);
    }

    fn get(&self, id: &str) -> Option<JobEntry> {
        if let Some(entry) = self.active.read().get(id) {
            return Some(entry.clone());
        }
        self.terminal.lock().get(id).cloned()
    }

    fn update(&self, id: &str, mutate: &mut dyn FnMut(&mut JobEntry)) -> bool {
        let mut active = self.active.write();
        match active.get_mut(id) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }

    fn retire(&self, id: &str) {
        let entry = self.active.write().remove(id);
        if let Some(entry) = entry {
            self.terminal.lock().put(id.to_string(), entry);
        }
    }
}

pub struct ScanJobRegistry {
    store: Arc<dyn JobStore>,
}

impl ScanJobRegistry {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn in_memory(max_terminal_jobs: usize) -> Self {
        Self::new(Arc::new(InMemoryJobStore::new(max_terminal_jobs)))
    }

    pub fn create(&self) -> String {
        let id = Uuid::new_v4().simple().to_string()[..16].to_string();
        let job = ScanJob::new(id.clone());
        self.store.insert(JobEntry { job, result: None });
        debug!(job_id = %id, "created scan job");
        id
    }

    /// Advance progress and message. Writes against a terminal job are
    /// rejected and logged, preserving terminal immutability.
    pub fn update(&self, id: &str, progress: u8, message: impl Into<String>) {
        let message = message.into();
        let applied = self.store.update(id, &mut |entry| {
            if entry.job.state.is_terminal() {
                warn!(job_id = %id, state = %entry.job.state, "ignoring update to terminal job");
                return;
            }
            entry.job.progress = progress.min(100);
            entry.job.message = message.clone();
        });
        if !applied {
            warn!(job_id = %id, "update for unknown or retired job");
        }
    }

    /// Move the state machine forward. Backward transitions and writes to
    /// terminal jobs are no-ops.
    pub fn set_state(&self, id: &str, state: JobState) {
        self.store.update(id, &mut |entry| {
            if entry.job.state.is_terminal() {
                warn!(job_id = %id, current = %entry.job.state, "ignoring state change on terminal job");
                return;
            }
            if state < entry.job.state {
                warn!(job_id = %id, current = %entry.job.state, requested = %state, "ignoring backward state change");
                return;
            }
            entry.job.state = state;
        });
    }

    /// Record the completed result and retire the job. Exactly one
    /// terminal write wins; later ones are ignored.
    pub fn complete(&self, id: &str, result: ScanResult) {
        self.store.update(id, &mut |entry| {
            if entry.job.state.is_terminal() {
                warn!(job_id = %id, "ignoring completion of terminal job");
                return;
            }
            entry.job.state = JobState::Completed;
            entry.job.progress = 100;
            entry.job.message = "Scan completed".to_string();
            entry.job.completed_at = Some(chrono::Utc::now());
            entry.result = Some(result.clone());
        });
        self.store.retire(id);
    }

    /// Mark the job failed. `state` must be `Timeout` or `Error`; no
    /// result document is attached.
    pub fn fail(&self, id: &str, state: JobState, error: impl Into<String>) {
        debug_assert!(state.is_terminal() && state != JobState::Completed);
        let error = error.into();
        self.store.update(id, &mut |entry| {
            if entry.job.state.is_terminal() {
                warn!(job_id = %id, "ignoring failure of terminal job");
                return;
            }
            entry.job.state = state;
            entry.job.message = error.clone();
            entry.job.error = Some(error.clone());
            entry.job.completed_at = Some(chrono::Utc::now());
        });
        self.store.retire(id);
    }

    pub fn get(&self, id: &str) -> Option<ScanJob> {
        self.store.get(id).map(|entry| entry.job)
    }

    pub fn result(&self, id: &str) -> Option<ResultPoll> {
        let entry = self.store.get(id)?;
        let poll = match (entry.job.state, entry.result) {
            (JobState::Completed, Some(result)) => ResultPoll::Ready(result),
            (state, _) if state.is_terminal() => ResultPoll::Failed {
                state,
                error: entry.job.error.unwrap_or_else(|| "scan failed".to_string()),
            },
            (state, _) => ResultPoll::Running {
                state,
                progress: entry.job.progress,
                message: entry.job.message,
            },
        };
        Some(poll)
    }
}
