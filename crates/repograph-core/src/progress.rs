use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::repository::ScanStatus;

/// Live progress of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub status: ScanStatus,
    pub percent: u8,
    pub step: String,
    pub details: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    #[must_use]
    pub fn from_status(status: ScanStatus) -> Self {
        Self {
            status,
            percent: status.percent(),
            step: status.label().to_owned(),
            details: None,
            updated_at: Utc::now(),
        }
    }
}

struct Entry {
    progress: Progress,
    generation: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

/// Ephemeral per-repository progress records. A record is created when a run starts and evicted
/// a fixed delay after it finishes, unless a newer run has claimed the id in the meantime.
#[derive(Clone)]
pub struct ProgressTracker {
    state: Arc<Mutex<State>>,
    retention: Duration,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            retention,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a fresh record for `repo_id`, replacing any retained one.
    pub fn begin(&self, repo_id: &str) {
        let mut state = self.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(
            repo_id.to_owned(),
            Entry {
                progress: Progress::from_status(ScanStatus::Pending),
                generation,
            },
        );
    }

    pub fn update(&self, repo_id: &str, status: ScanStatus, details: Option<String>) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(repo_id) {
            entry.progress = Progress {
                details,
                ..Progress::from_status(status)
            };
        }
    }

    /// Attach a detail message without changing status.
    pub fn note(&self, repo_id: &str, details: impl Into<String>) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(repo_id) {
            entry.progress.details = Some(details.into());
            entry.progress.updated_at = Utc::now();
        }
    }

    #[must_use]
    pub fn get(&self, repo_id: &str) -> Option<Progress> {
        self.lock()
            .entries
            .get(repo_id)
            .map(|e| e.progress.clone())
    }

    /// Remove the record for `repo_id` after the retention delay. Must be called from within a
    /// tokio runtime.
    pub fn schedule_eviction(&self, repo_id: &str) {
        let Some(generation) = self.lock().entries.get(repo_id).map(|e| e.generation) else {
            return;
        };
        let tracker = self.clone();
        let repo_id = repo_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.retention).await;
            let mut state = tracker.lock();
            if state
                .entries
                .get(&repo_id)
                .is_some_and(|e| e.generation == generation)
            {
                state.entries.remove(&repo_id);
                tracing::debug!(repo_id, "progress record evicted");
            }
        });
    }
}
