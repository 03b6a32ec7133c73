use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-repository mutual exclusion. Waiters queue on a fair async mutex, so every caller runs
/// eventually, one at a time, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of a run. Dropping it releases the repository.
#[derive(Debug)]
pub struct RepoGuard {
    repo_id: String,
    _guard: OwnedMutexGuard<()>,
    locks: RepoLocks,
}

impl RepoLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `repo_id`, then hold it.
    pub async fn acquire(&self, repo_id: &str) -> RepoGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(repo_id.to_owned()).or_default())
        };
        if lock.try_lock().is_err() {
            tracing::debug!(repo_id, "run in progress, waiting for lock");
        }
        let guard = lock.lock_owned().await;
        RepoGuard {
            repo_id: repo_id.to_owned(),
            _guard: guard,
            locks: self.clone(),
        }
    }

    /// Whether a run currently holds `repo_id`.
    #[must_use]
    pub fn is_locked(&self, repo_id: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(repo_id).is_some_and(|l| l.try_lock().is_err())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for RepoGuard {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // two references remain when nobody else waits: the map entry and our guard's mutex
        if locks
            .get(&self.repo_id)
            .is_some_and(|l| Arc::strong_count(l) <= 2)
        {
            locks.remove(&self.repo_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = RepoLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("r1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = RepoLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert!(locks.is_locked("a"));
    }

    #[tokio::test]
    async fn released_on_drop() {
        let locks = RepoLocks::new();
        let guard = locks.acquire("r1").await;
        assert!(locks.is_locked("r1"));
        drop(guard);
        assert!(!locks.is_locked("r1"));
        assert_eq!(locks.len(), 0);
    }
}
