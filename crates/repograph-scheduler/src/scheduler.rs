use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use repograph_core::config::SyncConfig;
use repograph_core::{Repository, RepositoryStore};
use repograph_vcs::{ProviderFactory, VcsProvider};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::error::SchedulerError;

/// Which repositories one cycle touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// A previous cycle was still running; nothing was checked.
    pub skipped: bool,
    pub checked: Vec<String>,
    pub changed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    Unchanged,
    Changed { sha: String, new_commits: usize },
}

/// Whether `repo` is due for a remote check at `now`: never checked, or its interval has
/// elapsed since the later of the last recorded sync and the last check.
#[must_use]
pub fn is_due(repo: &Repository, last_checked: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let last = match (repo.last_synced_at, last_checked) {
        (Some(a), Some(b)) => a.max(b),
        (a, b) => match a.or(b) {
            Some(t) => t,
            None => return true,
        },
    };
    last + TimeDelta::minutes(i64::from(repo.sync_interval_minutes)) <= now
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncScheduler {
    repos: Arc<dyn RepositoryStore>,
    providers: ProviderFactory,
    interval: Duration,
    syncing: AtomicBool,
    last_checked: Mutex<HashMap<String, DateTime<Utc>>>,
    changed_tx: Option<mpsc::Sender<String>>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("interval", &self.interval)
            .field("syncing", &self.syncing)
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    #[must_use]
    pub fn new(
        repos: Arc<dyn RepositoryStore>,
        providers: ProviderFactory,
        interval: Duration,
    ) -> Self {
        Self {
            repos,
            providers,
            interval,
            syncing: AtomicBool::new(false),
            last_checked: Mutex::new(HashMap::new()),
            changed_tx: None,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &SyncConfig,
        repos: Arc<dyn RepositoryStore>,
        providers: ProviderFactory,
    ) -> Self {
        Self::new(repos, providers, Duration::from_secs(config.interval_secs))
    }

    /// Publish the id of every repository whose remote moved.
    #[must_use]
    pub fn with_changed_sender(mut self, tx: mpsc::Sender<String>) -> Self {
        self.changed_tx = Some(tx);
        self
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Start a cycle every interval until `shutdown` turns true. Each cycle runs on its own task;
    /// a tick that arrives while the previous cycle is still running is skipped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "sync scheduler started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        scheduler.run_cycle().await;
                    });
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        tracing::info!("sync scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Check every due, sync-enabled repository once.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("previous sync cycle still running, skipping");
            return CycleOutcome {
                skipped: true,
                ..CycleOutcome::default()
            };
        }
        let _guard = CycleGuard(&self.syncing);

        let mut outcome = CycleOutcome::default();
        let repos = match self.repos.list_sync_enabled().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("could not list repositories for sync: {e}");
                return outcome;
            }
        };

        let listed: HashSet<String> = repos.iter().map(|r| r.id.clone()).collect();
        let now = Utc::now();
        for repo in repos {
            if !is_due(&repo, self.last_checked(&repo.id), now) {
                continue;
            }
            outcome.checked.push(repo.id.clone());
            match self.sync_repository(&repo).await {
                Ok(SyncResult::Unchanged) => {
                    tracing::debug!(repo_id = %repo.id, "remote unchanged");
                }
                Ok(SyncResult::Changed { sha, new_commits }) => {
                    tracing::info!(repo_id = %repo.id, %sha, new_commits, "remote moved, marked pending");
                    if let Some(tx) = &self.changed_tx
                        && tx.send(repo.id.clone()).await.is_err()
                    {
                        tracing::debug!("changed-repository receiver dropped");
                    }
                    outcome.changed.push(repo.id.clone());
                }
                Err(e) => {
                    tracing::warn!(repo_id = %repo.id, "sync check failed: {e}");
                    outcome.failed.push(repo.id.clone());
                }
            }
            self.mark_checked(&repo.id, now);
        }
        self.forget_unlisted(&listed);

        if !outcome.checked.is_empty() {
            tracing::info!(
                checked = outcome.checked.len(),
                changed = outcome.changed.len(),
                failed = outcome.failed.len(),
                "sync cycle finished"
            );
        }
        outcome
    }

    /// Compare the remote tip with the last synced hash and record drift.
    ///
    /// # Errors
    ///
    /// Returns an error if the latest commit cannot be fetched or the new hash cannot be stored.
    pub async fn sync_repository(&self, repo: &Repository) -> Result<SyncResult, SchedulerError> {
        let provider = self.providers.provider_for(&repo.url);
        let branch = repo.branch.as_deref();
        let latest = provider.get_latest_commit(&repo.url, branch).await?;
        if repo.last_synced_sha.as_deref() == Some(latest.sha.as_str()) {
            return Ok(SyncResult::Unchanged);
        }

        // the first observation is a baseline; no history is backfilled
        let new_commits = match repo.last_synced_sha.as_deref() {
            Some(prev) => match provider.get_commits_since(&repo.url, prev, branch).await {
                Ok(commits) => commits.len(),
                Err(e) => {
                    tracing::debug!(repo_id = %repo.id, "commits since {prev} unavailable: {e}");
                    0
                }
            },
            None => 0,
        };

        self.repos
            .record_sync(&repo.id, &latest.sha, Utc::now())
            .await?;
        Ok(SyncResult::Changed {
            sha: latest.sha,
            new_commits,
        })
    }

    fn last_checked(&self, repo_id: &str) -> Option<DateTime<Utc>> {
        self.last_checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repo_id)
            .copied()
    }

    fn mark_checked(&self, repo_id: &str, at: DateTime<Utc>) {
        self.last_checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repo_id.to_owned(), at);
    }

    /// Drop check times of repositories that were deleted or had sync turned off.
    fn forget_unlisted(&self, listed: &HashSet<String>) {
        self.last_checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, _| listed.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use repograph_core::SqliteRepositoryStore;
    use repograph_vcs::VcsConfig;
    use repograph_vcs::git::GitCli;

    use super::*;

    fn repo(interval: u32) -> Repository {
        Repository::new("r1", "https://github.com/acme/app").with_sync(true, interval)
    }

    #[test]
    fn never_checked_is_due() {
        assert!(is_due(&repo(15), None, Utc::now()));
    }

    #[test]
    fn interval_counts_from_latest_observation() {
        let now = Utc::now();
        let mut r = repo(15);
        r.last_synced_at = Some(now - TimeDelta::minutes(60));
        assert!(is_due(&r, None, now));
        assert!(!is_due(&r, Some(now - TimeDelta::minutes(5)), now));
        assert!(is_due(&r, Some(now - TimeDelta::minutes(15)), now));

        r.last_synced_at = Some(now - TimeDelta::minutes(1));
        assert!(!is_due(&r, Some(now - TimeDelta::minutes(30)), now));
    }

    #[test]
    fn zero_interval_is_always_due() {
        let now = Utc::now();
        let mut r = repo(0);
        r.last_synced_at = Some(now);
        assert!(is_due(&r, Some(now), now));
    }

    fn tracked(scheduler: &SyncScheduler) -> Vec<String> {
        let mut ids: Vec<String> = scheduler
            .last_checked
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn check_times_follow_the_sync_enabled_set() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("local://{}", tmp.path().join("missing").display());
        let store = Arc::new(SqliteRepositoryStore::open(":memory:").await.unwrap());
        for id in ["a", "b", "c"] {
            store
                .insert(&Repository::new(id, url.clone()).with_sync(true, 0))
                .await
                .unwrap();
        }
        let scheduler = SyncScheduler::new(
            store.clone(),
            ProviderFactory::new(VcsConfig::default(), GitCli::default()),
            Duration::from_secs(60),
        );

        scheduler.run_cycle().await;
        assert_eq!(tracked(&scheduler), ["a", "b", "c"]);

        assert!(store.delete("b").await.unwrap());
        store
            .insert(&Repository::new("d", url.clone()).with_sync(false, 0))
            .await
            .unwrap();
        let outcome = scheduler.run_cycle().await;
        assert_eq!(outcome.failed, ["a", "c"]);
        assert_eq!(tracked(&scheduler), ["a", "c"]);

        assert!(store.delete("a").await.unwrap());
        assert!(store.delete("c").await.unwrap());
        scheduler.run_cycle().await;
        assert!(tracked(&scheduler).is_empty());
    }
}
