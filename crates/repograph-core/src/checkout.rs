//! Local working copies, one directory per repository id.
//!
//! A directory holding git metadata is a valid checkout and is brought to the remote branch tip
//! in place. Anything else at that path is untrusted and destroyed before a fresh clone. Cleanup
//! retries with exponential backoff and falls back to renaming the directory into quarantine.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use repograph_vcs::git::has_git_metadata;
use repograph_vcs::{CloneOptions, VcsError, VcsProvider};

use crate::config::CheckoutConfig;
use crate::error::CheckoutError;

const HINT_CLEANUP: &str = "the directory is locked or not writable; stop processes holding it \
                            open and remove it manually before retrying";
const HINT_CLONE: &str = "check the remote URL, credentials and network; retrying is safe";
const HINT_UPDATE: &str = "fetch or reset failed; retrying is safe, or delete the checkout to force \
                           a fresh clone";
const HINT_IO: &str = "check permissions and free space under the checkout root";

/// Blocking filesystem primitives used by cleanup. Swappable so contention can be simulated.
pub trait FsOps: Send + Sync {
    /// # Errors
    ///
    /// Propagates the underlying filesystem error.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// # Errors
    ///
    /// Propagates the underlying filesystem error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl FsOps for RealFs {
    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// `None` clones full history.
    pub clone_depth: Option<u32>,
    pub cleanup_retries: u32,
    pub cleanup_backoff: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self::from(&CheckoutConfig::default())
    }
}

impl From<&CheckoutConfig> for CheckoutSettings {
    fn from(config: &CheckoutConfig) -> Self {
        Self {
            clone_depth: (config.clone_depth > 0).then_some(config.clone_depth),
            cleanup_retries: config.cleanup_retries.max(1),
            cleanup_backoff: Duration::from_millis(config.cleanup_backoff_ms),
        }
    }
}

/// A checkout brought to the remote tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub local_path: PathBuf,
    pub head_sha: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Nothing existed at the path.
    Absent,
    Removed { attempts: u32 },
    /// Deletion kept failing; the directory was moved aside.
    Quarantined { to: PathBuf },
}

pub struct CheckoutManager {
    root: PathBuf,
    settings: CheckoutSettings,
    fs: Arc<dyn FsOps>,
}

impl std::fmt::Debug for CheckoutManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutManager")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CheckoutManager {
    pub fn new(root: impl Into<PathBuf>, settings: CheckoutSettings) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            settings,
            fs: Arc::new(RealFs),
        }
    }

    #[must_use]
    pub fn from_config(config: &CheckoutConfig) -> Self {
        Self::new(config.root_dir.clone(), CheckoutSettings::from(config))
    }

    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FsOps>) -> Self {
        self.fs = fs;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic directory for `repo_id`, distinct for distinct ids. Ids made only of
    /// `[A-Za-z0-9._-]` are used as is; others are sanitized and suffixed with a digest of the id.
    #[must_use]
    pub fn checkout_path(&self, repo_id: &str) -> PathBuf {
        self.root.join(dir_name(repo_id))
    }

    /// Clone or update the checkout for `repo_id` and return its HEAD.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Clone`] / [`CheckoutError::Update`] when git fails (retry is safe),
    /// [`CheckoutError::Cleanup`] when a stale directory can neither be deleted nor quarantined,
    /// [`CheckoutError::Io`] when the checkout root cannot be created.
    pub async fn ensure_checkout<P: VcsProvider>(
        &self,
        provider: &P,
        repo_id: &str,
        remote_url: &str,
        branch: Option<&str>,
    ) -> Result<Checkout, CheckoutError> {
        let path = self.checkout_path(repo_id);
        let branch = match branch {
            Some(b) => b.to_owned(),
            None => provider.get_default_branch(remote_url).await,
        };
        let opts = CloneOptions {
            depth: self.settings.clone_depth,
            single_branch: true,
        };

        let updating = has_git_metadata(&path);
        if updating {
            tracing::debug!(repo_id, path = %path.display(), %branch, "updating checkout");
        } else {
            if self.exists(repo_id, &path).await? {
                tracing::warn!(repo_id, path = %path.display(), "checkout has no git metadata, recreating");
                self.cleanup_dir(repo_id, &path).await?;
            }
            tokio::fs::create_dir_all(&self.root)
                .await
                .map_err(|source| self.io_error(repo_id, &path, source))?;
            tracing::info!(repo_id, path = %path.display(), %branch, "cloning");
        }

        let git_error = |source: VcsError| {
            if updating {
                self.update_error(repo_id, &path, source)
            } else {
                self.clone_error(repo_id, &path, source)
            }
        };
        provider
            .clone_or_pull(remote_url, &path, Some(&branch), opts)
            .await
            .map_err(git_error)?;
        let head_sha = provider.git().head_sha(&path).await.map_err(git_error)?;

        tracing::debug!(repo_id, %head_sha, "checkout ready");
        Ok(Checkout {
            local_path: path,
            head_sha,
            branch,
        })
    }

    /// Remove the checkout of `repo_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Cleanup`] if the directory can neither be deleted nor quarantined.
    pub async fn delete_checkout(&self, repo_id: &str) -> Result<CleanupOutcome, CheckoutError> {
        let path = self.checkout_path(repo_id);
        let outcome = self.cleanup_dir(repo_id, &path).await?;
        tracing::info!(repo_id, ?outcome, "checkout deleted");
        Ok(outcome)
    }

    /// Delete `path` recursively, retrying with exponential backoff; after the last failed
    /// attempt rename it to a timestamped quarantine sibling.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Cleanup`] only if both deletion and the quarantine rename fail.
    pub async fn cleanup_dir(
        &self,
        repo_id: &str,
        path: &Path,
    ) -> Result<CleanupOutcome, CheckoutError> {
        if !self.exists(repo_id, path).await? {
            return Ok(CleanupOutcome::Absent);
        }

        let attempts = self.settings.cleanup_retries.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            let fs = Arc::clone(&self.fs);
            let target = path.to_path_buf();
            let result = tokio::task::spawn_blocking(move || fs.remove_dir_all(&target))
                .await
                .unwrap_or_else(|e| Err(io::Error::other(e)));
            match result {
                Ok(()) => return Ok(CleanupOutcome::Removed { attempts: attempt }),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(CleanupOutcome::Removed { attempts: attempt });
                }
                Err(e) => {
                    tracing::warn!(repo_id, path = %path.display(), attempt, "delete failed: {e}");
                    last_err = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        let quarantine = quarantine_path(path);
        let fs = Arc::clone(&self.fs);
        let (from, to) = (path.to_path_buf(), quarantine.clone());
        let renamed = tokio::task::spawn_blocking(move || fs.rename(&from, &to))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));
        match renamed {
            Ok(()) => {
                tracing::warn!(
                    repo_id,
                    path = %path.display(),
                    quarantine = %quarantine.display(),
                    "delete kept failing, directory quarantined"
                );
                Ok(CleanupOutcome::Quarantined { to: quarantine })
            }
            Err(rename_err) => {
                let delete_err = last_err.map_or_else(|| "unknown".to_owned(), |e| e.to_string());
                Err(CheckoutError::Cleanup {
                    repo_id: repo_id.to_owned(),
                    relative: self.relative(path),
                    absolute: path.to_path_buf(),
                    hint: HINT_CLEANUP,
                    source: io::Error::new(
                        rename_err.kind(),
                        format!(
                            "delete failed after {attempts} attempts ({delete_err}), \
                             quarantine rename failed ({rename_err})"
                        ),
                    ),
                })
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(10);
        self.settings.cleanup_backoff.saturating_mul(factor)
    }

    async fn exists(&self, repo_id: &str, path: &Path) -> Result<bool, CheckoutError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|source| self.io_error(repo_id, path, source))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn clone_error(&self, repo_id: &str, path: &Path, source: VcsError) -> CheckoutError {
        CheckoutError::Clone {
            repo_id: repo_id.to_owned(),
            relative: self.relative(path),
            absolute: path.to_path_buf(),
            hint: HINT_CLONE,
            source,
        }
    }

    fn update_error(&self, repo_id: &str, path: &Path, source: VcsError) -> CheckoutError {
        CheckoutError::Update {
            repo_id: repo_id.to_owned(),
            relative: self.relative(path),
            absolute: path.to_path_buf(),
            hint: HINT_UPDATE,
            source,
        }
    }

    fn io_error(&self, repo_id: &str, path: &Path, source: io::Error) -> CheckoutError {
        CheckoutError::Io {
            repo_id: repo_id.to_owned(),
            relative: self.relative(path),
            absolute: path.to_path_buf(),
            hint: HINT_IO,
            source,
        }
    }
}

pub(crate) fn dir_name(repo_id: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if repo_id.chars().all(safe) && !matches!(repo_id, "" | "." | "..") {
        return repo_id.to_owned();
    }
    // `~` never occurs in a pass-through name, so rewritten ids cannot collide with one
    let sanitized: String = repo_id
        .chars()
        .map(|c| if safe(c) && c != '.' { c } else { '_' })
        .collect();
    let digest = repograph_index::ids::content_hash(repo_id.as_bytes());
    format!("{sanitized}~{}", &digest[..16])
}

fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let name = path
        .file_name()
        .map_or_else(|| "checkout".into(), |n| n.to_string_lossy());
    path.with_file_name(format!("{name}.quarantine-{stamp}"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use repograph_vcs::git::GitCli;
    use repograph_vcs::local::LocalProvider;

    use super::*;
    use crate::test_support::{commit, init_origin};

    /// Fails the first `failures` deletions, then delegates to the real filesystem.
    struct FlakyFs {
        failures: u32,
        calls: AtomicU32,
        rename_fails: bool,
    }

    impl FlakyFs {
        fn new(failures: u32, rename_fails: bool) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                rename_fails,
            }
        }
    }

    impl FsOps for FlakyFs {
        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file in use"));
            }
            std::fs::remove_dir_all(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if self.rename_fails {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            std::fs::rename(from, to)
        }
    }

    fn settings(retries: u32) -> CheckoutSettings {
        CheckoutSettings {
            clone_depth: Some(10),
            cleanup_retries: retries,
            cleanup_backoff: Duration::from_millis(1),
        }
    }

    fn junk_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/file.txt"), "stale").unwrap();
        dir
    }

    #[test]
    fn checkout_path_is_sanitized() {
        let mgr = CheckoutManager::new("/data/checkouts", CheckoutSettings::default());
        assert_eq!(
            mgr.checkout_path("repo-1.v2_x"),
            PathBuf::from("/data/checkouts/repo-1.v2_x")
        );
        let nested = mgr.checkout_path("acme/app#1");
        assert_eq!(nested.parent(), Some(Path::new("/data/checkouts")));
        let name = nested.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("acme_app_1~"), "{name}");
        assert_eq!(mgr.checkout_path("acme/app#1"), nested);

        for id in ["", ".", ".."] {
            let path = mgr.checkout_path(id);
            assert_eq!(path.parent(), Some(Path::new("/data/checkouts")), "{id:?}");
            assert!(!path.file_name().unwrap().to_string_lossy().starts_with('.'));
        }
    }

    #[test]
    fn distinct_ids_never_share_a_checkout() {
        let mgr = CheckoutManager::new("/data/checkouts", CheckoutSettings::default());
        let ids = [
            "acme/app", "acme_app", "acme:app", "acme app", "acme\\app", "", ".", "..", "_", "__",
        ];
        let paths: std::collections::HashSet<PathBuf> =
            ids.iter().map(|id| mgr.checkout_path(id)).collect();
        assert_eq!(paths.len(), ids.len());
    }

    #[test]
    fn settings_from_config() {
        let config = CheckoutConfig {
            clone_depth: 0,
            cleanup_retries: 0,
            ..CheckoutConfig::default()
        };
        let s = CheckoutSettings::from(&config);
        assert_eq!(s.clone_depth, None);
        assert_eq!(s.cleanup_retries, 1);
    }

    #[test]
    fn backoff_doubles() {
        let mgr = CheckoutManager::new("/tmp", settings(3));
        assert_eq!(mgr.backoff(1), Duration::from_millis(1));
        assert_eq!(mgr.backoff(3), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn cleanup_of_missing_dir_is_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckoutManager::new(tmp.path(), settings(3));
        let outcome = mgr.cleanup_dir("r1", &tmp.path().join("nope")).await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Absent);
    }

    #[tokio::test]
    async fn cleanup_retries_through_transient_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = junk_dir(tmp.path(), "r1");
        let fs = Arc::new(FlakyFs::new(2, true));
        let mgr = CheckoutManager::new(tmp.path(), settings(3)).with_fs(fs.clone());

        let outcome = mgr.cleanup_dir("r1", &dir).await.unwrap();
        assert_eq!(outcome, CleanupOutcome::Removed { attempts: 3 });
        assert!(!dir.exists());
        assert_eq!(fs.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cleanup_quarantines_when_delete_keeps_failing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = junk_dir(tmp.path(), "r1");
        let mgr =
            CheckoutManager::new(tmp.path(), settings(2)).with_fs(Arc::new(FlakyFs::new(99, false)));

        let outcome = mgr.cleanup_dir("r1", &dir).await.unwrap();
        let CleanupOutcome::Quarantined { to } = outcome else {
            panic!("expected quarantine, got {outcome:?}");
        };
        assert!(!dir.exists());
        assert!(to.join("nested/file.txt").exists());
        let name = to.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("r1.quarantine-"), "{name}");
    }

    #[tokio::test]
    async fn cleanup_fails_only_when_rename_fails_too() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = junk_dir(tmp.path(), "r1");
        let mgr =
            CheckoutManager::new(tmp.path(), settings(2)).with_fs(Arc::new(FlakyFs::new(99, true)));

        let err = mgr.cleanup_dir("r1", &dir).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Cleanup { .. }));
        assert!(!err.is_retry_safe());
        let msg = err.to_string();
        assert!(msg.contains("after 2 attempts"), "{msg}");
        assert!(msg.contains(&dir.display().to_string()), "{msg}");
        assert!(dir.exists());
    }

    #[tokio::test]
    #[cfg(not(target_os = "windows"))]
    async fn ensure_checkout_clones_then_follows_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin");
        let provider = LocalProvider::new(GitCli::default());
        init_origin(provider.git(), &origin, &[("src/a.ts", "export const a = 1;")]).await;
        let url = format!("local://{}", origin.display());
        let mgr = CheckoutManager::new(tmp.path().join("checkouts"), settings(3));

        let first = mgr.ensure_checkout(&provider, "r1", &url, None).await.unwrap();
        assert_eq!(first.branch, "main");
        assert!(first.local_path.join("src/a.ts").exists());

        commit(provider.git(), &origin, "src/b.ts", "export const b = 2;").await;
        std::fs::write(first.local_path.join("scratch.txt"), "local drift").unwrap();

        let second = mgr.ensure_checkout(&provider, "r1", &url, Some("main")).await.unwrap();
        assert_ne!(first.head_sha, second.head_sha);
        assert!(second.local_path.join("src/b.ts").exists());
        assert!(!second.local_path.join("scratch.txt").exists());
    }

    #[tokio::test]
    #[cfg(not(target_os = "windows"))]
    async fn ensure_checkout_survives_flaky_cleanup_of_stale_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin");
        let provider = LocalProvider::new(GitCli::default());
        init_origin(provider.git(), &origin, &[("main.go", "package main")]).await;
        let url = format!("local://{}", origin.display());

        let root = tmp.path().join("checkouts");
        junk_dir(&root, "r1");
        let mgr = CheckoutManager::new(&root, settings(4)).with_fs(Arc::new(FlakyFs::new(3, true)));

        let checkout = mgr.ensure_checkout(&provider, "r1", &url, None).await.unwrap();
        assert!(checkout.local_path.join("main.go").exists());
        assert!(!checkout.local_path.join("nested").exists());
    }

    #[tokio::test]
    async fn clone_failure_is_retry_safe() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProvider::new(GitCli::default());
        let mgr = CheckoutManager::new(tmp.path().join("checkouts"), settings(1));
        let url = format!("local://{}", tmp.path().join("missing").display());

        let err = mgr
            .ensure_checkout(&provider, "r1", &url, Some("main"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Clone { .. }), "{err:?}");
        assert!(err.is_retry_safe());
        assert_eq!(err.repo_id(), "r1");
    }

    #[tokio::test]
    #[cfg(not(target_os = "windows"))]
    async fn delete_checkout_removes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckoutManager::new(tmp.path(), settings(1));
        let dir = junk_dir(tmp.path(), "r1");
        assert_eq!(
            mgr.delete_checkout("r1").await.unwrap(),
            CleanupOutcome::Removed { attempts: 1 }
        );
        assert!(!dir.exists());
        assert_eq!(mgr.delete_checkout("r1").await.unwrap(), CleanupOutcome::Absent);
    }
}
