use std::future::Future;
use std::path::Path;

use crate::error::Result;
use crate::git::{GitCli, has_git_metadata};
use crate::types::{Branch, CloneOptions, CommitInfo, RepoInfo, pick_default_branch};

/// Uniform branch/commit/clone operations over one hosting service.
pub trait VcsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// All branches with their tip commit. One page only; hosts cap the page size.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be reached or rejects the request.
    fn list_branches(&self, remote_url: &str) -> impl Future<Output = Result<Vec<Branch>>> + Send;

    /// # Errors
    ///
    /// Returns an error if the host cannot be reached or the repository is unknown.
    fn get_repo_info(&self, remote_url: &str) -> impl Future<Output = Result<RepoInfo>> + Send;

    /// Tip commit of `branch`, or of the default branch when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be reached or the branch is unknown.
    fn get_latest_commit(
        &self,
        remote_url: &str,
        branch: Option<&str>,
    ) -> impl Future<Output = Result<CommitInfo>> + Send;

    /// Commits newer than `since_sha` (exclusive), newest first, capped at one page.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be reached or the branch is unknown.
    fn get_commits_since(
        &self,
        remote_url: &str,
        since_sha: &str,
        branch: Option<&str>,
    ) -> impl Future<Output = Result<Vec<CommitInfo>>> + Send;

    /// URL handed to `git clone`, with credentials in the userinfo component where configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote URL cannot be parsed.
    fn clone_url(&self, remote_url: &str) -> Result<String>;

    /// Subprocess runner used by [`VcsProvider::clone_or_pull`].
    fn git(&self) -> &GitCli;

    /// Default branch of the remote. Never fails: prefers the host-reported default, then
    /// `main`, `master`, `develop`, `trunk`, then the first branch listed, then `"main"`.
    fn get_default_branch(&self, remote_url: &str) -> impl Future<Output = String> + Send {
        async move {
            match self.get_repo_info(remote_url).await {
                Ok(info) if !info.default_branch.is_empty() => return info.default_branch,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(provider = self.name(), "repo info unavailable: {e}");
                }
            }
            match self.list_branches(remote_url).await {
                Ok(branches) => {
                    if let Some(name) = pick_default_branch(&branches) {
                        return name.to_owned();
                    }
                    tracing::warn!(provider = self.name(), "remote has no branches, assuming main");
                }
                Err(e) => {
                    tracing::warn!(
                        provider = self.name(),
                        "could not determine default branch, assuming main: {e}"
                    );
                }
            }
            "main".to_owned()
        }
    }

    /// True iff [`VcsProvider::get_repo_info`] succeeds.
    fn validate_access(&self, remote_url: &str) -> impl Future<Output = bool> + Send {
        async move { self.get_repo_info(remote_url).await.is_ok() }
    }

    /// Clone when `local_path` has no git metadata, otherwise fetch, hard-reset to the remote
    /// branch tip and remove untracked files.
    ///
    /// # Errors
    ///
    /// Returns an error if any git subprocess fails or times out.
    fn clone_or_pull(
        &self,
        remote_url: &str,
        local_path: &Path,
        branch: Option<&str>,
        opts: CloneOptions,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let branch = match branch {
                Some(b) => b.to_owned(),
                None => self.get_default_branch(remote_url).await,
            };
            if has_git_metadata(local_path) {
                tracing::debug!(path = %local_path.display(), %branch, "updating checkout");
                self.git()
                    .sync_to_remote(local_path, &branch, opts.depth)
                    .await
            } else {
                tracing::debug!(path = %local_path.display(), %branch, "cloning");
                let url = self.clone_url(remote_url)?;
                self.git()
                    .clone_repo(&url, local_path, Some(&branch), opts)
                    .await
            }
        }
    }
}
