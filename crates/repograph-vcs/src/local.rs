use std::path::{Path, PathBuf};

use crate::error::{Result, VcsError};
use crate::git::{GitCli, has_git_metadata};
use crate::provider::VcsProvider;
use crate::types::{Branch, CommitInfo, RepoInfo};

const LOG_LIMIT: usize = 100;

/// Repositories reachable on the local filesystem: `local:///path`, `file:///path` or a bare
/// absolute path. All queries go through the git CLI.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider {
    git: GitCli,
}

impl LocalProvider {
    #[must_use]
    pub fn new(git: GitCli) -> Self {
        Self { git }
    }

    /// Filesystem path behind a local remote URL.
    #[must_use]
    pub fn resolve_path(remote_url: &str) -> PathBuf {
        let trimmed = remote_url.trim();
        let path = trimmed
            .strip_prefix("local://")
            .or_else(|| trimmed.strip_prefix("file://"))
            .unwrap_or(trimmed);
        PathBuf::from(path)
    }

    fn repo_dir(remote_url: &str) -> Result<PathBuf> {
        let path = Self::resolve_path(remote_url);
        if !path.is_dir() {
            return Err(VcsError::NotFound(format!("local: {}", path.display())));
        }
        Ok(path)
    }

    async fn branch_or_head(&self, dir: &Path, branch: Option<&str>) -> Result<String> {
        if let Some(b) = branch {
            return Ok(b.to_owned());
        }
        Ok(self
            .git
            .current_branch(dir)
            .await?
            .unwrap_or_else(|| "HEAD".to_owned()))
    }
}

impl VcsProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list_branches(&self, remote_url: &str) -> Result<Vec<Branch>> {
        let dir = Self::repo_dir(remote_url)?;
        let current = self.git.current_branch(&dir).await?;
        self.git.local_branches(&dir, current.as_deref()).await
    }

    async fn get_repo_info(&self, remote_url: &str) -> Result<RepoInfo> {
        let dir = Self::repo_dir(remote_url)?;
        if !has_git_metadata(&dir) {
            return Err(VcsError::NotFound(format!(
                "local: {} is not a git repository",
                dir.display()
            )));
        }
        let default_branch = self.git.current_branch(&dir).await?.unwrap_or_default();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(RepoInfo {
            name,
            full_name: dir.display().to_string(),
            default_branch,
            is_private: true,
            clone_url: dir.display().to_string(),
            description: None,
            language: None,
        })
    }

    async fn get_latest_commit(&self, remote_url: &str, branch: Option<&str>) -> Result<CommitInfo> {
        let dir = Self::repo_dir(remote_url)?;
        let rev = self.branch_or_head(&dir, branch).await?;
        self.git
            .log(&dir, &rev, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VcsError::NotFound(format!("local: no commits on {rev}")))
    }

    async fn get_commits_since(
        &self,
        remote_url: &str,
        since_sha: &str,
        branch: Option<&str>,
    ) -> Result<Vec<CommitInfo>> {
        let dir = Self::repo_dir(remote_url)?;
        let rev = self.branch_or_head(&dir, branch).await?;
        Ok(self
            .git
            .log(&dir, &rev, LOG_LIMIT)
            .await?
            .into_iter()
            .take_while(|c| c.sha != since_sha)
            .collect())
    }

    fn clone_url(&self, remote_url: &str) -> Result<String> {
        Ok(format!("file://{}", Self::resolve_path(remote_url).display()))
    }

    fn git(&self) -> &GitCli {
        &self.git
    }

    async fn validate_access(&self, remote_url: &str) -> bool {
        let path = Self::resolve_path(remote_url);
        path.is_dir() && has_git_metadata(&path)
    }
}
