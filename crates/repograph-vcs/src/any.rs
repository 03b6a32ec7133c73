use crate::bitbucket::BitbucketProvider;
use crate::error::Result;
use crate::git::GitCli;
use crate::github::GitHubProvider;
use crate::gitlab::GitLabProvider;
use crate::local::LocalProvider;
use crate::provider::VcsProvider;
use crate::types::{Branch, CommitInfo, RepoInfo};

/// Generates a match over all `AnyVcsProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyVcsProvider::GitHub($p) => $expr,
            AnyVcsProvider::GitLab($p) => $expr,
            AnyVcsProvider::Bitbucket($p) => $expr,
            AnyVcsProvider::Local($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyVcsProvider {
    GitHub(GitHubProvider),
    GitLab(GitLabProvider),
    Bitbucket(BitbucketProvider),
    Local(LocalProvider),
}

impl VcsProvider for AnyVcsProvider {
    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| p.name())
    }

    async fn list_branches(&self, remote_url: &str) -> Result<Vec<Branch>> {
        delegate_provider!(self, |p| p.list_branches(remote_url).await)
    }

    async fn get_repo_info(&self, remote_url: &str) -> Result<RepoInfo> {
        delegate_provider!(self, |p| p.get_repo_info(remote_url).await)
    }

    async fn get_latest_commit(&self, remote_url: &str, branch: Option<&str>) -> Result<CommitInfo> {
        delegate_provider!(self, |p| p.get_latest_commit(remote_url, branch).await)
    }

    async fn get_commits_since(
        &self,
        remote_url: &str,
        since_sha: &str,
        branch: Option<&str>,
    ) -> Result<Vec<CommitInfo>> {
        delegate_provider!(self, |p| p
            .get_commits_since(remote_url, since_sha, branch)
            .await)
    }

    fn clone_url(&self, remote_url: &str) -> Result<String> {
        delegate_provider!(self, |p| p.clone_url(remote_url))
    }

    fn git(&self) -> &GitCli {
        delegate_provider!(self, |p| p.git())
    }

    async fn get_default_branch(&self, remote_url: &str) -> String {
        delegate_provider!(self, |p| p.get_default_branch(remote_url).await)
    }

    async fn validate_access(&self, remote_url: &str) -> bool {
        delegate_provider!(self, |p| p.validate_access(remote_url).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_delegates_to_variant() {
        assert_eq!(AnyVcsProvider::GitHub(GitHubProvider::new(None)).name(), "github");
        assert_eq!(AnyVcsProvider::GitLab(GitLabProvider::new(None)).name(), "gitlab");
        assert_eq!(
            AnyVcsProvider::Bitbucket(BitbucketProvider::new(None)).name(),
            "bitbucket"
        );
        assert_eq!(AnyVcsProvider::Local(LocalProvider::default()).name(), "local");
    }

    #[tokio::test]
    async fn local_variant_validates_through_override() {
        let tmp = tempfile::tempdir().unwrap();
        let p = AnyVcsProvider::Local(LocalProvider::default());
        assert!(!p.validate_access(&tmp.path().display().to_string()).await);
    }
}
