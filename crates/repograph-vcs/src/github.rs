use serde::Deserialize;

use crate::credentials::Credentials;
use crate::error::Result;
use crate::git::GitCli;
use crate::http::default_client;
use crate::provider::VcsProvider;
use crate::redact::redact_credentials;
use crate::remote::{RemoteRef, authenticated_clone_url};
use crate::retry::send_checked;
use crate::types::{Branch, CommitInfo, RepoInfo};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const TOKEN_USER: &str = "x-access-token";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct GitHubProvider {
    client: reqwest::Client,
    api_url: String,
    credentials: Option<Credentials>,
    git: GitCli,
}

impl GitHubProvider {
    #[must_use]
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            client: default_client(),
            api_url: DEFAULT_API_URL.to_owned(),
            credentials,
            git: GitCli::default(),
        }
    }

    /// Point API calls at a different base, e.g. `https://ghe.example.com/api/v3`.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_git(mut self, git: GitCli) -> Self {
        self.git = git;
        self
    }

    /// API base for a GitHub Enterprise host.
    #[must_use]
    pub fn enterprise_api_url(host: &str) -> String {
        format!("https://{host}/api/v3")
    }

    fn repo_endpoint(&self, remote_url: &str) -> Result<String> {
        let remote = RemoteRef::parse(remote_url)?;
        Ok(format!(
            "{}/repos/{}/{}",
            self.api_url,
            remote.owner(),
            remote.name()
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = send_checked("github", what, || {
            let req = self
                .client
                .get(url)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28");
            match &self.credentials {
                Some(c) => c.apply(req).send(),
                None => req.send(),
            }
        })
        .await?;
        Ok(response.json().await?)
    }
}

#[derive(Deserialize)]
struct ApiBranch {
    name: String,
    commit: ApiCommitRef,
}

#[derive(Deserialize)]
struct ApiCommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    full_name: String,
    #[serde(default)]
    default_branch: String,
    #[serde(default)]
    private: bool,
    clone_url: String,
    description: Option<String>,
    language: Option<String>,
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    #[serde(default)]
    parents: Vec<ApiCommitRef>,
}

#[derive(Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: ApiSignature,
}

#[derive(Deserialize)]
struct ApiSignature {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    date: String,
}

impl From<ApiCommit> for CommitInfo {
    fn from(c: ApiCommit) -> Self {
        Self {
            sha: c.sha,
            message: c.commit.message,
            author: c.commit.author.name,
            author_email: c.commit.author.email,
            timestamp: c.commit.author.date,
            parent_sha: c.parents.into_iter().next().map(|p| p.sha),
        }
    }
}

impl VcsProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_branches(&self, remote_url: &str) -> Result<Vec<Branch>> {
        let url = format!(
            "{}/branches?per_page={PAGE_SIZE}",
            self.repo_endpoint(remote_url)?
        );
        let branches: Vec<ApiBranch> = self.get_json(&url, "branches").await?;
        let default = self
            .get_repo_info(remote_url)
            .await
            .ok()
            .map(|info| info.default_branch);
        Ok(branches
            .into_iter()
            .map(|b| Branch {
                is_default: default.as_deref() == Some(b.name.as_str()),
                name: b.name,
                commit_sha: b.commit.sha,
            })
            .collect())
    }

    async fn get_repo_info(&self, remote_url: &str) -> Result<RepoInfo> {
        let url = self.repo_endpoint(remote_url)?;
        let repo: ApiRepo = self.get_json(&url, &redact_credentials(remote_url)).await?;
        Ok(RepoInfo {
            name: repo.name,
            full_name: repo.full_name,
            default_branch: repo.default_branch,
            is_private: repo.private,
            clone_url: repo.clone_url,
            description: repo.description,
            language: repo.language,
        })
    }

    async fn get_latest_commit(&self, remote_url: &str, branch: Option<&str>) -> Result<CommitInfo> {
        let branch = match branch {
            Some(b) => b.to_owned(),
            None => self.get_default_branch(remote_url).await,
        };
        let url = format!("{}/commits/{branch}", self.repo_endpoint(remote_url)?);
        let commit: ApiCommit = self.get_json(&url, &format!("branch {branch}")).await?;
        Ok(commit.into())
    }

    async fn get_commits_since(
        &self,
        remote_url: &str,
        since_sha: &str,
        branch: Option<&str>,
    ) -> Result<Vec<CommitInfo>> {
        let branch = match branch {
            Some(b) => b.to_owned(),
            None => self.get_default_branch(remote_url).await,
        };
        let url = format!(
            "{}/commits?sha={branch}&per_page={PAGE_SIZE}",
            self.repo_endpoint(remote_url)?
        );
        let commits: Vec<ApiCommit> = self.get_json(&url, &format!("branch {branch}")).await?;
        Ok(commits
            .into_iter()
            .take_while(|c| c.sha != since_sha)
            .map(CommitInfo::from)
            .collect())
    }

    fn clone_url(&self, remote_url: &str) -> Result<String> {
        authenticated_clone_url(remote_url, self.credentials.as_ref(), TOKEN_USER)
    }

    fn git(&self) -> &GitCli {
        &self.git
    }
}
