//! Best-effort collaborators invoked mid-pipeline: the full-text search indexer (notified after a
//! graph write, queried read-only) and the mirror store (receives a copy of each checkout).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use repograph_vcs::Secret;
use serde::{Deserialize, Serialize};

use crate::checkout::dir_name;
use crate::error::ExternalError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sent to the search indexer once a repository's graph snapshot is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexNotification {
    pub repo_id: String,
    pub commit_sha: String,
    pub branch: String,
    pub local_path: PathBuf,
    pub files: usize,
    pub symbols: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub repo_id: String,
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub score: f64,
}

pub trait SearchIndexer: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }

    fn notify(&self, notification: &IndexNotification) -> BoxFuture<'_, Result<(), ExternalError>>;

    fn search(
        &self,
        query: &str,
        repo_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, ExternalError>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub files: usize,
    pub bytes: u64,
}

pub trait MirrorStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }

    fn upload(
        &self,
        repo_id: &str,
        local_path: &Path,
    ) -> BoxFuture<'_, Result<MirrorReport, ExternalError>>;

    fn remove(&self, repo_id: &str) -> BoxFuture<'_, Result<(), ExternalError>>;
}

/// Search service reached over HTTP: `POST {url}/index/notify` and `GET {url}/search`.
pub struct HttpSearchIndexer {
    client: reqwest::Client,
    base_url: String,
    token: Option<Secret>,
}

impl std::fmt::Debug for HttpSearchIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchIndexer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

impl HttpSearchIndexer {
    #[must_use]
    pub fn new(base_url: &str, token: Option<Secret>) -> Self {
        Self {
            client: repograph_vcs::http::default_client(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.expose()),
            None => req,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ExternalError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ExternalError::Status {
            service: "search",
            status: status.as_u16(),
            message,
        })
    }
}

impl SearchIndexer for HttpSearchIndexer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn notify(&self, notification: &IndexNotification) -> BoxFuture<'_, Result<(), ExternalError>> {
        let body = notification.clone();
        Box::pin(async move {
            let url = format!("{}/index/notify", self.base_url);
            let resp = self
                .authorized(self.client.post(&url))
                .json(&body)
                .send()
                .await?;
            Self::check(resp).await?;
            tracing::debug!(repo_id = %body.repo_id, "search indexer notified");
            Ok(())
        })
    }

    fn search(
        &self,
        query: &str,
        repo_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, ExternalError>> {
        let mut params = vec![("q", query.to_owned())];
        if let Some(id) = repo_id {
            params.push(("repoId", id.to_owned()));
        }
        Box::pin(async move {
            let url = format!("{}/search", self.base_url);
            let resp = self
                .authorized(self.client.get(&url))
                .query(&params)
                .send()
                .await?;
            let body: SearchResponse = Self::check(resp).await?.json().await?;
            Ok(body.hits)
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearchIndexer;

impl SearchIndexer for NoopSearchIndexer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn enabled(&self) -> bool {
        false
    }

    fn notify(&self, _notification: &IndexNotification) -> BoxFuture<'_, Result<(), ExternalError>> {
        Box::pin(async { Ok(()) })
    }

    fn search(
        &self,
        _query: &str,
        _repo_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, ExternalError>> {
        Box::pin(async { Err(ExternalError::Disabled("search")) })
    }
}

/// Mirrors each checkout into `{target}/{repo_id}`, without git metadata. The previous copy is
/// replaced wholesale.
#[derive(Debug, Clone)]
pub struct DirectoryMirror {
    target: PathBuf,
}

impl DirectoryMirror {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    fn dest(&self, repo_id: &str) -> PathBuf {
        self.target.join(dir_name(repo_id))
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<MirrorReport, ExternalError> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;

    let walker = ignore::WalkBuilder::new(src)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|e| e.file_name() != ".git")
        .build();

    let mut report = MirrorReport::default();
    for entry in walker {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let to = dest.join(rel);
        match entry.file_type() {
            Some(ft) if ft.is_dir() => std::fs::create_dir_all(&to)?,
            Some(ft) if ft.is_file() => {
                report.bytes += std::fs::copy(entry.path(), &to)?;
                report.files += 1;
            }
            _ => {}
        }
    }
    Ok(report)
}

impl MirrorStore for DirectoryMirror {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn upload(
        &self,
        repo_id: &str,
        local_path: &Path,
    ) -> BoxFuture<'_, Result<MirrorReport, ExternalError>> {
        let src = local_path.to_path_buf();
        let dest = self.dest(repo_id);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || copy_tree(&src, &dest))
                .await
                .map_err(|e| ExternalError::Io(std::io::Error::other(e)))?
        })
    }

    fn remove(&self, repo_id: &str) -> BoxFuture<'_, Result<(), ExternalError>> {
        let dest = self.dest(repo_id);
        Box::pin(async move {
            match tokio::fs::remove_dir_all(&dest).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMirror;

impl MirrorStore for NoopMirror {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn enabled(&self) -> bool {
        false
    }

    fn upload(
        &self,
        _repo_id: &str,
        _local_path: &Path,
    ) -> BoxFuture<'_, Result<MirrorReport, ExternalError>> {
        Box::pin(async { Ok(MirrorReport::default()) })
    }

    fn remove(&self, _repo_id: &str) -> BoxFuture<'_, Result<(), ExternalError>> {
        Box::pin(async { Ok(()) })
    }
}
