//! Node payloads and id conventions shared by all graph backends.

use chrono::{DateTime, Utc};

/// Repository node metadata written at the top of every snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMeta {
    pub id: String,
    pub name: String,
    pub url: String,
    pub branch: String,
    pub commit_sha: String,
    pub indexed_at: DateTime<Utc>,
}

/// Number of nodes currently stored under one repository node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphCounts {
    pub namespaces: u64,
    pub files: u64,
    pub symbols: u64,
}

/// `repoId:name`
#[must_use]
pub fn namespace_node_id(repo_id: &str, name: &str) -> String {
    format!("{repo_id}:{name}")
}

/// `repoId:path`
#[must_use]
pub fn file_node_id(repo_id: &str, path: &str) -> String {
    format!("{repo_id}:{path}")
}
