use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit_sha: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    pub is_private: bool,
    pub clone_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    /// RFC 3339 timestamp as reported by the host.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_sha: Option<String>,
}

/// Options for [`crate::VcsProvider::clone_or_pull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    /// Shallow clone depth; `None` clones full history.
    pub depth: Option<u32>,
    pub single_branch: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            depth: Some(50),
            single_branch: true,
        }
    }
}

/// Default-branch candidates tried in order when the host does not report one.
pub const DEFAULT_BRANCH_CANDIDATES: [&str; 4] = ["main", "master", "develop", "trunk"];

/// Pick the default branch from a branch listing: explicit flag first, then well-known
/// names, then the first branch returned.
#[must_use]
pub fn pick_default_branch(branches: &[Branch]) -> Option<&str> {
    if let Some(b) = branches.iter().find(|b| b.is_default) {
        return Some(&b.name);
    }
    for candidate in DEFAULT_BRANCH_CANDIDATES {
        if let Some(b) = branches.iter().find(|b| b.name == candidate) {
            return Some(&b.name);
        }
    }
    branches.first().map(|b| b.name.as_str())
}
