use std::path::PathBuf;

use repograph_vcs::VcsError;

use crate::pipeline::Stage;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("repository already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt column {column} for {id}: {message}")]
    Corrupt {
        id: String,
        column: &'static str,
        message: String,
    },
}

/// Checkout failures. Every variant carries the repository id, the checkout path relative to
/// the checkout root, the absolute path and a remediation hint.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("could not clean checkout {relative} of {repo_id} at {}: {source}; {hint}", .absolute.display())]
    Cleanup {
        repo_id: String,
        relative: String,
        absolute: PathBuf,
        hint: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("clone of {repo_id} into {relative} at {} failed: {source}; {hint}", .absolute.display())]
    Clone {
        repo_id: String,
        relative: String,
        absolute: PathBuf,
        hint: &'static str,
        #[source]
        source: VcsError,
    },

    #[error("update of checkout {relative} of {repo_id} at {} failed: {source}; {hint}", .absolute.display())]
    Update {
        repo_id: String,
        relative: String,
        absolute: PathBuf,
        hint: &'static str,
        #[source]
        source: VcsError,
    },

    #[error("filesystem error on {relative} of {repo_id} at {}: {source}; {hint}", .absolute.display())]
    Io {
        repo_id: String,
        relative: String,
        absolute: PathBuf,
        hint: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CheckoutError {
    /// Clone and update failures leave nothing behind that a plain retry cannot handle;
    /// cleanup and filesystem failures need an operator.
    #[must_use]
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::Clone { .. } | Self::Update { .. })
    }

    #[must_use]
    pub fn repo_id(&self) -> &str {
        match self {
            Self::Cleanup { repo_id, .. }
            | Self::Clone { repo_id, .. }
            | Self::Update { repo_id, .. }
            | Self::Io { repo_id, .. } => repo_id,
        }
    }
}

/// Failures of best-effort collaborators (search indexer, mirror).
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("{0} is not configured")]
    Disabled(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] repograph_index::IndexError),

    #[error("graph write failed: {0}")]
    Graph(#[from] repograph_graph::GraphError),

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },
}

impl PipelineError {
    /// The metadata store has no record for the id; nothing was attempted.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Store(StoreError::NotFound(_)))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
