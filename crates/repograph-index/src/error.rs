//! Error types for repograph-index.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading the checkout.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkout {0} is not a directory")]
    NotADirectory(PathBuf),

    /// Invalid workspace glob in a manifest.
    #[error("invalid workspace pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

pub type Result<T> = std::result::Result<T, IndexError>;
