#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("graph database returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("query failed ({code}): {message}")]
    Query { code: String, message: String },

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("graph store lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
