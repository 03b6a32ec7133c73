#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{provider} API returned {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} rate limited")]
    RateLimited { provider: &'static str },

    #[error("git {command} failed (exit {code:?}): {output}")]
    Git {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl VcsError {
    /// True for failures that say nothing about the repository itself (network, rate limits,
    /// timeouts) and can simply be retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = VcsError::Api {
            provider: "github",
            status: 502,
            message: "bad gateway".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = VcsError::Api {
            provider: "gitlab",
            status: 404,
            message: "missing".into(),
        };
        assert!(!err.is_transient());
        assert!(!VcsError::InvalidUrl("x".into()).is_transient());
    }

    #[test]
    fn git_error_display_includes_command() {
        let err = VcsError::Git {
            command: "fetch".into(),
            code: Some(128),
            output: "fatal: repository not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git fetch"));
        assert!(msg.contains("128"));
    }
}
