//! Stage vocabulary shared by the orchestrator and configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::repository::ScanStatus;

/// A step of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Checkout,
    Mirror,
    Namespaces,
    Parse,
    Graph,
    SearchNotify,
}

impl Stage {
    pub const DEFAULT_FATAL: [Self; 4] =
        [Self::Checkout, Self::Namespaces, Self::Parse, Self::Graph];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Mirror => "mirror",
            Self::Namespaces => "namespaces",
            Self::Parse => "parse",
            Self::Graph => "graph",
            Self::SearchNotify => "search_notify",
        }
    }

    /// Status the repository is in while this stage runs.
    #[must_use]
    pub fn status(self) -> ScanStatus {
        match self {
            Self::Checkout => ScanStatus::Cloning,
            Self::Mirror => ScanStatus::Uploading,
            Self::Namespaces => ScanStatus::ScanningNamespaces,
            Self::Parse => ScanStatus::ParsingFiles,
            Self::Graph => ScanStatus::GeneratingGraph,
            Self::SearchNotify => ScanStatus::Indexing,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one stage: whether it succeeded plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub ok: bool,
    pub detail: String,
}

impl StageOutcome {
    pub fn ok(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            ok: false,
            detail: detail.into(),
        }
    }

    pub fn skipped(stage: Stage, reason: impl Into<String>) -> Self {
        Self::ok(stage, format!("skipped: {}", reason.into()))
    }
}
