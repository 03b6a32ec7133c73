use std::path::PathBuf;

use repograph_vcs::{Secret, VcsConfig};
use serde::{Deserialize, Serialize};

use crate::pipeline::Stage;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub checkout: CheckoutConfig,
    pub vcs: VcsConfig,
    pub graph: GraphConfig,
    pub search: SearchConfig,
    pub mirror: MirrorConfig,
    pub pipeline: PipelineConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database holding repository metadata; `:memory:` for a throwaway store.
    pub sqlite_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "./data/repograph.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub root_dir: PathBuf,
    /// Shallow clone depth; 0 clones full history.
    pub clone_depth: u32,
    pub git_timeout_secs: u64,
    pub cleanup_retries: u32,
    pub cleanup_backoff_ms: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data/checkouts"),
            clone_depth: 50,
            git_timeout_secs: 300,
            cleanup_retries: 3,
            cleanup_backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Memory,
    Neo4j,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub batch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            url: "http://localhost:7474".into(),
            database: "neo4j".into(),
            username: None,
            password: None,
            batch_size: repograph_graph::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub token: Option<Secret>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub target_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub progress_retention_secs: u64,
    /// Stages whose failure aborts a run; every other stage is best-effort.
    pub fatal_stages: Vec<Stage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            progress_retention_secs: 30,
            fatal_stages: Stage::DEFAULT_FATAL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Interval assigned to newly added repositories.
    pub default_repo_interval_minutes: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            default_repo_interval_minutes: 15,
        }
    }
}
