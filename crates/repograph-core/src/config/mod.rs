mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

use crate::pipeline::Stage;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first inconsistent setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.sqlite_path.trim().is_empty() {
            bail!("storage.sqlite_path must not be empty");
        }
        if self.checkout.root_dir.as_os_str().is_empty() {
            bail!("checkout.root_dir must not be empty");
        }
        if self.checkout.git_timeout_secs == 0 {
            bail!("checkout.git_timeout_secs must be greater than zero");
        }
        if self.graph.batch_size == 0 {
            bail!("graph.batch_size must be greater than zero");
        }
        if self.graph.backend == GraphBackend::Neo4j && self.graph.url.trim().is_empty() {
            bail!("graph.url is required for the neo4j backend");
        }
        if self.search.enabled && self.search.url.as_deref().is_none_or(str::is_empty) {
            bail!("search.url is required when search is enabled");
        }
        if self.mirror.enabled && self.mirror.target_dir.is_none() {
            bail!("mirror.target_dir is required when mirroring is enabled");
        }
        if self.sync.enabled && self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be greater than zero");
        }
        // nothing downstream can run without a checkout
        if !self.pipeline.fatal_stages.contains(&Stage::Checkout) {
            bail!("pipeline.fatal_stages must include checkout");
        }
        Ok(())
    }
}

/// Config path from `--config <path>`, else `REPOGRAPH_CONFIG`, else `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("REPOGRAPH_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
