//! Application bootstrap: builds the metadata store, graph backend, provider factory and
//! orchestrator from a validated [`Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use repograph_graph::{
    GraphStore, InMemoryGraphStore, Neo4jConfig, Neo4jGraphStore, SnapshotWriter,
};
use repograph_vcs::ProviderFactory;
use repograph_vcs::git::GitCli;

use crate::checkout::CheckoutManager;
use crate::config::{Config, GraphBackend};
use crate::external::{DirectoryMirror, HttpSearchIndexer, MirrorStore, SearchIndexer};
use crate::orchestrator::Orchestrator;
use crate::repository::{RepositoryStore, SqliteRepositoryStore};

pub struct App {
    pub config: Config,
    pub repos: Arc<dyn RepositoryStore>,
    pub providers: ProviderFactory,
    pub orchestrator: Arc<Orchestrator>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Validate `config` and construct every collaborator it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent, the metadata store cannot be
    /// opened, or the graph backend rejects the schema bootstrap.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let repos: Arc<dyn RepositoryStore> = Arc::new(
            SqliteRepositoryStore::open(&config.storage.sqlite_path)
                .await
                .with_context(|| {
                    format!("failed to open metadata store {}", config.storage.sqlite_path)
                })?,
        );

        let git = GitCli::new(Duration::from_secs(config.checkout.git_timeout_secs));
        let providers = ProviderFactory::new(config.vcs.clone(), git);

        let graph_store = create_graph_store(&config)?;
        let graph = SnapshotWriter::new(graph_store).with_batch_size(config.graph.batch_size);
        graph
            .ensure_schema()
            .await
            .context("graph schema bootstrap failed")?;

        let mut orchestrator = Orchestrator::new(
            Arc::clone(&repos),
            providers.clone(),
            CheckoutManager::from_config(&config.checkout),
            graph,
        )
        .with_fatal_stages(&config.pipeline.fatal_stages)
        .with_progress_retention(Duration::from_secs(config.pipeline.progress_retention_secs));

        if let Some(search) = create_search_indexer(&config) {
            orchestrator = orchestrator.with_search(search);
        }
        if let Some(mirror) = create_mirror(&config) {
            orchestrator = orchestrator.with_mirror(mirror);
        }

        tracing::info!(
            backend = ?config.graph.backend,
            checkout_root = %config.checkout.root_dir.display(),
            search = config.search.enabled,
            mirror = config.mirror.enabled,
            "repograph initialized"
        );

        Ok(Self {
            config,
            repos,
            providers,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// # Errors
///
/// Returns an error if the Neo4j HTTP client cannot be built.
pub fn create_graph_store(config: &Config) -> anyhow::Result<Arc<dyn GraphStore>> {
    match config.graph.backend {
        GraphBackend::Memory => {
            tracing::warn!("using in-memory graph store; the graph is lost on exit");
            Ok(Arc::new(InMemoryGraphStore::default()))
        }
        GraphBackend::Neo4j => {
            let neo = Neo4jConfig {
                url: config.graph.url.clone(),
                database: config.graph.database.clone(),
                username: config.graph.username.clone(),
                password: config.graph.password.as_ref().map(|p| p.expose().to_owned()),
            };
            let store = Neo4jGraphStore::new(&neo).context("failed to create Neo4j client")?;
            Ok(Arc::new(store))
        }
    }
}

#[must_use]
pub fn create_search_indexer(config: &Config) -> Option<Arc<dyn SearchIndexer>> {
    if !config.search.enabled {
        return None;
    }
    let url = config.search.url.as_deref()?;
    Some(Arc::new(HttpSearchIndexer::new(url, config.search.token.clone())))
}

#[must_use]
pub fn create_mirror(config: &Config) -> Option<Arc<dyn MirrorStore>> {
    if !config.mirror.enabled {
        return None;
    }
    let dir = config.mirror.target_dir.clone()?;
    Some(Arc::new(DirectoryMirror::new(dir)))
}
