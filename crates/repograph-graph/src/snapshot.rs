//! Full-replace snapshot writes: each run deletes a repository's subgraph and rebuilds it from
//! the current extraction output.

use std::sync::Arc;
use std::time::Instant;

use repograph_index::{CodeNamespace, FileIr, SymbolIr};

use crate::error::Result;
use crate::model::RepoMeta;
use crate::store::GraphStore;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub namespaces: usize,
    pub files: usize,
    pub symbols: usize,
    pub batches: usize,
}

#[derive(Clone)]
pub struct SnapshotWriter {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl SnapshotWriter {
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Rows per upsert request. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// # Errors
    ///
    /// Returns an error if the backing store rejects the schema statements.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.store.ensure_schema().await
    }

    /// Replace the repository's subgraph with the given extraction output.
    ///
    /// An empty namespace list is written as the synthetic root namespace so every file keeps a
    /// parent.
    ///
    /// # Errors
    ///
    /// Returns the first store error; the subgraph may then be partially written and is fully
    /// replaced again by the next successful run.
    pub async fn write_snapshot(
        &self,
        meta: &RepoMeta,
        namespaces: &[CodeNamespace],
        files: &[FileIr],
        symbols: &[SymbolIr],
    ) -> Result<SnapshotReport> {
        let started = Instant::now();
        let repo_id = meta.id.as_str();
        let root = [CodeNamespace::root()];
        let namespaces = if namespaces.is_empty() {
            &root[..]
        } else {
            namespaces
        };

        self.store.delete_repo_subgraph(repo_id).await?;
        self.store.upsert_repository(meta).await?;
        self.store.upsert_namespaces(repo_id, namespaces).await?;

        let mut batches = 0;
        for chunk in files.chunks(self.batch_size) {
            self.store.upsert_files(repo_id, chunk).await?;
            batches += 1;
            tracing::debug!(repo_id, batch = batches, rows = chunk.len(), "file batch written");
        }
        for chunk in symbols.chunks(self.batch_size) {
            self.store.upsert_symbols(repo_id, chunk).await?;
            batches += 1;
            tracing::debug!(repo_id, batch = batches, rows = chunk.len(), "symbol batch written");
        }

        let report = SnapshotReport {
            namespaces: namespaces.len(),
            files: files.len(),
            symbols: symbols.len(),
            batches,
        };
        tracing::info!(
            repo_id,
            namespaces = report.namespaces,
            files = report.files,
            symbols = report.symbols,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "graph snapshot written"
        );
        Ok(report)
    }

    /// Remove the repository's subgraph and the repository node itself.
    ///
    /// # Errors
    ///
    /// Returns an error if either delete fails.
    pub async fn delete_repo(&self, repo_id: &str) -> Result<()> {
        self.store.delete_repo_subgraph(repo_id).await?;
        self.store.delete_repo_node(repo_id).await?;
        tracing::info!(repo_id, "graph subgraph deleted");
        Ok(())
    }
}
