use std::future::Future;
use std::pin::Pin;

use repograph_index::{CodeNamespace, FileIr, SymbolIr};

use crate::error::Result;
use crate::model::{GraphCounts, RepoMeta};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Batched upsert/delete operations against the knowledge graph.
///
/// Parent links are resolved by id: namespace rows attach to the repository node, file rows to
/// `repoId:namespace`, symbol rows to `repoId:filePath`. Rows whose parent is missing are dropped.
pub trait GraphStore: Send + Sync {
    /// Create uniqueness constraints for repository, namespace, file and symbol ids.
    fn ensure_schema(&self) -> BoxFuture<'_, Result<()>>;

    /// Remove symbols, files and namespaces of a repository, keeping the repository node.
    fn delete_repo_subgraph(&self, repo_id: &str) -> BoxFuture<'_, Result<()>>;

    fn delete_repo_node(&self, repo_id: &str) -> BoxFuture<'_, Result<()>>;

    fn upsert_repository(&self, meta: &RepoMeta) -> BoxFuture<'_, Result<()>>;

    fn upsert_namespaces(
        &self,
        repo_id: &str,
        namespaces: &[CodeNamespace],
    ) -> BoxFuture<'_, Result<()>>;

    fn upsert_files(&self, repo_id: &str, files: &[FileIr]) -> BoxFuture<'_, Result<()>>;

    fn upsert_symbols(&self, repo_id: &str, symbols: &[SymbolIr]) -> BoxFuture<'_, Result<()>>;

    fn counts(&self, repo_id: &str) -> BoxFuture<'_, Result<GraphCounts>>;
}
