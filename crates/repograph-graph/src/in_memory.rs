use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use repograph_index::{CodeNamespace, FileIr, SymbolIr};

use crate::error::{GraphError, Result};
use crate::model::{GraphCounts, RepoMeta, file_node_id, namespace_node_id};
use crate::store::{BoxFuture, GraphStore};

#[derive(Default)]
struct GraphState {
    repositories: HashMap<String, RepoMeta>,
    namespaces: HashMap<String, (String, CodeNamespace)>,
    files: HashMap<String, (String, FileIr)>,
    symbols: HashMap<String, (String, SymbolIr)>,
}

/// Graph store held entirely in process memory. Used when no graph database is configured and
/// as the test double for the snapshot pipeline.
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
    mutations: AtomicU64,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            mutations: AtomicU64::new(0),
        }
    }

    /// Number of mutating calls served so far.
    #[must_use]
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn repository(&self, repo_id: &str) -> Option<RepoMeta> {
        self.state.read().ok()?.repositories.get(repo_id).cloned()
    }

    /// Files of a repository, sorted by path.
    #[must_use]
    pub fn files(&self, repo_id: &str) -> Vec<FileIr> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut files: Vec<_> = state
            .files
            .values()
            .filter(|(owner, _)| owner == repo_id)
            .map(|(_, f)| f.clone())
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Symbols of a repository, sorted by file path then start line.
    #[must_use]
    pub fn symbols(&self, repo_id: &str) -> Vec<SymbolIr> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut symbols: Vec<_> = state
            .symbols
            .values()
            .filter(|(owner, _)| owner == repo_id)
            .map(|(_, s)| s.clone())
            .collect();
        symbols.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.start_line.cmp(&b.start_line))
        });
        symbols
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, GraphState>> {
        self.mutations.fetch_add(1, Ordering::Relaxed);
        self.state
            .write()
            .map_err(|e| GraphError::Lock(e.to_string()))
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphStore")
            .field("mutations", &self.mutations())
            .finish_non_exhaustive()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn ensure_schema(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn delete_repo_subgraph(&self, repo_id: &str) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        Box::pin(async move {
            let mut state = self.write()?;
            state.symbols.retain(|_, (owner, _)| *owner != repo_id);
            state.files.retain(|_, (owner, _)| *owner != repo_id);
            state.namespaces.retain(|_, (owner, _)| *owner != repo_id);
            Ok(())
        })
    }

    fn delete_repo_node(&self, repo_id: &str) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        Box::pin(async move {
            self.write()?.repositories.remove(&repo_id);
            Ok(())
        })
    }

    fn upsert_repository(&self, meta: &RepoMeta) -> BoxFuture<'_, Result<()>> {
        let meta = meta.clone();
        Box::pin(async move {
            self.write()?.repositories.insert(meta.id.clone(), meta);
            Ok(())
        })
    }

    fn upsert_namespaces(
        &self,
        repo_id: &str,
        namespaces: &[CodeNamespace],
    ) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        let namespaces = namespaces.to_vec();
        Box::pin(async move {
            let mut state = self.write()?;
            if !state.repositories.contains_key(&repo_id) {
                return Ok(());
            }
            for ns in namespaces {
                let id = namespace_node_id(&repo_id, &ns.name);
                state.namespaces.insert(id, (repo_id.clone(), ns));
            }
            Ok(())
        })
    }

    fn upsert_files(&self, repo_id: &str, files: &[FileIr]) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        let files = files.to_vec();
        Box::pin(async move {
            let mut state = self.write()?;
            for file in files {
                if !state
                    .namespaces
                    .contains_key(&namespace_node_id(&repo_id, &file.namespace))
                {
                    tracing::debug!(path = %file.path, "dropping file without namespace node");
                    continue;
                }
                let id = file_node_id(&repo_id, &file.path);
                state.files.insert(id, (repo_id.clone(), file));
            }
            Ok(())
        })
    }

    fn upsert_symbols(&self, repo_id: &str, symbols: &[SymbolIr]) -> BoxFuture<'_, Result<()>> {
        let repo_id = repo_id.to_owned();
        let symbols = symbols.to_vec();
        Box::pin(async move {
            let mut state = self.write()?;
            for symbol in symbols {
                if !state
                    .files
                    .contains_key(&file_node_id(&repo_id, &symbol.file_path))
                {
                    continue;
                }
                state
                    .symbols
                    .insert(symbol.stable_id.clone(), (repo_id.clone(), symbol));
            }
            Ok(())
        })
    }

    fn counts(&self, repo_id: &str) -> BoxFuture<'_, Result<GraphCounts>> {
        let repo_id = repo_id.to_owned();
        Box::pin(async move {
            let state = self
                .state
                .read()
                .map_err(|e| GraphError::Lock(e.to_string()))?;
            let count = |owner: &String| u64::from(*owner == repo_id);
            Ok(GraphCounts {
                namespaces: state.namespaces.values().map(|(o, _)| count(o)).sum(),
                files: state.files.values().map(|(o, _)| count(o)).sum(),
                symbols: state.symbols.values().map(|(o, _)| count(o)).sum(),
            })
        })
    }
}
