//! Knowledge graph persistence.
//!
//! [`SnapshotWriter`] replaces a repository's subgraph (namespaces, files, symbols) on every
//! indexing run through the [`GraphStore`] seam, backed either by Neo4j ([`Neo4jGraphStore`]) or
//! by process memory ([`InMemoryGraphStore`]).

pub mod error;
pub mod in_memory;
pub mod model;
pub mod neo4j;
pub mod snapshot;
pub mod store;

pub use error::{GraphError, Result};
pub use in_memory::InMemoryGraphStore;
pub use model::{GraphCounts, RepoMeta, file_node_id, namespace_node_id};
pub use neo4j::{Neo4jConfig, Neo4jGraphStore};
pub use snapshot::{DEFAULT_BATCH_SIZE, SnapshotReport, SnapshotWriter};
pub use store::GraphStore;
