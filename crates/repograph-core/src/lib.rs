//! Indexing pipeline orchestration for repograph.
//!
//! Owns configuration, the repository metadata store, local checkouts and the
//! [`Orchestrator`] that drives checkout, module detection, symbol extraction, graph snapshot
//! and search notification for one repository at a time.

pub mod bootstrap;
pub mod checkout;
pub mod config;
pub mod error;
pub mod external;
pub mod locks;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

pub use bootstrap::App;
pub use checkout::{Checkout, CheckoutManager, CheckoutSettings, CleanupOutcome, FsOps, RealFs};
pub use config::{Config, resolve_config_path};
pub use error::{CheckoutError, ExternalError, PipelineError, Result, StoreError};
pub use orchestrator::{Orchestrator, RepoStatus, RunOptions, RunReport};
pub use pipeline::{Stage, StageOutcome};
pub use progress::{Progress, ProgressTracker};
pub use repository::{Repository, RepositoryStore, ScanStatus, SqliteRepositoryStore};
