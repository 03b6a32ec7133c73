use repograph_core::StoreError;
use repograph_vcs::VcsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),
    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),
}
