//! Background drift detection.
//!
//! [`SyncScheduler`] polls every sync-enabled repository for its latest remote commit and, when
//! it moved, records the new hash and flips the repository back to `PENDING`. It never runs the
//! indexing pipeline itself; changed ids can be forwarded to whoever does.

mod error;
mod scheduler;

pub use error::SchedulerError;
pub use scheduler::{CycleOutcome, SyncResult, SyncScheduler, is_due};
