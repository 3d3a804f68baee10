use std::time::Duration;

use thiserror::Error;

/// A `Result` typedef to use with [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that terminate a sync run rather than being recorded inside a
/// [`crate::result::SyncResult`] (§7: "sync errors always accumulate,
/// never thrown past `SyncEngine::run`'s entry point" — these two
/// variants are the deliberate exceptions to that rule: a timeout ends
/// the run, and a store collaborator being entirely unavailable means
/// there's nothing to accumulate results for in the first place).
#[derive(Error, Debug)]
pub enum SyncError {
    /// The run-wide timeout elapsed before every task completed.
    #[error("sync run exceeded its {0:?} timeout")]
    Timeout(Duration),
    /// The object-store or cache-store collaborator itself failed before
    /// any per-file work could start.
    #[error("store error: {0}")]
    Store(#[from] webcore_cache::store::StoreError),
}
