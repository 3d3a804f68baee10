//! Sync tunables, grounded on `SyncStrategy` in
//! `examples/original_source/fastblocks/actions/sync/strategies.py`.

use std::time::Duration;

/// Which direction file content should flow during a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Remote to local only.
    Pull,
    /// Local to remote only.
    Push,
    /// Either direction, whichever side is missing or newer; same-file
    /// changes on both sides become a conflict.
    Bidirectional,
}

/// How a same-file conflict (both sides hold different content) is
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Always take the remote side's content.
    RemoteWins,
    /// Always take the local side's content.
    LocalWins,
    /// Take whichever side has the later mtime; falls back to remote if
    /// either mtime is unavailable.
    NewestWins,
    /// Record the conflict and do not resolve it automatically.
    Manual,
    /// Take the remote side's content, but back up the local file first
    /// regardless of `backup_on_conflict`.
    BackupBoth,
}

/// Tunables for one sync run. Defaults match the original's keyword-only
/// constructor defaults.
#[derive(Debug, Clone)]
pub struct SyncStrategy {
    pub direction: SyncDirection,
    pub conflict_strategy: ConflictStrategy,
    pub dry_run: bool,
    pub backup_on_conflict: bool,
    pub parallel: bool,
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for SyncStrategy {
    fn default() -> Self {
        Self {
            direction: SyncDirection::Bidirectional,
            conflict_strategy: ConflictStrategy::NewestWins,
            dry_run: false,
            backup_on_conflict: true,
            parallel: true,
            max_concurrent: 5,
            timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}
