//! The base sync accumulator and the four per-surface result types that
//! compose it (§4.3.9). Grounded on `SyncResult` and its subclasses in
//! `examples/original_source/fastblocks/actions/sync/{strategies,static,
//! cache,settings,templates}.py`; Rust composition (a `base: SyncResult`
//! field plus `Deref`/`DerefMut`) stands in for the original's
//! subclassing.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

/// One accumulated per-task failure. Sync never raises a per-file error
/// past a surface's entry point (§7); every failure becomes one of these
/// inside a [`SyncResult`].
#[derive(Debug, Clone)]
pub struct SyncTaskError {
    pub path: String,
    pub message: String,
}

impl SyncTaskError {
    pub fn new(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self { path: path.into(), message: message.to_string() }
    }
}

impl fmt::Display for SyncTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SyncTaskError {}

/// A recorded bidirectional conflict, either awaiting manual resolution
/// or recorded informationally after an automatic one, per
/// `_handle_*_conflict`'s `conflicts.append({...})` calls.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub path: String,
    pub local_mtime: Option<f64>,
    pub remote_mtime: Option<f64>,
    pub reason: String,
}

/// The base accumulator every sync surface composes into its own result
/// type: synced/skipped/backed-up paths, conflicts, and accumulated
/// per-task errors.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub synced_items: Vec<String>,
    pub conflicts: Vec<ConflictRecord>,
    pub errors: Vec<SyncTaskError>,
    pub skipped: Vec<String>,
    pub backed_up: Vec<String>,
}

impl SyncResult {
    pub fn total_processed(&self) -> usize {
        self.synced_items.len() + self.conflicts.len() + self.errors.len() + self.skipped.len()
    }

    pub fn success_count(&self) -> usize {
        self.synced_items.len()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_success(&self) -> bool {
        !self.has_errors() && !self.has_conflicts()
    }

    /// Fraction of processed items that synced cleanly, matching
    /// `get_sync_summary`'s `success_rate` (`0` processed counts as `1` to
    /// avoid a division by zero, as the original does with `max(..., 1)`).
    pub fn success_rate(&self) -> f64 {
        self.success_count() as f64 / self.total_processed().max(1) as f64
    }
}

/// Adds the fields `static.py`'s `StaticSyncResult` carries beyond the
/// base: which assets were processed, their detected MIME types, and the
/// cacheable/non-cacheable partition used to decide whether an asset also
/// went into the response cache.
#[derive(Debug, Clone, Default)]
pub struct StaticSyncResult {
    pub base: SyncResult,
    pub assets_processed: Vec<String>,
    pub mime_types_detected: HashMap<String, String>,
    pub cache_invalidated: Vec<String>,
    pub cache_cleared: Vec<String>,
    pub cacheable_assets: Vec<String>,
    pub non_cacheable_assets: Vec<String>,
}

impl Deref for StaticSyncResult {
    type Target = SyncResult;
    fn deref(&self) -> &SyncResult {
        &self.base
    }
}

impl DerefMut for StaticSyncResult {
    fn deref_mut(&mut self) -> &mut SyncResult {
        &mut self.base
    }
}

/// Adds the fields `cache.py`'s `CacheSyncResult` carries beyond the base:
/// the keys invalidated/warmed and namespaces cleared by a cache-only sync
/// operation.
#[derive(Debug, Clone, Default)]
pub struct CacheSyncResult {
    pub base: SyncResult,
    pub invalidated_keys: Vec<String>,
    pub warmed_keys: Vec<String>,
    pub cleared_namespaces: Vec<String>,
}

impl Deref for CacheSyncResult {
    type Target = SyncResult;
    fn deref(&self) -> &SyncResult {
        &self.base
    }
}

impl DerefMut for CacheSyncResult {
    fn deref_mut(&mut self) -> &mut SyncResult {
        &mut self.base
    }
}

/// Adds the fields `settings.py`'s `SettingsSyncResult` carries beyond the
/// base: which adapters had their configuration reloaded, and YAML
/// validation failures (path, parse error message) that aborted a file's
/// resolution.
#[derive(Debug, Clone, Default)]
pub struct SettingsSyncResult {
    pub base: SyncResult,
    pub adapters_reloaded: Vec<String>,
    pub validation_failures: Vec<(PathBuf, String)>,
}

impl Deref for SettingsSyncResult {
    type Target = SyncResult;
    fn deref(&self) -> &SyncResult {
        &self.base
    }
}

impl DerefMut for SettingsSyncResult {
    fn deref_mut(&mut self) -> &mut SyncResult {
        &mut self.base
    }
}

/// Adds the fields `templates.py`'s `TemplateSyncResult` carries beyond
/// the base: which templates synced and which bytecode-cache keys were
/// invalidated alongside the template-cache ones.
#[derive(Debug, Clone, Default)]
pub struct TemplateSyncResult {
    pub base: SyncResult,
    pub templates_synced: Vec<String>,
    pub bytecode_invalidated: Vec<String>,
}

impl Deref for TemplateSyncResult {
    type Target = SyncResult;
    fn deref(&self) -> &SyncResult {
        &self.base
    }
}

impl DerefMut for TemplateSyncResult {
    fn deref_mut(&mut self) -> &mut SyncResult {
        &mut self.base
    }
}
