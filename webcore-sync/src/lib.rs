//! Bidirectional sync between a local filesystem and an object-store
//! backed remote, with conflict resolution and cache coherence for the
//! static-asset, template, settings, and cache-maintenance surfaces.
//!
//! Grounded on `examples/original_source/fastblocks/actions/sync/`: the
//! shared execution model in `strategies.py`, and one module here per
//! `{static,templates,settings,cache}.py`.

pub mod cache_sync;
pub mod conflict;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod file_info;
pub mod object_store;
pub mod result;
pub mod settings_sync;
pub mod static_sync;
pub mod strategy;
pub mod template_sync;

pub use cache_sync::{sync_cache, CacheOperation};
pub use conflict::{create_backup, resolve_conflict};
pub use discovery::{discover_files, DiscoveredFile};
pub use engine::{run_tasks, BoxFuture, EngineRun, SyncTaskFn, TaskResult};
pub use error::{Result, SyncError};
pub use file_info::{compare_content, local_file_info, remote_file_info, should_sync, FileInfo};
pub use object_store::{MemoryObjectStore, ObjectStat, ObjectStore};
pub use result::{
    CacheSyncResult, ConflictRecord, SettingsSyncResult, StaticSyncResult, SyncResult, SyncTaskError,
    TemplateSyncResult,
};
pub use settings_sync::{sync_settings, ConfigReloader};
pub use static_sync::sync_static;
pub use strategy::{ConflictStrategy, SyncDirection, SyncStrategy};
pub use template_sync::sync_templates;
