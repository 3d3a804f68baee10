//! The remote side of a sync: the [`ObjectStore`] collaborator trait
//! (§6.3) plus a small in-memory implementation, mirroring
//! `webcore_cache::store`'s [`CacheStore`](webcore_cache::store::CacheStore)/`MemoryStore`
//! pair. Grounded on the original's `storage.{templates,settings,static}`
//! bucket access pattern in
//! `examples/original_source/fastblocks/actions/sync/{static,settings,
//! templates}.py`.

use std::sync::Arc;

use dashmap::DashMap;
use webcore_cache::store::{StoreError, StoreResult};

use crate::file_info::unix_now;

/// Metadata about a stored object.
#[derive(Debug, Clone, Default)]
pub struct ObjectStat {
    pub size: u64,
    pub mtime: f64,
    pub content_type: Option<String>,
}

/// The collaborator a sync surface reads from and writes to on the
/// "remote" side of a sync. Buckets (`templates`, `settings`, `static`)
/// are a configuration concern of whatever constructs an `ObjectStore`
/// per bucket — this trait itself is bucket-agnostic, matching the
/// original's `getattr(storage, bucket)` indirection collapsed into "one
/// store instance per bucket" at the Rust level.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, path: &str) -> StoreResult<bool>;
    async fn read(&self, path: &str) -> StoreResult<Vec<u8>>;
    async fn write(&self, path: &str, bytes: Vec<u8>, content_type: Option<&str>) -> StoreResult<()>;
    async fn stat(&self, path: &str) -> StoreResult<ObjectStat>;
}

#[derive(Debug)]
struct StoredObject {
    bytes: Vec<u8>,
    mtime: f64,
    content_type: Option<String>,
}

/// A process-local [`ObjectStore`], used by this crate's own tests and by
/// callers without a real object-store adapter wired up yet.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.objects.contains_key(path))
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .get(path)
            .map(|entry| entry.bytes.clone())
            .ok_or_else(|| StoreError::Backend(format!("no such object: {path}")))
    }

    async fn write(&self, path: &str, bytes: Vec<u8>, content_type: Option<&str>) -> StoreResult<()> {
        self.objects.insert(
            path.to_string(),
            StoredObject { bytes, mtime: unix_now(), content_type: content_type.map(str::to_string) },
        );
        Ok(())
    }

    async fn stat(&self, path: &str) -> StoreResult<ObjectStat> {
        self.objects
            .get(path)
            .map(|entry| ObjectStat {
                size: entry.bytes.len() as u64,
                mtime: entry.mtime,
                content_type: entry.content_type.clone(),
            })
            .ok_or_else(|| StoreError::Backend(format!("no such object: {path}")))
    }
}
