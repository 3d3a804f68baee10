//! The [`CacheStore`] collaborator trait and a small in-memory
//! implementation used by tests and by callers without an external KV
//! service wired up yet.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

/// Errors surfaced by a [`CacheStore`] implementation.
///
/// These are never fatal to the caller: every operation that touches the
/// store degrades to a miss (on read) or a logged no-op (on write) when it
/// fails.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying backend is unavailable (connection refused, pool
    /// exhausted, etc).
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    /// The backend rejected the operation for a reason specific to it.
    #[error("cache store error: {0}")]
    Backend(String),
}

/// A `Result` typedef to use with [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Point-in-time statistics about a store, exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreInfo {
    /// Number of live entries currently held.
    pub entry_count: usize,
}

/// An arbitrary namespaced key/value store with optional per-entry TTL.
///
/// This plays the role a response-cache manager plays in an HTTP cache
/// library, generalized to arbitrary bytes so the same collaborator backs
/// both response caching and the sync engine's cache-namespace operations
/// (`templates`, `bccache`, `responses`).
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Fetch the raw bytes stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// Store `value` under `key`. `ttl` of `None` means "no expiry".
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> StoreResult<()>;
    /// Remove a single key. Absence of the key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
    /// Remove every key matching a glob-style pattern, returning the keys
    /// removed.
    async fn delete_pattern(&self, glob: &str) -> StoreResult<Vec<String>>;
    /// Remove every key under a namespace prefix (`"{namespace}:"`).
    async fn clear(&self, namespace: &str) -> StoreResult<()>;
    /// Whether `key` is present and unexpired.
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    /// All keys matching a glob-style pattern.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;
    /// Aggregate diagnostics.
    async fn info(&self) -> StoreResult<StoreInfo>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

/// A process-local [`CacheStore`] backed by [`DashMap`](dashmap::DashMap).
///
/// Expiry is checked lazily on read, the same approach the teacher's
/// `MokaManager` relies on moka's own background reaper for; here there is
/// no reaper, so a stale entry is dropped the first time something looks
/// at it after its TTL elapses.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self { entries: Arc::new(DashMap::new()) }
    }
}

fn glob_to_matcher(glob: &str) -> impl Fn(&str) -> bool + '_ {
    move |key: &str| glob_match(glob, key)
}

/// Minimal `*`-only glob matching, sufficient for the namespace/prefix
/// patterns this store is asked to delete by (`"app:cached:*"`,
/// `"varying_headers.*"`).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                drop(self.entries.remove(key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, glob: &str) -> StoreResult<Vec<String>> {
        let matcher = glob_to_matcher(glob);
        let matched: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| matcher(k))
            .collect();
        for key in &matched {
            self.entries.remove(key);
        }
        Ok(matched)
    }

    async fn clear(&self, namespace: &str) -> StoreResult<()> {
        let prefix = format!("{namespace}:");
        let matched: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for key in &matched {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let matcher = glob_to_matcher(pattern);
        Ok(self
            .entries
            .iter()
            .filter(|e| e.is_live())
            .map(|e| e.key().clone())
            .filter(|k| matcher(k))
            .collect())
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        Ok(StoreInfo { entry_count: self.entries.len() })
    }
}
