//! Namespace-level cache maintenance, independent of any filesystem
//! sync. Grounded on `sync_cache` in
//! `examples/original_source/fastblocks/actions/sync/cache.py`.

use std::sync::Arc;
use std::time::Duration;

use webcore_cache::store::CacheStore;

use crate::object_store::ObjectStore;
use crate::result::{CacheSyncResult, SyncTaskError};
use crate::strategy::SyncStrategy;

/// Which maintenance pass to run over the selected namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperation {
    /// Invalidate, then warm.
    Refresh,
    /// Delete explicit keys plus every namespace's pattern.
    Invalidate,
    /// Re-populate well-known keys.
    Warm,
    /// Drop entire namespaces.
    Clear,
}

const DEFAULT_NAMESPACES: &[&str] = &["templates", "bccache", "responses"];

const COMMON_TEMPLATES: &[&str] =
    &["base.html", "layout.html", "index.html", "404.html", "500.html", "login.html", "dashboard.html"];

/// Run `operation` over `namespaces` (defaulting to
/// `templates`/`bccache`/`responses`). `templates_store`, when supplied,
/// lets a `warm`/`refresh` pass read template bodies back out of storage
/// to repopulate the cache; without it, template warming is skipped.
pub async fn sync_cache(
    cache: Arc<dyn CacheStore>,
    operation: CacheOperation,
    namespaces: Option<Vec<String>>,
    keys: Option<Vec<String>>,
    templates_store: Option<Arc<dyn ObjectStore>>,
    strategy: &SyncStrategy,
) -> CacheSyncResult {
    let namespaces = namespaces.unwrap_or_else(|| DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect());
    let mut result = CacheSyncResult::default();

    match operation {
        CacheOperation::Refresh => {
            invalidate(&cache, &namespaces, keys, strategy, &mut result).await;
            warm(&cache, &namespaces, templates_store.as_ref(), strategy, &mut result).await;
        }
        CacheOperation::Invalidate => {
            invalidate(&cache, &namespaces, keys, strategy, &mut result).await;
        }
        CacheOperation::Warm => {
            warm(&cache, &namespaces, templates_store.as_ref(), strategy, &mut result).await;
        }
        CacheOperation::Clear => {
            clear(&cache, &namespaces, strategy, &mut result).await;
        }
    }

    result
}

async fn invalidate(
    cache: &Arc<dyn CacheStore>,
    namespaces: &[String],
    keys: Option<Vec<String>>,
    strategy: &SyncStrategy,
    result: &mut CacheSyncResult,
) {
    if strategy.dry_run {
        result.invalidated_keys.push("DRY_RUN_INVALIDATION".to_string());
        return;
    }

    if let Some(keys) = keys {
        for key in keys {
            match cache.delete(&key).await {
                Ok(()) => result.invalidated_keys.push(key),
                Err(e) => result.errors.push(SyncTaskError::new(&key, e)),
            }
        }
    }

    for namespace in namespaces {
        let pattern = match namespace.as_str() {
            "templates" => "template:*".to_string(),
            "bccache" => "bccache:*".to_string(),
            "responses" => "response:*".to_string(),
            "gather" => {
                for p in ["routes:*", "templates:*", "middleware:*"] {
                    invalidate_pattern(cache, p, result).await;
                }
                continue;
            }
            other => format!("{other}:*"),
        };
        invalidate_pattern(cache, &pattern, result).await;
    }
}

async fn invalidate_pattern(cache: &Arc<dyn CacheStore>, pattern: &str, result: &mut CacheSyncResult) {
    match cache.delete_pattern(pattern).await {
        Ok(deleted) if !deleted.is_empty() => result.invalidated_keys.extend(deleted),
        Ok(_) => result.invalidated_keys.push(pattern.to_string()),
        Err(e) => result.errors.push(SyncTaskError::new(pattern, e)),
    }
}

async fn warm(
    cache: &Arc<dyn CacheStore>,
    namespaces: &[String],
    templates_store: Option<&Arc<dyn ObjectStore>>,
    strategy: &SyncStrategy,
    result: &mut CacheSyncResult,
) {
    if strategy.dry_run {
        result.warmed_keys.push("DRY_RUN_WARMING".to_string());
        return;
    }

    for namespace in namespaces {
        match namespace.as_str() {
            "templates" => warm_template_cache(cache, templates_store, result).await,
            "responses" => log::debug!("response cache warming not implemented - requires an HTTP client"),
            "gather" => log::debug!("gather cache warming is out of scope for this engine"),
            _ => {}
        }
    }
}

async fn warm_template_cache(
    cache: &Arc<dyn CacheStore>,
    templates_store: Option<&Arc<dyn ObjectStore>>,
    result: &mut CacheSyncResult,
) {
    let Some(store) = templates_store else {
        log::debug!("storage not available for template warming");
        return;
    };

    for template_path in COMMON_TEMPLATES {
        let exists = match store.exists(template_path).await {
            Ok(exists) => exists,
            Err(e) => {
                log::debug!("error warming template {template_path}: {e}");
                continue;
            }
        };
        if !exists {
            continue;
        }
        let content = match store.read(template_path).await {
            Ok(content) => content,
            Err(e) => {
                log::debug!("error warming template {template_path}: {e}");
                continue;
            }
        };
        let cache_key = format!("template:{template_path}");
        match cache.set(&cache_key, content, Some(Duration::from_secs(86400))).await {
            Ok(()) => result.warmed_keys.push(cache_key),
            Err(e) => log::debug!("error warming template {template_path}: {e}"),
        }
    }
}

async fn clear(cache: &Arc<dyn CacheStore>, namespaces: &[String], strategy: &SyncStrategy, result: &mut CacheSyncResult) {
    if strategy.dry_run {
        result.cleared_namespaces.extend(namespaces.iter().cloned());
        return;
    }

    for namespace in namespaces {
        match cache.clear(namespace).await {
            Ok(()) => result.cleared_namespaces.push(namespace.clone()),
            Err(e) => result.errors.push(SyncTaskError::new(namespace, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use webcore_cache::store::MemoryStore;

    #[tokio::test]
    async fn invalidate_deletes_explicit_keys_and_namespace_patterns() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        cache.set("template:index.html", b"x".to_vec(), None).await.unwrap();
        cache.set("manual-key", b"y".to_vec(), None).await.unwrap();

        let strategy = SyncStrategy::default();
        let result = sync_cache(
            cache.clone(),
            CacheOperation::Invalidate,
            Some(vec!["templates".to_string()]),
            Some(vec!["manual-key".to_string()]),
            None,
            &strategy,
        )
        .await;

        assert!(result.invalidated_keys.contains(&"manual-key".to_string()));
        assert!(!cache.exists("template:index.html").await.unwrap());
        assert!(!cache.exists("manual-key").await.unwrap());
    }

    #[tokio::test]
    async fn warm_reads_common_templates_from_storage() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        store.write("base.html", b"<html></html>".to_vec(), None).await.unwrap();

        let strategy = SyncStrategy::default();
        let result = sync_cache(
            cache.clone(),
            CacheOperation::Warm,
            Some(vec!["templates".to_string()]),
            None,
            Some(store),
            &strategy,
        )
        .await;

        assert_eq!(result.warmed_keys, vec!["template:base.html".to_string()]);
        assert!(cache.exists("template:base.html").await.unwrap());
    }

    #[tokio::test]
    async fn clear_drops_whole_namespaces() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        cache.set("responses:a", b"1".to_vec(), None).await.unwrap();

        let strategy = SyncStrategy::default();
        let result = sync_cache(
            cache.clone(),
            CacheOperation::Clear,
            Some(vec!["responses".to_string()]),
            None,
            None,
            &strategy,
        )
        .await;

        assert_eq!(result.cleared_namespaces, vec!["responses".to_string()]);
        assert!(!cache.exists("responses:a").await.unwrap());
    }

    #[tokio::test]
    async fn gather_namespace_invalidates_its_three_patterns() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        cache.set("routes:index", b"1".to_vec(), None).await.unwrap();
        cache.set("middleware:auth", b"1".to_vec(), None).await.unwrap();

        let strategy = SyncStrategy::default();
        let result = sync_cache(
            cache.clone(),
            CacheOperation::Invalidate,
            Some(vec!["gather".to_string()]),
            None,
            None,
            &strategy,
        )
        .await;

        assert!(!cache.exists("routes:index").await.unwrap());
        assert!(!cache.exists("middleware:auth").await.unwrap());
        assert!(result.errors.is_empty());
    }
}
