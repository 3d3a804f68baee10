//! Static asset sync with selective caching: text-like assets (CSS/JS/
//! Markdown/plain text) are warmed into the response cache, binary assets
//! sync to the object store only. Grounded on `sync_static` in
//! `examples/original_source/fastblocks/actions/sync/static.py`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use webcore_cache::store::CacheStore;

use crate::conflict::{create_backup, resolve_conflict};
use crate::discovery::{discover_files, DEFAULT_EXCLUDES};
use crate::engine::{self, SyncTaskFn};
use crate::error::SyncError;
use crate::file_info::{local_file_info, remote_file_info, should_sync, FileInfo};
use crate::object_store::ObjectStore;
use crate::result::{ConflictRecord, StaticSyncResult, SyncTaskError};
use crate::strategy::{ConflictStrategy, SyncDirection, SyncStrategy};

/// Text-like assets cached for performance.
pub const CACHEABLE_EXTENSIONS: &[&str] = &["css", "js", "md", "txt"];

/// Binary assets synced to storage only, never cached, to avoid cache
/// bloat.
pub const NON_CACHEABLE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "mp4", "mov", "mp3", "wav", "pdf",
    "zip", "woff", "woff2", "ttf", "eot", "otf",
];

fn default_patterns() -> Vec<String> {
    CACHEABLE_EXTENSIONS
        .iter()
        .chain(NON_CACHEABLE_EXTENSIONS.iter())
        .map(|ext| format!("*.{ext}"))
        .collect()
}

fn is_cacheable(storage_path: &str) -> bool {
    let ext = Path::new(storage_path).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    CACHEABLE_EXTENSIONS.contains(&ext.as_str())
}

fn detect_mime(storage_path: &str) -> String {
    mime_guess::from_path(storage_path).first_or_octet_stream().to_string()
}

#[derive(Default)]
struct FileOutcome {
    synced: Vec<String>,
    conflict: Option<ConflictRecord>,
    skipped: Option<String>,
    backed_up: Vec<String>,
    cache_invalidated: Vec<String>,
    processed: Option<(String, String, bool)>,
}

/// Discover and sync every static asset under `local_root` against
/// `store`, warming `cache` for cacheable assets when supplied.
pub async fn sync_static(
    local_root: &Path,
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn CacheStore>>,
    strategy: &SyncStrategy,
) -> std::result::Result<StaticSyncResult, SyncError> {
    sync_static_with_patterns(local_root, &default_patterns(), store, cache, strategy).await
}

/// Like [`sync_static`] but with caller-supplied include patterns,
/// matching `sync_static`'s `file_patterns` override.
pub async fn sync_static_with_patterns(
    local_root: &Path,
    patterns: &[String],
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn CacheStore>>,
    strategy: &SyncStrategy,
) -> std::result::Result<StaticSyncResult, SyncError> {
    let pattern_refs: Vec<&str> = patterns.iter().map(String::as_str).collect();
    let files = discover_files(local_root, &pattern_refs, DEFAULT_EXCLUDES).await;

    let mut result = StaticSyncResult::default();
    if files.is_empty() {
        return Ok(result);
    }

    let tasks: Vec<SyncTaskFn<FileOutcome>> = files
        .into_iter()
        .map(|file| -> SyncTaskFn<FileOutcome> {
            let store = store.clone();
            let cache = cache.clone();
            let strategy = strategy.clone();
            Box::new(move || {
                let store = store.clone();
                let cache = cache.clone();
                let strategy = strategy.clone();
                let local_path = file.local_path.clone();
                let storage_path = file.storage_path.clone();
                Box::pin(async move { sync_one_file(&local_path, &storage_path, store, cache, &strategy).await })
            })
        })
        .collect();

    let run = engine::run_tasks(tasks, strategy).await?;

    for outcome in run.outcomes {
        result.synced_items.extend(outcome.synced);
        if let Some(conflict) = outcome.conflict {
            result.conflicts.push(conflict);
        }
        if let Some(skipped) = outcome.skipped {
            result.skipped.push(skipped);
        }
        result.backed_up.extend(outcome.backed_up);
        result.cache_invalidated.extend(outcome.cache_invalidated);
        if let Some((path, mime, cacheable)) = outcome.processed {
            result.assets_processed.push(path.clone());
            result.mime_types_detected.insert(path.clone(), mime);
            if cacheable {
                result.cacheable_assets.push(path);
            } else {
                result.non_cacheable_assets.push(path);
            }
        }
    }
    result.errors.extend(run.errors);

    Ok(result)
}

async fn sync_one_file(
    local_path: &Path,
    storage_path: &str,
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn CacheStore>>,
    strategy: &SyncStrategy,
) -> Result<FileOutcome, SyncTaskError> {
    let mut outcome = FileOutcome::default();

    let local = local_file_info(local_path).await;
    let remote = read_remote(&store, storage_path).await.map_err(|e| SyncTaskError::new(storage_path, e))?;

    let (needed, reason) = should_sync(&local, &remote, strategy.direction);
    if !needed {
        outcome.skipped = Some(format!("{storage_path} ({reason})"));
        return Ok(outcome);
    }

    let mime_type = detect_mime(storage_path);
    let cacheable = is_cacheable(storage_path);

    let should_pull = strategy.direction == SyncDirection::Pull
        || (strategy.direction == SyncDirection::Bidirectional
            && remote.exists
            && (!local.exists || remote.mtime > local.mtime));
    let should_push = strategy.direction == SyncDirection::Push
        || (strategy.direction == SyncDirection::Bidirectional
            && local.exists
            && (!remote.exists || local.mtime > remote.mtime));
    let bidirectional_conflict =
        strategy.direction == SyncDirection::Bidirectional && local.exists && remote.exists;

    let outcome_result = if should_pull {
        pull(local_path, storage_path, &store, cache.as_deref(), strategy, cacheable, &mut outcome).await
    } else if should_push {
        push(local_path, storage_path, &store, cache.as_deref(), strategy, &mime_type, cacheable, &mut outcome).await
    } else if bidirectional_conflict {
        handle_conflict(
            local_path, storage_path, &store, cache.as_deref(), &local, &remote, strategy, &mime_type, cacheable,
            &mut outcome,
        )
        .await
    } else {
        Ok(())
    };
    outcome_result.map_err(|e| SyncTaskError::new(storage_path, e))?;

    if !outcome.synced.is_empty() {
        outcome.processed = Some((storage_path.to_string(), mime_type, cacheable));
    }

    Ok(outcome)
}

async fn read_remote(store: &Arc<dyn ObjectStore>, storage_path: &str) -> Result<FileInfo, Box<dyn std::error::Error>> {
    if !store.exists(storage_path).await? {
        return Ok(FileInfo::default());
    }
    let content = store.read(storage_path).await?;
    let stat = store.stat(storage_path).await?;
    Ok(remote_file_info(content, stat.mtime))
}

async fn pull(
    local_path: &Path,
    storage_path: &str,
    store: &Arc<dyn ObjectStore>,
    cache: Option<&dyn CacheStore>,
    strategy: &SyncStrategy,
    cacheable: bool,
    outcome: &mut FileOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    if strategy.dry_run {
        outcome.synced.push(format!("PULL(dry-run): {storage_path}"));
        return Ok(());
    }

    if tokio::fs::metadata(local_path).await.is_ok() && strategy.backup_on_conflict {
        let backup = create_backup(local_path, None).await?;
        outcome.backed_up.push(backup.display().to_string());
    }

    let content = store.read(storage_path).await?;
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(local_path, &content).await?;
    outcome.synced.push(format!("PULL: {storage_path}"));

    if cacheable {
        if let Some(cache) = cache {
            cache_static_asset(cache, storage_path, content, outcome).await;
        }
    }
    Ok(())
}

async fn push(
    local_path: &Path,
    storage_path: &str,
    store: &Arc<dyn ObjectStore>,
    cache: Option<&dyn CacheStore>,
    strategy: &SyncStrategy,
    mime_type: &str,
    cacheable: bool,
    outcome: &mut FileOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    if strategy.dry_run {
        outcome.synced.push(format!("PUSH(dry-run): {storage_path}"));
        return Ok(());
    }

    let content = tokio::fs::read(local_path).await?;
    store.write(storage_path, content.clone(), Some(mime_type)).await?;
    outcome.synced.push(format!("PUSH: {storage_path}"));

    if cacheable {
        if let Some(cache) = cache {
            cache_static_asset(cache, storage_path, content, outcome).await;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_conflict(
    local_path: &Path,
    storage_path: &str,
    store: &Arc<dyn ObjectStore>,
    cache: Option<&dyn CacheStore>,
    local: &FileInfo,
    remote: &FileInfo,
    strategy: &SyncStrategy,
    mime_type: &str,
    cacheable: bool,
    outcome: &mut FileOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    if strategy.conflict_strategy == ConflictStrategy::Manual {
        outcome.conflict = Some(manual_conflict(storage_path, local, remote));
        return Ok(());
    }

    let remote_content = remote.content.clone().unwrap_or_default();
    let local_content = local.content.clone().unwrap_or_default();
    let Some((resolved, reason)) = resolve_conflict(
        &remote_content,
        &local_content,
        strategy.conflict_strategy,
        Some(local.mtime),
        Some(remote.mtime),
    ) else {
        outcome.conflict = Some(manual_conflict(storage_path, local, remote));
        return Ok(());
    };

    if strategy.dry_run {
        outcome.synced.push(format!("CONFLICT(dry-run): {storage_path} - {reason}"));
        return Ok(());
    }

    if strategy.backup_on_conflict || strategy.conflict_strategy == ConflictStrategy::BackupBoth {
        let backup = create_backup(local_path, Some("conflict")).await?;
        outcome.backed_up.push(backup.display().to_string());
    }

    if resolved == remote_content {
        tokio::fs::write(local_path, &resolved).await?;
        outcome.synced.push(format!("CONFLICT->REMOTE: {storage_path} - {reason}"));
    } else {
        store.write(storage_path, resolved.clone(), Some(mime_type)).await?;
        outcome.synced.push(format!("CONFLICT->LOCAL: {storage_path} - {reason}"));
    }

    if cacheable {
        if let Some(cache) = cache {
            cache_static_asset(cache, storage_path, resolved, outcome).await;
        }
    }
    Ok(())
}

fn manual_conflict(storage_path: &str, local: &FileInfo, remote: &FileInfo) -> ConflictRecord {
    ConflictRecord {
        path: storage_path.to_string(),
        local_mtime: Some(local.mtime),
        remote_mtime: Some(remote.mtime),
        reason: "manual_resolution_required".to_string(),
    }
}

async fn cache_static_asset(cache: &dyn CacheStore, storage_path: &str, content: Vec<u8>, outcome: &mut FileOutcome) {
    let cache_key = format!("static:{storage_path}");
    match cache.set(&cache_key, content, Some(Duration::from_secs(86400))).await {
        Ok(()) => outcome.cache_invalidated.push(cache_key),
        Err(e) => log::debug!("error caching static file {storage_path}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use webcore_cache::store::MemoryStore;

    #[tokio::test]
    async fn pushes_new_local_files_and_caches_cacheable_ones() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.css"), b"body{color:red}").await.unwrap();
        tokio::fs::write(dir.path().join("logo.png"), vec![0u8; 10]).await.unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let strategy = SyncStrategy { direction: SyncDirection::Push, ..Default::default() };

        let result = sync_static(dir.path(), store.clone(), Some(cache.clone()), &strategy).await.unwrap();

        assert_eq!(result.synced_items.len(), 2);
        assert!(result.cacheable_assets.contains(&"app.css".to_string()));
        assert!(result.non_cacheable_assets.contains(&"logo.png".to_string()));
        assert!(store.exists("app.css").await.unwrap());
        assert!(cache.exists("static:app.css").await.unwrap());
        assert!(!cache.exists("static:logo.png").await.unwrap());
    }

    #[tokio::test]
    async fn pulls_remote_only_files_to_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        store.write("js/app.js", b"console.log(1)".to_vec(), Some("text/javascript")).await.unwrap();

        let strategy = SyncStrategy { direction: SyncDirection::Pull, ..Default::default() };
        let result = sync_static(dir.path(), store, None, &strategy).await.unwrap();

        assert_eq!(result.synced_items, vec!["PULL: js/app.js".to_string()]);
        assert_eq!(tokio::fs::read(dir.path().join("js/app.js")).await.unwrap(), b"console.log(1)");
    }

    #[tokio::test]
    async fn manual_conflict_strategy_records_without_resolving() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.css"), b"local").await.unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        store.write("app.css", b"remote".to_vec(), None).await.unwrap();

        let strategy = SyncStrategy {
            direction: SyncDirection::Bidirectional,
            conflict_strategy: ConflictStrategy::Manual,
            ..Default::default()
        };
        let result = sync_static(dir.path(), store, None, &strategy).await.unwrap();

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].path, "app.css");
        assert!(result.synced_items.is_empty());
    }

    #[tokio::test]
    async fn identical_content_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.css"), b"same").await.unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        store.write("app.css", b"same".to_vec(), None).await.unwrap();

        let strategy = SyncStrategy::default();
        let result = sync_static(dir.path(), store, None, &strategy).await.unwrap();

        assert!(result.synced_items.is_empty());
        assert_eq!(result.skipped.len(), 1);
    }
}
