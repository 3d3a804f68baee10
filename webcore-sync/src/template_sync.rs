//! Template sync with post-sync cache/bytecode-cache coherence. Grounded
//! on `sync_templates` in
//! `examples/original_source/fastblocks/actions/sync/templates.py`.

use std::path::Path;
use std::sync::Arc;

use webcore_cache::store::CacheStore;

use crate::conflict::{create_backup, resolve_conflict};
use crate::discovery::{discover_files, DEFAULT_EXCLUDES};
use crate::engine::{self, SyncTaskFn};
use crate::error::SyncError;
use crate::file_info::{local_file_info, remote_file_info, should_sync, FileInfo};
use crate::object_store::ObjectStore;
use crate::result::{ConflictRecord, SyncTaskError, TemplateSyncResult};
use crate::strategy::{ConflictStrategy, SyncDirection, SyncStrategy};

/// Default include patterns, matching `_prepare_sync_config`'s fallback.
pub const DEFAULT_PATTERNS: &[&str] = &["*.html", "*.jinja2", "*.j2", "*.txt"];

#[derive(Default)]
struct FileOutcome {
    synced: Vec<String>,
    conflict: Option<ConflictRecord>,
    skipped: Option<String>,
    backed_up: Vec<String>,
    cache_invalidated: Vec<String>,
    bytecode_invalidated: Vec<String>,
}

/// Discover and sync every template under `local_root`, invalidating
/// `cache`'s `template:`/`bccache:` entries for every file that
/// successfully synced.
pub async fn sync_templates(
    local_root: &Path,
    store: Arc<dyn ObjectStore>,
    cache: Option<Arc<dyn CacheStore>>,
    strategy: &SyncStrategy,
) -> std::result::Result<TemplateSyncResult, SyncError> {
    let files = discover_files(local_root, DEFAULT_PATTERNS, DEFAULT_EXCLUDES).await;

    let mut result = TemplateSyncResult::default();
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
                Box::pin(async move { sync_one_template(&local_path, &storage_path, store, cache, &strategy).await })
            })
        })
        .collect();

    let run = engine::run_tasks(tasks, strategy).await?;

    for outcome in run.outcomes {
        result.templates_synced.extend(outcome.synced.clone());
        result.synced_items.extend(outcome.synced);
        if let Some(conflict) = outcome.conflict {
            result.conflicts.push(conflict);
        }
        if let Some(skipped) = outcome.skipped {
            result.skipped.push(skipped);
        }
        result.backed_up.extend(outcome.backed_up);
        result.cache_invalidated.extend(outcome.cache_invalidated);
        result.bytecode_invalidated.extend(outcome.bytecode_invalidated);
    }
    result.errors.extend(run.errors);

    Ok(result)
}

async fn sync_one_template(
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
        pull(local_path, storage_path, &store, strategy, &mut outcome).await
    } else if should_push {
        push(local_path, storage_path, &store, strategy, &mut outcome).await
    } else if bidirectional_conflict {
        handle_conflict(local_path, storage_path, &store, &local, &remote, strategy, &mut outcome).await
    } else {
        Ok(())
    };
    outcome_result.map_err(|e| SyncTaskError::new(storage_path, e))?;

    if !outcome.synced.is_empty() {
        if let Some(cache) = cache.as_deref() {
            invalidate_template_cache(cache, storage_path, &mut outcome).await;
        }
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
    strategy: &SyncStrategy,
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
    Ok(())
}

async fn push(
    local_path: &Path,
    storage_path: &str,
    store: &Arc<dyn ObjectStore>,
    strategy: &SyncStrategy,
    outcome: &mut FileOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    if strategy.dry_run {
        outcome.synced.push(format!("PUSH(dry-run): {storage_path}"));
        return Ok(());
    }
    let content = tokio::fs::read(local_path).await?;
    store.write(storage_path, content, None).await?;
    outcome.synced.push(format!("PUSH: {storage_path}"));
    Ok(())
}

async fn handle_conflict(
    local_path: &Path,
    storage_path: &str,
    store: &Arc<dyn ObjectStore>,
    local: &FileInfo,
    remote: &FileInfo,
    strategy: &SyncStrategy,
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
        store.write(storage_path, resolved, None).await?;
        outcome.synced.push(format!("CONFLICT->LOCAL: {storage_path} - {reason}"));
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

async fn invalidate_template_cache(cache: &dyn CacheStore, storage_path: &str, outcome: &mut FileOutcome) {
    let template_key = format!("template:{storage_path}");
    if cache.delete(&template_key).await.is_ok() {
        outcome.cache_invalidated.push(template_key);
    }

    let bytecode_key = format!("bccache:{storage_path}");
    if cache.delete(&bytecode_key).await.is_ok() {
        outcome.bytecode_invalidated.push(bytecode_key);
    }

    let _ = cache.delete_pattern(&format!("template:*:{storage_path}")).await;
    let _ = cache.delete_pattern(&format!("bccache:*:{storage_path}")).await;
}
