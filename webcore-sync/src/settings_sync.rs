//! Settings file sync with YAML validation ahead of every pull/push/
//! conflict-resolution and an optional post-sync configuration reload.
//! Grounded on `sync_settings` in
//! `examples/original_source/fastblocks/actions/sync/settings.py`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conflict::{create_backup, resolve_conflict};
use crate::discovery::discover_files;
use crate::engine::{self, SyncTaskFn};
use crate::error::SyncError;
use crate::file_info::{local_file_info, remote_file_info, should_sync, FileInfo};
use crate::object_store::ObjectStore;
use crate::result::{ConflictRecord, SettingsSyncResult, SyncTaskError};
use crate::strategy::{ConflictStrategy, SyncDirection, SyncStrategy};

const EXCLUDES: &[&str] = &["*.tmp", "*.log", ".*"];
const PATTERNS: &[&str] = &["*.yml", "*.yaml"];

/// Applies a reloaded configuration after a settings sync changes files
/// on disk, the collaborator a surface outside this crate supplies (the
/// `webcore` configuration layer, in practice) to avoid a dependency
/// cycle between `webcore` and `webcore-sync`.
#[async_trait::async_trait]
pub trait ConfigReloader: Send + Sync {
    async fn reload(&self, adapters: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Default)]
struct FileOutcome {
    synced: Vec<String>,
    conflict: Option<ConflictRecord>,
    skipped: Option<String>,
    backed_up: Vec<String>,
    adapter: Option<String>,
    validation_failure: Option<(PathBuf, String)>,
}

/// Discover and sync every `*.yml`/`*.yaml` file under `local_root`,
/// restricting to `adapter_names` (matched against the file stem) when
/// given, then invoke `reloader` once if anything synced.
pub async fn sync_settings(
    local_root: &Path,
    store: Arc<dyn ObjectStore>,
    adapter_names: Option<&[String]>,
    strategy: &SyncStrategy,
    reloader: Option<Arc<dyn ConfigReloader>>,
) -> std::result::Result<SettingsSyncResult, SyncError> {
    let mut files = discover_files(local_root, PATTERNS, EXCLUDES).await;
    if let Some(adapter_names) = adapter_names {
        files.retain(|file| {
            let stem = Path::new(&file.storage_path).file_stem().and_then(|s| s.to_str()).unwrap_or("");
            adapter_names.iter().any(|name| name == stem)
        });
    }

    let mut result = SettingsSyncResult::default();
    if files.is_empty() {
        return Ok(result);
    }

    let tasks: Vec<SyncTaskFn<FileOutcome>> = files
        .into_iter()
        .map(|file| -> SyncTaskFn<FileOutcome> {
            let store = store.clone();
            let strategy = strategy.clone();
            Box::new(move || {
                let store = store.clone();
                let strategy = strategy.clone();
                let local_path = file.local_path.clone();
                let storage_path = file.storage_path.clone();
                Box::pin(async move { sync_one_settings_file(&local_path, &storage_path, store, &strategy).await })
            })
        })
        .collect();

    let run = engine::run_tasks(tasks, strategy).await?;

    let mut adapters_affected = Vec::new();
    for outcome in run.outcomes {
        result.synced_items.extend(outcome.synced);
        if let Some(conflict) = outcome.conflict {
            result.conflicts.push(conflict);
        }
        if let Some(skipped) = outcome.skipped {
            result.skipped.push(skipped);
        }
        result.backed_up.extend(outcome.backed_up);
        if let Some(failure) = outcome.validation_failure {
            result.validation_failures.push(failure);
        }
        if let Some(adapter) = outcome.adapter {
            adapters_affected.push(adapter);
        }
    }
    result.errors.extend(run.errors);

    if !result.synced_items.is_empty() {
        if let Some(reloader) = reloader {
            match reloader.reload(&adapters_affected).await {
                Ok(()) => result.adapters_reloaded = adapters_affected,
                Err(e) => result.errors.push(SyncTaskError::new("config_reload", e)),
            }
        }
    }

    Ok(result)
}

fn validate_yaml(content: &[u8]) -> Result<(), String> {
    serde_yaml::from_slice::<serde_yaml::Value>(content).map(|_| ()).map_err(|e| e.to_string())
}

async fn sync_one_settings_file(
    local_path: &Path,
    storage_path: &str,
    store: Arc<dyn ObjectStore>,
    strategy: &SyncStrategy,
) -> Result<FileOutcome, SyncTaskError> {
    let mut outcome = FileOutcome::default();
    let adapter_name = Path::new(storage_path).file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();

    let local = local_file_info(local_path).await;
    let remote = read_remote(&store, storage_path).await.map_err(|e| SyncTaskError::new(storage_path, e))?;

    let (needed, reason) = should_sync(&local, &remote, strategy.direction);
    if !needed {
        outcome.skipped = Some(format!("{storage_path} ({reason})"));
        return Ok(outcome);
    }

    if let Some(content) = local.content.as_deref() {
        if let Err(error) = validate_yaml(content) {
            outcome.validation_failure = Some((local_path.to_path_buf(), error));
            return Ok(outcome);
        }
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
        outcome.adapter = Some(adapter_name);
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

    let content = store.read(storage_path).await?;
    if let Err(error) = validate_yaml(&content) {
        outcome.validation_failure = Some((local_path.to_path_buf(), error));
        return Ok(());
    }

    if tokio::fs::metadata(local_path).await.is_ok() && strategy.backup_on_conflict {
        let backup = create_backup(local_path, None).await?;
        outcome.backed_up.push(backup.display().to_string());
    }
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
    if let Err(error) = validate_yaml(&content) {
        outcome.validation_failure = Some((local_path.to_path_buf(), error));
        return Ok(());
    }
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
    for content in [&remote_content, &local_content] {
        if let Err(error) = validate_yaml(content) {
            outcome.validation_failure = Some((local_path.to_path_buf(), error));
            return Ok(());
        }
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingReloader(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl ConfigReloader for RecordingReloader {
        async fn reload(&self, _adapters: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn valid_yaml_pushes_and_triggers_reload() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.yml"), b"debug: true\n").await.unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let reloaded = Arc::new(AtomicBool::new(false));
        let reloader: Arc<dyn ConfigReloader> = Arc::new(RecordingReloader(reloaded.clone()));

        let strategy = SyncStrategy { direction: SyncDirection::Push, ..Default::default() };
        let result = sync_settings(dir.path(), store, None, &strategy, Some(reloader)).await.unwrap();

        assert_eq!(result.synced_items.len(), 1);
        assert_eq!(result.adapters_reloaded, vec!["app".to_string()]);
        assert!(reloaded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn invalid_local_yaml_is_recorded_not_synced() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("broken.yml"), b"foo: [unterminated\n").await.unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let strategy = SyncStrategy { direction: SyncDirection::Push, ..Default::default() };
        let result = sync_settings(dir.path(), store, None, &strategy, None).await.unwrap();

        assert!(result.synced_items.is_empty());
        assert_eq!(result.validation_failures.len(), 1);
    }

    #[tokio::test]
    async fn adapter_name_filter_restricts_discovery() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.yml"), b"debug: true\n").await.unwrap();
        tokio::fs::write(dir.path().join("db.yml"), b"host: localhost\n").await.unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let strategy = SyncStrategy { direction: SyncDirection::Push, ..Default::default() };
        let result =
            sync_settings(dir.path(), store, Some(&["db".to_string()]), &strategy, None).await.unwrap();

        assert_eq!(result.synced_items, vec!["PUSH: db.yml".to_string()]);
    }
}
