//! Conflict resolution and backup creation, grounded on `resolve_conflict`
//! and `create_backup` in
//! `examples/original_source/fastblocks/actions/sync/strategies.py`.

use std::path::{Path, PathBuf};

use crate::file_info::unix_now;
use crate::strategy::ConflictStrategy;

/// Resolve a same-file conflict per `strategy`, returning the winning
/// content and a short reason string for diagnostics/result recording.
///
/// Returns `None` for [`ConflictStrategy::Manual`] — every surface
/// module's conflict handler checks for `Manual` itself before reaching
/// this point and records a [`crate::result::ConflictRecord`] instead, so
/// in practice this only returns `None` defensively.
pub fn resolve_conflict(
    remote_content: &[u8],
    local_content: &[u8],
    strategy: ConflictStrategy,
    local_mtime: Option<f64>,
    remote_mtime: Option<f64>,
) -> Option<(Vec<u8>, String)> {
    match strategy {
        ConflictStrategy::RemoteWins => Some((remote_content.to_vec(), "remote_wins".to_string())),
        ConflictStrategy::LocalWins => Some((local_content.to_vec(), "local_wins".to_string())),
        ConflictStrategy::NewestWins => match (local_mtime, remote_mtime) {
            (Some(local), Some(remote)) if remote > local => {
                Some((remote_content.to_vec(), format!("remote_newer({remote} > {local})")))
            }
            (Some(local), Some(remote)) => {
                Some((local_content.to_vec(), format!("local_newer({local} >= {remote})")))
            }
            _ => Some((remote_content.to_vec(), "newest_wins_fallback_remote".to_string())),
        },
        ConflictStrategy::BackupBoth => Some((remote_content.to_vec(), "backup_both".to_string())),
        ConflictStrategy::Manual => None,
    }
}

/// Copy `path` to a sibling backup file, appending `.{suffix}` to the
/// existing filename (`foo.css` becomes `foo.css.backup_1234`), matching
/// `create_backup`'s `Path.with_suffix` construction. A no-op (returning
/// the would-be path without creating it) if `path` doesn't exist.
pub async fn create_backup(path: &Path, suffix: Option<&str>) -> std::io::Result<PathBuf> {
    let suffix = suffix.map(str::to_string).unwrap_or_else(|| format!("backup_{}", unix_now() as u64));
    let mut file_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    file_name.push(".");
    file_name.push(&suffix);
    let backup_path = path.with_file_name(file_name);

    if tokio::fs::metadata(path).await.is_ok() {
        tokio::fs::copy(path, &backup_path).await?;
        log::debug!("created backup: {}", backup_path.display());
    }

    Ok(backup_path)
}
