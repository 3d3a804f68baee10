//! Local-file reads and the local/remote comparison rules, grounded on
//! `get_file_info`, `compare_content`, and `should_sync` in
//! `examples/original_source/fastblocks/actions/sync/strategies.py`.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use blake2::{Blake2b512, Digest};

use crate::strategy::SyncDirection;

/// A read of one side (local filesystem or remote object store) of a
/// comparison.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub exists: bool,
    pub size: u64,
    pub mtime: f64,
    pub content_hash: Option<String>,
    pub content: Option<Vec<u8>>,
}

/// Read `path` from the local filesystem, hashing its content with
/// BLAKE2b-512 the way the original's `get_file_info` does with
/// `hashlib.blake2b`. A missing or unreadable file is reported as
/// non-existent rather than propagating an error — the caller treats
/// that identically to "never synced here yet".
pub async fn local_file_info(path: &Path) -> FileInfo {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return FileInfo::default();
    };
    let Ok(content) = tokio::fs::read(path).await else {
        return FileInfo::default();
    };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0);

    FileInfo {
        exists: true,
        size: content.len() as u64,
        mtime,
        content_hash: Some(hash_content(&content)),
        content: Some(content),
    }
}

/// Build a [`FileInfo`] from bytes already read from a remote object
/// store, pairing it with the mtime the store reported.
pub fn remote_file_info(content: Vec<u8>, mtime: f64) -> FileInfo {
    FileInfo {
        exists: true,
        size: content.len() as u64,
        mtime,
        content_hash: Some(hash_content(&content)),
        content: Some(content),
    }
}

/// BLAKE2b-512 hex digest of `content`, matching the original's
/// unconditional `hashlib.blake2b(content).hexdigest()`.
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Byte-for-byte compare, falling back to a BLAKE2b hash comparison once
/// content exceeds 1KiB, matching `compare_content`'s size threshold.
pub fn compare_content(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a.len() > 1024 {
        return hash_content(a) == hash_content(b);
    }
    a == b
}

/// Decide whether a file needs syncing given both sides' [`FileInfo`],
/// per `should_sync`/`_check_missing_files`/`_check_content_differences`.
/// The trailing fallback (neither side missing-check nor both-present
/// applies — e.g. a `Push`-only run against a local-missing file) returns
/// `(false, "content_identical")`, matching the original's same fallthrough.
pub fn should_sync(
    local: &FileInfo,
    remote: &FileInfo,
    direction: SyncDirection,
) -> (bool, &'static str) {
    if !local.exists
        && remote.exists
        && matches!(direction, SyncDirection::Pull | SyncDirection::Bidirectional)
    {
        return (true, "local_missing");
    }
    if local.exists
        && !remote.exists
        && matches!(direction, SyncDirection::Push | SyncDirection::Bidirectional)
    {
        return (true, "remote_missing");
    }
    if !local.exists && !remote.exists {
        return (false, "both_missing");
    }
    if local.exists && remote.exists {
        if local.content_hash == remote.content_hash {
            return (false, "content_identical");
        }
        return (
            true,
            match direction {
                SyncDirection::Pull => "content_differs_pull",
                SyncDirection::Push => "content_differs_push",
                SyncDirection::Bidirectional => "content_differs_bidirectional",
            },
        );
    }
    (false, "content_identical")
}

/// Current unix time in fractional seconds, used for backup suffixes and
/// as a synthetic mtime for stores that don't track one.
pub fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(exists: bool, hash: Option<&str>) -> FileInfo {
        FileInfo { exists, content_hash: hash.map(str::to_string), ..Default::default() }
    }

    #[test]
    fn both_missing_reports_no_sync_needed() {
        let (sync, reason) = should_sync(&info(false, None), &info(false, None), SyncDirection::Bidirectional);
        assert!(!sync);
        assert_eq!(reason, "both_missing");
    }

    #[test]
    fn local_missing_on_pull_triggers_sync() {
        let (sync, reason) =
            should_sync(&info(false, None), &info(true, Some("h")), SyncDirection::Pull);
        assert!(sync);
        assert_eq!(reason, "local_missing");
    }

    #[test]
    fn local_missing_on_push_only_does_not_trigger() {
        let (sync, reason) =
            should_sync(&info(false, None), &info(true, Some("h")), SyncDirection::Push);
        assert!(!sync);
        assert_eq!(reason, "content_identical");
    }

    #[test]
    fn identical_hashes_skip_even_if_both_exist() {
        let (sync, reason) = should_sync(
            &info(true, Some("same")),
            &info(true, Some("same")),
            SyncDirection::Bidirectional,
        );
        assert!(!sync);
        assert_eq!(reason, "content_identical");
    }

    #[test]
    fn differing_hashes_report_direction_specific_reason() {
        let (sync, reason) = should_sync(
            &info(true, Some("a")),
            &info(true, Some("b")),
            SyncDirection::Bidirectional,
        );
        assert!(sync);
        assert_eq!(reason, "content_differs_bidirectional");
    }

    #[test]
    fn compare_content_hashes_large_payloads() {
        let a = vec![7u8; 2048];
        let mut b = a.clone();
        assert!(compare_content(&a, &b));
        b[0] = 0;
        assert!(!compare_content(&a, &b));
    }

    #[test]
    fn compare_content_compares_small_payloads_directly() {
        assert!(compare_content(b"hello", b"hello"));
        assert!(!compare_content(b"hello", b"world"));
    }
}
