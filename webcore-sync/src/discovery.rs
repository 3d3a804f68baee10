//! Local filesystem discovery: glob-pattern matching plus default
//! excludes, grounded on `_discover_files_with_pattern`/`_should_exclude_file`
//! in `examples/original_source/fastblocks/actions/sync/{static,settings,
//! templates}.py`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

/// A file found during discovery, with the path relative to the root it
/// was discovered under — used verbatim as the object-store key.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub local_path: PathBuf,
    pub storage_path: String,
}

/// Patterns excluded from every discovery pass regardless of the
/// surface-specific include patterns, matching `_prepare_static_sync_config`'s
/// default `exclude_patterns`.
pub const DEFAULT_EXCLUDES: &[&str] = &["*.tmp", "*.log", ".*", "__pycache__"];

/// Walk `root` recursively, returning every file matching any of
/// `patterns` (glob syntax, matched against the file's base name) that
/// doesn't also match any of `excludes`. An absent `root` yields an empty
/// result rather than an error, matching `_discover_static_files`'s
/// existence check.
pub async fn discover_files(
    root: &Path,
    patterns: &[&str],
    excludes: &[&str],
) -> Vec<DiscoveredFile> {
    if tokio::fs::metadata(root).await.is_err() {
        return Vec::new();
    }

    let root = root.to_path_buf();
    let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
    let excludes: Vec<String> = excludes.iter().map(|s| s.to_string()).collect();

    tokio::task::spawn_blocking(move || walk(&root, &patterns, &excludes))
        .await
        .expect("discovery worker panicked")
}

fn build_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().expect("empty glob set"))
}

fn walk(root: &Path, patterns: &[String], excludes: &[String]) -> Vec<DiscoveredFile> {
    let include_set = build_set(patterns);
    let exclude_set = build_set(excludes);
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if exclude_set.is_match(&file_name) || !include_set.is_match(&file_name) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else { continue };
        files.push(DiscoveredFile {
            local_path: entry.path().to_path_buf(),
            storage_path: relative.to_string_lossy().replace('\\', "/"),
        });
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discovers_matching_files_and_skips_excluded() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.css"), b"body{}").await.unwrap();
        tokio::fs::write(dir.path().join("app.css.tmp"), b"scratch").await.unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();
        tokio::fs::write(dir.path().join("nested/more.css"), b"a{}").await.unwrap();

        let files = discover_files(dir.path(), &["*.css"], DEFAULT_EXCLUDES).await;
        let mut paths: Vec<&str> = files.iter().map(|f| f.storage_path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["app.css", "nested/more.css"]);
    }

    #[tokio::test]
    async fn missing_root_yields_empty_result() {
        let files = discover_files(Path::new("/does/not/exist"), &["*.css"], DEFAULT_EXCLUDES).await;
        assert!(files.is_empty());
    }
}
