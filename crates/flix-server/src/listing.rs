//! Recursive listing of the served directory.

use std::path::Path;
use std::time::UNIX_EPOCH;

use flix_core::{FileKind, MediaKey};
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

/// One file of the library, as returned by `GET /files`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    /// Path relative to the root, `/`-separated.
    pub path: String,
    pub key: MediaKey,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub modified: f64,
    pub kind: FileKind,
}

/// List every regular file under `root`, sorted by path.
///
/// Hidden entries and anything under `exclude` (the cache directory, when it
/// lives inside the library) are skipped. Unreadable entries are logged and
/// skipped.
pub fn list_files(root: &Path, exclude: Option<&Path>) -> flix_core::Result<Vec<FileEntry>> {
    if !root.is_dir() {
        return Err(flix_core::Error::not_found("directory", root.display()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && Some(e.path()) != exclude));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), "No metadata: {e}");
                continue;
            }
        };

        let key = MediaKey::from_relative_path(relative);
        let path = flix_core::key::normalize_relative(&relative.to_string_lossy());
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind: FileKind::from_path(entry.path()),
            path,
            key,
            size: meta.len(),
            modified,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
