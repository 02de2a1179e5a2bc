//! Recursive sample file discovery

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions sample files are expected to carry
pub const SAMPLE_EXTENSIONS: [&str; 3] = ["csv", "txt", "dat"];

/// Find every file under `root` whose extension matches `extension`
/// (case-insensitive, with or without a leading dot). The result is sorted
/// so repeated scans load files in the same order.
pub fn discover_in_folder<P: AsRef<Path>>(root: P, extension: &str) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(Error::ingestion(root, "not a directory"));
    }
    let wanted = extension.trim_start_matches('.');

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
        })
        .map(|e| e.into_path())
        .collect();
    found.sort();

    tracing::debug!(root = %root.display(), extension = wanted, count = found.len(), "scanned folder");
    Ok(found)
}
