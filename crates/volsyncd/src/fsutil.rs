//! Local filesystem helpers shared by the strategies.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Creates `path` and any missing parents.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| SyncError::filesystem(path, e))
}

/// True when `path` is a directory with no entries.
pub fn dir_is_empty(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| SyncError::filesystem(path, e))?;
    Ok(entries.next().is_none())
}

/// Recursive listing of relative paths under `root`, sorted.
///
/// Used to compare a directory tree before and after an operation.
pub fn list_tree(root: &Path) -> Result<Vec<PathBuf>> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir).map_err(|e| SyncError::filesystem(dir, e))? {
            let entry = entry.map_err(|e| SyncError::filesystem(dir, e))?;
            let path = entry.path();
            out.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
            if path.is_dir() {
                walk(root, &path, out)?;
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

/// Removes a directory tree, logging instead of failing.
///
/// Used on cleanup paths where the primary error must win.
pub fn remove_dir_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(path) {
        log::warn!("failed to remove directory {}: {}", path.display(), e);
    }
}
