//! Stage-then-swap directory replacement.
//!
//! Replacing a populated target is done as a transaction: the new tree is
//! built in a sibling staging directory, the old target is renamed to a
//! backup, the staging tree is renamed into place, and only then is the
//! backup deleted. Every rename stays on one filesystem so the commit point
//! is a single atomic rename. At any observable moment the target holds
//! either the complete old tree or the complete new tree.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::fsutil::remove_dir_best_effort;

/// In-flight replacement of `target`.
///
/// `begin` reserves sibling staging and backup paths; the caller populates
/// the staging path, then either [`commit`](Self::commit)s or
/// [`abort`](Self::abort)s. Dropping an uncommitted transaction removes the
/// staging directory.
#[derive(Debug)]
pub struct ReplaceTransaction {
    target: PathBuf,
    staging: PathBuf,
    backup: PathBuf,
    done: bool,
}

impl ReplaceTransaction {
    /// Reserves unique staging and backup paths beside `target`.
    ///
    /// Nothing is created on disk; the staging path is handed to the caller
    /// to build (a clone destination, an extraction directory, ...).
    pub fn begin(target: &Path) -> Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            SyncError::Validation(format!(
                "target '{}' has no parent directory",
                target.display()
            ))
        })?;
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("volume");
        let token = uuid::Uuid::new_v4();

        Ok(Self {
            target: target.to_path_buf(),
            staging: parent.join(format!(".{}.staging-{}", name, token)),
            backup: parent.join(format!(".{}.backup-{}", name, token)),
            done: false,
        })
    }

    /// Directory the caller must populate with the replacement tree.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Discards the staging tree, leaving the target untouched.
    pub fn abort(mut self) {
        remove_dir_best_effort(&self.staging);
        self.done = true;
    }

    /// Swaps the staged tree into place.
    ///
    /// On a backup-rename failure the target is untouched. On a swap
    /// failure the backup is renamed back; if that rollback also fails a
    /// [`SyncError::ReplaceRollback`] names both surviving paths so no data
    /// is silently lost. A leftover backup after a successful swap is a
    /// warning, not an error.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;

        if let Err(e) = fs::rename(&self.target, &self.backup) {
            log::error!(
                "failed to set aside {}: {}; target preserved",
                self.target.display(),
                e
            );
            remove_dir_best_effort(&self.staging);
            return Err(SyncError::filesystem(&self.target, e));
        }

        if let Err(e) = fs::rename(&self.staging, &self.target) {
            log::error!(
                "failed to move staged tree into {}: {}; restoring backup",
                self.target.display(),
                e
            );
            if let Err(restore) = fs::rename(&self.backup, &self.target) {
                log::error!(
                    "rollback failed: {}; original content remains at {}",
                    restore,
                    self.backup.display()
                );
                return Err(SyncError::ReplaceRollback {
                    target: self.target.clone(),
                    backup: self.backup.clone(),
                });
            }
            remove_dir_best_effort(&self.staging);
            return Err(SyncError::filesystem(&self.target, e));
        }

        if let Err(e) = fs::remove_dir_all(&self.backup) {
            log::warn!(
                "replaced {} but could not remove backup {}: {}",
                self.target.display(),
                self.backup.display(),
                e
            );
        }
        Ok(())
    }
}

impl Drop for ReplaceTransaction {
    fn drop(&mut self) {
        if !self.done {
            remove_dir_best_effort(&self.staging);
        }
    }
}

/// Runs the full stage-then-swap sequence.
///
/// `stage` receives the staging path and builds the replacement tree there.
/// If it fails, the staging directory is removed and the target is left
/// exactly as it was.
pub async fn replace_with<F, Fut>(target: &Path, stage: F) -> Result<()>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let tx = ReplaceTransaction::begin(target)?;
    let staging = tx.staging_path().to_path_buf();

    if let Err(e) = stage(staging).await {
        log::warn!(
            "staging failed, target {} preserved: {}",
            target.display(),
            e
        );
        tx.abort();
        return Err(e);
    }

    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::list_tree;
    use tempfile::TempDir;

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn populate_target(dir: &TempDir) -> PathBuf {
        let target = dir.path().join("volume");
        fs::create_dir_all(target.join("sub")).unwrap();
        fs::write(target.join("keep.txt"), "original").unwrap();
        fs::write(target.join("sub/nested.txt"), "tree").unwrap();
        target
    }

    fn leftover_artifacts(dir: &TempDir) -> Vec<String> {
        fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != "volume")
            .collect()
    }

    #[test]
    fn staging_failure_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = populate_target(&dir);
        let before = list_tree(&target).unwrap();

        let err = block_on(replace_with(&target, |staging| async move {
            // Partially built staging tree, then failure.
            fs::create_dir_all(&staging).unwrap();
            fs::write(staging.join("half.txt"), "partial").unwrap();
            Err(SyncError::Network("remote went away".to_string()))
        }))
        .unwrap_err();

        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(list_tree(&target).unwrap(), before);
        assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "original");
        assert!(leftover_artifacts(&dir).is_empty());
    }

    #[test]
    fn successful_replace_swaps_content_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let target = populate_target(&dir);

        block_on(replace_with(&target, |staging| async move {
            fs::create_dir_all(&staging).unwrap();
            fs::write(staging.join("fresh.txt"), "new tree").unwrap();
            Ok(())
        }))
        .unwrap();

        assert_eq!(fs::read_to_string(target.join("fresh.txt")).unwrap(), "new tree");
        assert!(!target.join("keep.txt").exists());
        assert!(leftover_artifacts(&dir).is_empty());
    }

    #[test]
    fn swap_failure_restores_original_from_backup() {
        let dir = TempDir::new().unwrap();
        let target = populate_target(&dir);
        let before = list_tree(&target).unwrap();

        let tx = ReplaceTransaction::begin(&target).unwrap();
        let staging = tx.staging_path().to_path_buf();
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("fresh.txt"), "new tree").unwrap();

        // Fault injection: yank the staging tree so the swap rename fails.
        fs::remove_dir_all(&staging).unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, SyncError::Filesystem { .. }));
        assert_eq!(list_tree(&target).unwrap(), before);
        assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "original");
        assert!(leftover_artifacts(&dir).is_empty());
    }

    #[test]
    fn backup_rename_failure_preserves_target() {
        let dir = TempDir::new().unwrap();
        // Target missing entirely: the backup rename cannot succeed.
        let target = dir.path().join("volume");

        let tx = ReplaceTransaction::begin(&target).unwrap();
        let staging = tx.staging_path().to_path_buf();
        fs::create_dir_all(&staging).unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, SyncError::Filesystem { .. }));
        assert!(!staging.exists());
    }

    #[test]
    fn abort_discards_staging() {
        let dir = TempDir::new().unwrap();
        let target = populate_target(&dir);

        let tx = ReplaceTransaction::begin(&target).unwrap();
        let staging = tx.staging_path().to_path_buf();
        fs::create_dir_all(&staging).unwrap();
        tx.abort();

        assert!(!staging.exists());
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn staging_and_backup_are_siblings_of_target() {
        let dir = TempDir::new().unwrap();
        let target = populate_target(&dir);

        let tx = ReplaceTransaction::begin(&target).unwrap();
        assert_eq!(tx.staging_path().parent(), target.parent());
        tx.abort();
    }
}
