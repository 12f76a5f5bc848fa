//! Discovery of candidate backups, onsite and offsite.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::core::models::BackupUnit;
use crate::error::{BurError, Result};
use crate::tools::RemoteShell;

/// Minimum number of entries a backup directory must contain to be
/// considered a complete backup. Inherited policy constant; override via
/// [`BackupCatalog::with_min_files`].
pub const MIN_BACKUP_FILES: usize = 3;

pub struct BackupCatalog {
    min_backup_files: usize,
}

impl Default for BackupCatalog {
    fn default() -> Self {
        Self {
            min_backup_files: MIN_BACKUP_FILES,
        }
    }
}

impl BackupCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_files(min_backup_files: usize) -> Self {
        Self { min_backup_files }
    }

    /// List valid backup directories under `backups_path`, sorted by
    /// modification time with the **oldest first**.
    ///
    /// Upload order is deliberately the reverse of listing order: an
    /// interrupted run resumes with the next-oldest unprocessed backup on
    /// the following invocation instead of re-racing for the newest.
    ///
    /// A missing or unreadable root is non-fatal and yields an empty list;
    /// a root that exists but contains no subdirectories at all is a hard
    /// failure.
    pub fn list_onsite(&self, backups_path: &Path) -> Result<Vec<BackupUnit>> {
        if !backups_path.exists() {
            warn!(path = %backups_path.display(), "Invalid backup source path");
            return Ok(Vec::new());
        }

        info!(path = %backups_path.display(), "Getting the list of valid backups");

        let mut subdirs = Vec::new();
        for entry in fs::read_dir(backups_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                subdirs.push(entry.path());
            }
        }

        if subdirs.is_empty() {
            return Err(BurError::Validation(format!(
                "no backup directories were found for the provided path: '{}'",
                backups_path.display()
            )));
        }

        let mut units = Vec::new();
        for dir in subdirs {
            let entries = fs::read_dir(&dir)?.count();
            if entries < self.min_backup_files {
                warn!(
                    backup = %dir.display(),
                    entries,
                    "Skipped backup with fewer than {} files", self.min_backup_files
                );
                continue;
            }

            let tag = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let modified = fs::metadata(&dir)?.modified()?;

            info!(backup = %dir.display(), "Added backup to list of valid backups");
            units.push(BackupUnit {
                tag,
                source: dir,
                modified,
            });
        }

        units.sort_by_key(|u| u.modified);
        Ok(units)
    }

    /// List every backup directory name under `backups_path`, newest
    /// first, with no completeness filter. Retention counts every
    /// directory, including partial backups.
    pub fn list_onsite_tags_newest_first(&self, backups_path: &Path) -> Result<Vec<String>> {
        if !backups_path.exists() {
            warn!(path = %backups_path.display(), "Invalid backup source path");
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(backups_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let modified = entry.metadata()?.modified()?;
                dirs.push((entry.file_name().to_string_lossy().into_owned(), modified));
            }
        }

        dirs.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(dirs.into_iter().map(|(tag, _)| tag).collect())
    }

    /// List processed artifacts available offsite. The remote listing is
    /// already newest-first; the order is preserved so callers can take the
    /// first element as "most recent".
    pub async fn list_offsite(
        &self,
        shell: &dyn RemoteShell,
        root_path: &str,
    ) -> Result<Vec<String>> {
        info!(path = %root_path, "Looking for backups on offsite");
        shell.list_artifacts_newest_first(root_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;

    fn make_backup(root: &Path, tag: &str, files: usize, mtime_secs: i64) {
        let dir = root.join(tag);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..files {
            std::fs::write(dir.join(format!("file{}.cfg", i)), b"data").unwrap();
        }
        set_file_mtime(&dir, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    #[test]
    fn missing_root_is_empty_not_error() {
        let catalog = BackupCatalog::new();
        let units = catalog.list_onsite(Path::new("/does/not/exist")).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn root_without_subdirectories_is_hard_failure() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("stray.log"), b"x").unwrap();

        let err = BackupCatalog::new().list_onsite(temp.path()).unwrap_err();
        assert!(matches!(err, BurError::Validation(_)));
    }

    #[test]
    fn backups_with_fewer_than_three_files_are_excluded() {
        let temp = tempdir().unwrap();
        make_backup(temp.path(), "complete", 3, 1_000);
        make_backup(temp.path(), "partial", 2, 2_000);

        let units = BackupCatalog::new().list_onsite(temp.path()).unwrap();
        let tags: Vec<_> = units.iter().map(|u| u.tag.as_str()).collect();
        assert_eq!(tags, vec!["complete"]);
    }

    #[test]
    fn onsite_listing_is_oldest_first() {
        let temp = tempdir().unwrap();
        make_backup(temp.path(), "b", 3, 2_000);
        make_backup(temp.path(), "c", 3, 3_000);
        make_backup(temp.path(), "a", 3, 1_000);

        let units = BackupCatalog::new().list_onsite(temp.path()).unwrap();
        let tags: Vec<_> = units.iter().map(|u| u.tag.as_str()).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn retention_listing_is_newest_first_and_unfiltered() {
        let temp = tempdir().unwrap();
        make_backup(temp.path(), "old", 3, 1_000);
        make_backup(temp.path(), "partial", 1, 2_000);
        make_backup(temp.path(), "new", 3, 3_000);

        let tags = BackupCatalog::new()
            .list_onsite_tags_newest_first(temp.path())
            .unwrap();
        assert_eq!(tags, vec!["new", "partial", "old"]);
    }

    #[test]
    fn min_files_threshold_is_overridable() {
        let temp = tempdir().unwrap();
        make_backup(temp.path(), "tiny", 1, 1_000);

        let units = BackupCatalog::with_min_files(1)
            .list_onsite(temp.path())
            .unwrap();
        assert_eq!(units.len(), 1);
    }
}
