//! Retention policy: which backups to keep, and verified pruning of the
//! rest, on both ends of the pipeline.

use std::path::Path;

use tracing::{info, warn};

use crate::core::models::RetentionOutcome;
use crate::error::Result;
use crate::tools::RemoteShell;

pub struct RetentionPolicy {
    keep_count: usize,
}

impl RetentionPolicy {
    pub fn new(keep_count: usize) -> Self {
        Self { keep_count }
    }

    /// Compute the prune set from a tag list sorted **newest first**: the
    /// suffix beyond `keep_count`. The first `keep_count` entries are kept.
    pub fn prune_set(&self, sorted_tags: &[String]) -> Vec<String> {
        let found = sorted_tags.len();
        let log_message = format!(
            "{} backup(s) found. Retention is {}.",
            found, self.keep_count
        );

        if found > self.keep_count {
            info!(
                "{} {} backups should be removed.",
                log_message,
                found - self.keep_count
            );
            sorted_tags[self.keep_count..].to_vec()
        } else {
            warn!("{} Nothing to do.", log_message);
            Vec::new()
        }
    }

    /// Delete the given artifacts from the offsite root and re-verify each
    /// deletion with an independent existence probe. A delete is only
    /// counted as removed when the post-condition holds.
    pub async fn apply_offsite(
        &self,
        shell: &dyn RemoteShell,
        remote_root: &str,
        tags_to_remove: &[String],
    ) -> Result<RetentionOutcome> {
        if tags_to_remove.is_empty() {
            return Ok(RetentionOutcome::default());
        }

        let paths: Vec<String> = tags_to_remove
            .iter()
            .map(|tag| format!("{}/{}", remote_root, tag))
            .collect();

        shell.remove_paths(&paths).await?;

        let mut outcome = RetentionOutcome::default();
        for (tag, path) in tags_to_remove.iter().zip(&paths) {
            if shell.exists(path).await? {
                outcome.not_removed.push(tag.clone());
            } else {
                outcome.removed.push(tag.clone());
            }
        }
        Ok(outcome)
    }

    /// Delete the given backup directories under `backups_path` and
    /// re-verify each deletion. Partial failure is a valid outcome: some
    /// targets may be removed while others are reported by name.
    pub async fn apply_onsite(
        &self,
        backups_path: &Path,
        tags_to_remove: &[String],
    ) -> Result<RetentionOutcome> {
        let mut outcome = RetentionOutcome::default();

        for tag in tags_to_remove {
            let target = backups_path.join(tag);

            if target.is_dir() {
                if let Err(e) = tokio::fs::remove_dir_all(&target).await {
                    warn!(target = %target.display(), error = %e, "Could not remove backup");
                }
            } else if target.is_file() {
                if let Err(e) = tokio::fs::remove_file(&target).await {
                    warn!(target = %target.display(), error = %e, "Could not remove backup");
                }
            }

            // Deletion counts only when the path is verifiably gone.
            if target.exists() {
                outcome.not_removed.push(tag.clone());
            } else {
                outcome.removed.push(tag.clone());
            }
        }
        Ok(outcome)
    }
}
