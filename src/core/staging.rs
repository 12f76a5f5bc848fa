//! Scoped ownership of the staging temp directory.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;

/// Exclusively-owned staging directory for one orchestrator run.
///
/// Created before the batch and removed on drop, so cleanup holds on every
/// exit path. No other component is permitted to write into it.
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        info!(path = %self.path.display(), "Deleting the temporary staging folder");
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not remove staging folder");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staging_dir_is_removed_on_drop() {
        let temp = tempdir().unwrap();
        let staging_path = temp.path().join("bur_tmp");

        {
            let staging = StagingDir::create(&staging_path).unwrap();
            std::fs::write(staging.path().join("partial.tar"), b"x").unwrap();
            assert!(staging_path.exists());
        }

        assert!(!staging_path.exists());
    }
}
