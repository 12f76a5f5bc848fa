//! The archive -> encrypt pipeline for a single backup unit.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::core::models::{BackupUnit, ProcessedArtifact};
use crate::error::{BurError, Result};
use crate::tools::{ArchiveMode, Archiver, Encryptor};

/// Drives the two-stage processing pipeline. Stages are strictly ordered
/// and non-retractable once started; staging-directory lifetime belongs to
/// the orchestrator, not to this component.
pub struct BackupProcessor {
    archiver: Arc<dyn Archiver>,
    encryptor: Arc<dyn Encryptor>,
}

impl BackupProcessor {
    pub fn new(archiver: Arc<dyn Archiver>, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            archiver,
            encryptor,
        }
    }

    /// Archive the unit's source tree into `staging_dir`, then encrypt the
    /// archive in place. The encrypted artifact is the unit's final
    /// processed form.
    pub async fn process(&self, unit: &BackupUnit, staging_dir: &Path) -> Result<ProcessedArtifact> {
        let started = Instant::now();

        info!(backup = %unit.source.display(), "Archiving backup directory");
        let archive = self
            .archiver
            .archive(&unit.source, staging_dir, ArchiveMode::Tar)
            .await
            .map_err(|e| BurError::processing(&unit.tag, e.to_string()))?;
        info!(archive = %archive.display(), "Backup archived successfully");

        info!(archive = %archive.display(), "Encrypting backup archive");
        let encrypted = self
            .encryptor
            .encrypt(&archive, staging_dir)
            .await
            .map_err(|e| BurError::processing(&unit.tag, e.to_string()))?;
        info!(artifact = %encrypted.display(), "Backup encrypted successfully");

        Ok(ProcessedArtifact {
            path: encrypted,
            tag: unit.tag.clone(),
            duration: started.elapsed(),
        })
    }

    /// Decrypt a downloaded artifact in place, deleting the encrypted file
    /// on success. Returns the path of the plaintext archive.
    pub async fn decrypt_artifact(&self, artifact: &Path) -> Result<std::path::PathBuf> {
        info!(artifact = %artifact.display(), "Decrypting backup artifact");
        let archive = self.encryptor.decrypt(artifact, true).await?;
        info!(archive = %archive.display(), "Backup decrypted successfully");
        Ok(archive)
    }

    /// Unpack a decrypted archive into `destination`, deleting the archive
    /// on success. Returns the path of the restored backup directory.
    pub async fn extract_archive(
        &self,
        archive: &Path,
        destination: &Path,
    ) -> Result<std::path::PathBuf> {
        info!(archive = %archive.display(), "Extracting backup archive");
        let extracted = self.archiver.extract(archive, destination, true).await?;
        info!(backup = %extracted.display(), "Backup extracted successfully");
        Ok(extracted)
    }
}
