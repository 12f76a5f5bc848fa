//! Archiving collaborator, delegating to the system `tar` tool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{BurError, Result};

const TAR_CMD: &str = "tar";

/// How a source tree is packed before encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// No archiving; the source (a single file) is copied as-is.
    None,
    /// Plain tar, no compression. The upload pipeline uses this.
    Tar,
    /// Tar with gzip compression.
    TarGzip,
}

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Pack `source` into `dest_dir`, returning the archive path.
    async fn archive(&self, source: &Path, dest_dir: &Path, mode: ArchiveMode) -> Result<PathBuf>;

    /// Unpack `archive` into `dest_dir`, optionally deleting the archive
    /// afterwards. Returns the extracted path.
    async fn extract(&self, archive: &Path, dest_dir: &Path, remove_archive: bool)
        -> Result<PathBuf>;
}

pub struct TarArchiver;

impl TarArchiver {
    fn base_name(path: &Path) -> Result<String> {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BurError::Validation(format!("invalid path '{}'", path.display())))
    }

    async fn run_tar(args: &[&str]) -> Result<()> {
        debug!(?args, "Running tar");
        let status = Command::new(TAR_CMD)
            .args(args)
            .status()
            .await
            .map_err(|e| BurError::Tool {
                tool: "tar",
                reason: format!("failed to spawn: {}", e),
            })?;

        if !status.success() {
            return Err(BurError::Tool {
                tool: "tar",
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn archive(&self, source: &Path, dest_dir: &Path, mode: ArchiveMode) -> Result<PathBuf> {
        if !source.exists() {
            return Err(BurError::MissingPath(source.to_path_buf()));
        }
        if !dest_dir.exists() {
            return Err(BurError::MissingPath(dest_dir.to_path_buf()));
        }

        let base = Self::base_name(source)?;

        match mode {
            ArchiveMode::None => {
                if source.is_dir() {
                    return Err(BurError::Validation(format!(
                        "mode 'none' requires a single file, got directory '{}'",
                        source.display()
                    )));
                }
                let out = dest_dir.join(&base);
                tokio::fs::copy(source, &out).await?;
                Ok(out)
            }
            ArchiveMode::Tar | ArchiveMode::TarGzip => {
                let (suffix, flags) = match mode {
                    ArchiveMode::TarGzip => ("tar.gz", "-czf"),
                    _ => ("tar", "-cf"),
                };
                let out = dest_dir.join(format!("{}.{}", base, suffix));
                let parent = source
                    .parent()
                    .ok_or_else(|| {
                        BurError::Validation(format!("invalid path '{}'", source.display()))
                    })?
                    .to_string_lossy()
                    .into_owned();
                let out_str = out.to_string_lossy().into_owned();

                Self::run_tar(&[flags, &out_str, "-C", &parent, &base]).await?;
                Ok(out)
            }
        }
    }

    async fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        remove_archive: bool,
    ) -> Result<PathBuf> {
        if !archive.exists() {
            return Err(BurError::MissingPath(archive.to_path_buf()));
        }
        if !dest_dir.exists() {
            return Err(BurError::MissingPath(dest_dir.to_path_buf()));
        }

        let base = Self::base_name(archive)?;
        let (stripped, flags) = if let Some(s) = base.strip_suffix(".tar.gz") {
            (s, "-xzf")
        } else if let Some(s) = base.strip_suffix(".tar") {
            (s, "-xf")
        } else {
            return Err(BurError::Validation(format!(
                "unsupported archive format '{}', expected .tar or .tar.gz",
                archive.display()
            )));
        };

        let dest_str = dest_dir.to_string_lossy().into_owned();
        let archive_str = archive.to_string_lossy().into_owned();
        Self::run_tar(&["-C", &dest_str, flags, &archive_str]).await?;

        if remove_archive {
            tokio::fs::remove_file(archive).await?;
        }

        Ok(dest_dir.join(stripped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn archive_then_extract_round_trips_directory_content() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("backup_2024-05-01");
        std::fs::create_dir_all(source.join("configs")).unwrap();
        std::fs::write(source.join("router.cfg"), b"interface eth0").unwrap();
        std::fs::write(source.join("configs/switch.cfg"), b"vlan 10").unwrap();

        let staging = temp.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();

        let archiver = TarArchiver;
        let archive = archiver
            .archive(&source, &staging, ArchiveMode::Tar)
            .await
            .unwrap();
        assert_eq!(
            archive.file_name().unwrap().to_str().unwrap(),
            "backup_2024-05-01.tar"
        );

        let out = temp.path().join("restored");
        std::fs::create_dir_all(&out).unwrap();
        let extracted = archiver.extract(&archive, &out, true).await.unwrap();

        assert!(!archive.exists(), "archive should be removed after extract");
        assert_eq!(
            std::fs::read(extracted.join("router.cfg")).unwrap(),
            b"interface eth0"
        );
        assert_eq!(
            std::fs::read(extracted.join("configs/switch.cfg")).unwrap(),
            b"vlan 10"
        );
    }

    #[tokio::test]
    async fn archive_missing_source_fails() {
        let temp = tempdir().unwrap();
        let err = TarArchiver
            .archive(&temp.path().join("nope"), temp.path(), ArchiveMode::Tar)
            .await
            .unwrap_err();
        assert!(matches!(err, BurError::MissingPath(_)));
    }

    #[tokio::test]
    async fn extract_rejects_unknown_suffix() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("backup.zip");
        std::fs::write(&file, b"not a tar").unwrap();

        let err = TarArchiver
            .extract(&file, temp.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BurError::Validation(_)));
    }
}
