//! Encryption collaborator, delegating to the system `gpg` tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::models::GPG_SUFFIX;
use crate::error::{BurError, Result};

const GPG_CMD: &str = "gpg";

#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Encrypt `file` into `dest_dir`; the output is named `<name>.gpg`.
    async fn encrypt(&self, file: &Path, dest_dir: &Path) -> Result<PathBuf>;

    /// Decrypt `file` alongside itself, optionally deleting the encrypted
    /// original. Rejects paths lacking the `.gpg` suffix.
    async fn decrypt(&self, file: &Path, remove_original: bool) -> Result<PathBuf>;
}

/// `gpg`-backed [`Encryptor`] using a recipient key configured by email.
pub struct GpgEncryptor {
    recipient: String,
}

impl GpgEncryptor {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }

    async fn run_gpg(args: &[&str]) -> Result<()> {
        debug!(?args, "Running gpg");
        let status = Command::new(GPG_CMD)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| BurError::Tool {
                tool: "gpg",
                reason: format!("failed to spawn: {}", e),
            })?;

        if !status.success() {
            return Err(BurError::Tool {
                tool: "gpg",
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Encryptor for GpgEncryptor {
    async fn encrypt(&self, file: &Path, dest_dir: &Path) -> Result<PathBuf> {
        if !file.exists() {
            return Err(BurError::MissingPath(file.to_path_buf()));
        }

        let name = file
            .file_name()
            .ok_or_else(|| BurError::Validation(format!("invalid path '{}'", file.display())))?;
        let output = dest_dir.join(format!("{}{}", name.to_string_lossy(), GPG_SUFFIX));

        info!(file = %file.display(), "Encrypting file");

        let output_str = output.to_string_lossy().into_owned();
        let file_str = file.to_string_lossy().into_owned();
        Self::run_gpg(&[
            "--output",
            &output_str,
            "-r",
            &self.recipient,
            "--cipher-algo",
            "AES256",
            "--compress-algo",
            "none",
            "--encrypt",
            &file_str,
        ])
        .await?;

        Ok(output)
    }

    async fn decrypt(&self, file: &Path, remove_original: bool) -> Result<PathBuf> {
        let file_str = file.to_string_lossy().into_owned();

        let plain_str = file_str.strip_suffix(GPG_SUFFIX).ok_or_else(|| {
            BurError::Validation(format!(
                "'{}' is not a valid GPG encrypted file",
                file.display()
            ))
        })?;

        if !file.exists() {
            return Err(BurError::MissingPath(file.to_path_buf()));
        }
        if file.is_dir() {
            return Err(BurError::Validation(format!(
                "'{}' is a directory",
                file.display()
            )));
        }

        info!(file = %file.display(), "Decrypting file");

        Self::run_gpg(&["--output", plain_str, "--decrypt", &file_str]).await?;

        if remove_original {
            debug!(file = %file.display(), "Removing encrypted original");
            tokio::fs::remove_file(file).await?;
        }

        Ok(PathBuf::from(plain_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrypt_rejects_path_without_gpg_suffix() {
        let enc = GpgEncryptor::new("backup@example.com");
        let err = enc
            .decrypt(Path::new("/tmp/backup.tar"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BurError::Validation(_)));
    }
}
