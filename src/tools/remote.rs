//! Remote shell access to the offsite host.
//!
//! All operations run over a single `ssh <host> bash` session fed through
//! stdin, bounded by a hard per-call timeout so a hung session can never
//! stall a run indefinitely.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::core::models::PROCESSED_SUFFIX;
use crate::error::{BurError, Result};

/// Default timeout for a remote shell call, in seconds.
pub const REMOTE_TIMEOUT_SECS: u64 = 120;

/// Marker echoed by the remote probe scripts when a path is present.
const PATH_AVAILABLE_MARKER: &str = "DIR_IS_AVAILABLE";

/// Probe and mutation operations against the offsite host.
///
/// The host is bound at construction; callers operate on remote paths only.
/// Implementations must distinguish "path is absent" from "could not check":
/// the latter is always an error, never a `false`.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// File-or-directory existence test.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create a directory, succeeding if it already exists.
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Issue a recursive removal for every path in one session. Deletion is
    /// not verified here; callers re-check with [`RemoteShell::exists`].
    async fn remove_paths(&self, paths: &[String]) -> Result<()>;

    /// List entries of a remote directory, newest first, filtered to
    /// processed backup artifacts.
    async fn list_artifacts_newest_first(&self, path: &str) -> Result<Vec<String>>;
}

/// `ssh`-backed [`RemoteShell`] implementation.
pub struct SshShell {
    host: String,
    timeout: Duration,
}

impl SshShell {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timeout: Duration::from_secs(REMOTE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }

    /// Run a script on the remote host, returning (stdout, stderr).
    async fn run_script(&self, script: &str) -> Result<(String, String)> {
        if self.host.trim().is_empty() || script.trim().is_empty() {
            return Err(BurError::Validation(
                "empty host or remote command".to_string(),
            ));
        }

        debug!(host = %self.host, "Running remote script");

        let mut child = Command::new("ssh")
            .arg("-o")
            .arg("LogLevel=ERROR")
            .arg(&self.host)
            .arg("bash")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BurError::Tool {
                tool: "ssh",
                reason: format!("failed to spawn: {}", e),
            })?;

        let mut stdin = child.stdin.take().ok_or(BurError::Tool {
            tool: "ssh",
            reason: "failed to open stdin".to_string(),
        })?;
        stdin.write_all(script.as_bytes()).await?;
        drop(stdin);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BurError::ProbeTimeout {
                host: self.host.clone(),
                timeout_secs: self.timeout.as_secs(),
            })??;

        Ok((
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exists(&self, path: &str) -> Result<bool> {
        if path.trim().is_empty() {
            return Ok(false);
        }

        let script = format!(
            "if [ -d {p} ] || [ -f {p} ]; then echo \"{m}\"; fi\n",
            p = path,
            m = PATH_AVAILABLE_MARKER
        );

        let (stdout, _) = self.run_script(&script).await?;
        Ok(stdout.trim() == PATH_AVAILABLE_MARKER)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let script = format!(
            "if [ -d {p} ]; then echo \"{m}\"; else mkdir -p {p} && \
             if [ -d {p} ]; then echo \"{m}\"; fi; fi\n",
            p = path,
            m = PATH_AVAILABLE_MARKER
        );

        let (stdout, stderr) = self.run_script(&script).await?;

        if !stderr.trim().is_empty() || stdout.trim() != PATH_AVAILABLE_MARKER {
            return Err(BurError::Tool {
                tool: "ssh",
                reason: format!("could not create remote directory '{}': {}", path, stderr),
            });
        }
        Ok(())
    }

    async fn remove_paths(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Err(BurError::Validation("empty removal list".to_string()));
        }

        let mut script = String::new();
        for path in paths {
            script.push_str(&format!("rm -rf {}\n", path.trim()));
        }

        let (_, stderr) = self.run_script(&script).await?;
        if !stderr.trim().is_empty() {
            return Err(BurError::Tool {
                tool: "ssh",
                reason: format!("remote removal failed: {}", stderr.trim()),
            });
        }
        Ok(())
    }

    async fn list_artifacts_newest_first(&self, path: &str) -> Result<Vec<String>> {
        let script = format!("ls -t -1 {}\n", path);
        let (stdout, _) = self.run_script(&script).await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.ends_with(PROCESSED_SUFFIX))
            .map(str::to_string)
            .collect())
    }
}

/// One-off existence probe against an arbitrary host, used by the transfer
/// layer to fast-fail a receive whose remote source is gone.
pub async fn probe_remote_path(host: &str, path: &str) -> Result<bool> {
    SshShell::new(host).exists(path).await
}
