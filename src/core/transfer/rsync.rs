//! Delta-sync strategy: retry-bounded `rsync` invocations whose success is
//! judged against an independently computed expected file count, not the
//! tool's exit status alone.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::models::{TransferOutcome, TransferStatus};
use crate::core::transfer::{CommandRunner, TransferService};
use crate::error::{BurError, ParseError, Result};
use crate::tools::remote::probe_remote_path;

const RSYNC_CMD: &str = "rsync";
/// Attempts before a send is declared failed.
pub const RSYNC_ATTEMPTS: u32 = 3;

const RSYNC_MODULE: &str = "rsync://";
const RSYNC_DAEMON_SEGMENT: &str = "/rsyncd";
const BYTES_PER_SEC_MARKER: &str = "bytes/sec";
const SPEEDUP_LABEL: &str = "speedup";

/// Transport for rsync: over an SSH tunnel or against an rsync daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsyncTransport {
    Ssh,
    Daemon,
}

impl RsyncTransport {
    fn args(&self) -> Vec<String> {
        match self {
            RsyncTransport::Ssh => vec!["-ahc".into(), "-e".into(), "ssh".into()],
            RsyncTransport::Daemon => vec!["-ahc".into()],
        }
    }

    /// Daemon destinations swap the host/path separator for a module path
    /// segment: `user@host:/p` -> `rsync://user@host/rsyncd/p`.
    fn rewrite(&self, path: &str) -> String {
        match self {
            RsyncTransport::Ssh => path.to_string(),
            RsyncTransport::Daemon => {
                format!("{}{}", RSYNC_MODULE, path.replace(':', RSYNC_DAEMON_SEGMENT))
            }
        }
    }
}

pub struct RsyncService {
    transport: RsyncTransport,
    attempts: u32,
    runner: Arc<dyn CommandRunner>,
}

impl RsyncService {
    pub fn new(transport: RsyncTransport, attempts: u32, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            transport,
            attempts,
            runner,
        }
    }

    /// Number of files rsync is expected to report as transferred: the
    /// non-directory entries of a source directory, or 1 for a single file.
    pub fn expected_file_count(source: &Path) -> Result<u64> {
        if !source.exists() {
            return Err(BurError::MissingPath(source.to_path_buf()));
        }

        let count = if source.is_dir() {
            let mut n = 0;
            for entry in std::fs::read_dir(source)? {
                if !entry?.file_type()?.is_dir() {
                    n += 1;
                }
            }
            n
        } else {
            1
        };

        if count == 0 {
            return Err(BurError::Validation(format!(
                "there is no file in '{}' to be copied to the remote location",
                source.display()
            )));
        }
        Ok(count)
    }

    /// Parse the `--stats` output of an rsync run.
    ///
    /// Counts come from `number of ...:` lines, the rate from the token
    /// preceding a `bytes/sec` marker, the speedup from its labeled line.
    /// A partial summary is unusable for the transferred-count comparison,
    /// so any missing field fails the parse.
    pub fn parse_output(raw: &str) -> std::result::Result<TransferOutcome, ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError("empty output".to_string()));
        }

        let mut outcome = TransferOutcome::default();

        for line in raw.to_lowercase().lines() {
            if line.contains("number of") {
                let (key, value) = Self::parse_count_line(line)?;
                match key {
                    CountKey::Transferred => outcome.transferred_files = Some(value),
                    CountKey::Deleted => outcome.deleted_files = Some(value),
                    CountKey::Created => outcome.created_files = Some(value),
                    CountKey::Total => outcome.total_files = Some(value),
                }
            } else if line.contains(BYTES_PER_SEC_MARKER) {
                let tokens: Vec<&str> = line.split(' ').collect();
                if let Some(idx) = tokens
                    .iter()
                    .position(|t| t.trim().contains(BYTES_PER_SEC_MARKER))
                {
                    if idx > 0 {
                        outcome.rate = Some(tokens[idx - 1].to_string());
                    }
                }
            } else if let Some(pos) = line.find(SPEEDUP_LABEL) {
                let start = pos + SPEEDUP_LABEL.len() + " is ".len();
                if let Some(value) = line.get(start..) {
                    outcome.speedup = Some(value.trim().to_string());
                }
            }
        }

        for (name, set) in [
            ("number of files", outcome.total_files.is_some()),
            ("created files", outcome.created_files.is_some()),
            ("deleted files", outcome.deleted_files.is_some()),
            ("transferred files", outcome.transferred_files.is_some()),
            ("rate", outcome.rate.is_some()),
            ("speedup", outcome.speedup.is_some()),
        ] {
            if !set {
                return Err(ParseError(format!(
                    "did not find valid '{}' tag in the output",
                    name
                )));
            }
        }

        outcome.status = TransferStatus::Completed;
        Ok(outcome)
    }

    fn parse_count_line(line: &str) -> std::result::Result<(CountKey, u64), ParseError> {
        // Drop any parenthesized qualifier, e.g. "(reg: 3, dir: 1)".
        let line = match line.find('(') {
            Some(pos) => &line[..pos],
            None => line,
        };

        let Some((label, value)) = line.split_once(':') else {
            return Err(ParseError(format!(
                "could not parse rsync output line: {}",
                line
            )));
        };

        let key = if label.contains("transferred") {
            CountKey::Transferred
        } else if label.contains("deleted") {
            CountKey::Deleted
        } else if label.contains("created") {
            CountKey::Created
        } else {
            CountKey::Total
        };

        let value: u64 = value
            .trim()
            .replace(',', "")
            .parse()
            .map_err(|_| ParseError(format!("non-numeric count in line: {}", line)))?;

        Ok((key, value))
    }

    async fn run_rsync(&self, source: &str, destination: &str) -> Result<TransferOutcome> {
        let mut args = self.transport.args();
        args.push("--stats".to_string());
        args.push(source.to_string());
        args.push(destination.to_string());

        let output = self.runner.run(RSYNC_CMD, &args).await?;
        if !output.status.success() {
            return Err(BurError::transfer(
                source,
                format!("rsync exited with {}", output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout, "rsync finished");

        Self::parse_output(&stdout).map_err(|e| BurError::transfer(source, e.to_string()))
    }

    /// Send local files to a remote destination, retrying until the parsed
    /// transferred-count matches the expected count or attempts run out.
    async fn send(&self, source: &str, destination: &str) -> Result<TransferOutcome> {
        let expected = Self::expected_file_count(Path::new(source))?;
        let destination = self.transport.rewrite(destination);

        let mut last_transferred = 0;
        for attempt in 1..=self.attempts {
            info!(source, attempt, "Sending files to remote location");

            let outcome = self.run_rsync(source, &destination).await?;
            let transferred = outcome.transferred_files.unwrap_or(0);

            if transferred == expected {
                return Ok(outcome);
            }

            warn!(
                attempt,
                expected, transferred, "Transferred count mismatch, retrying"
            );
            last_transferred = transferred;
        }

        Err(BurError::transfer(
            source,
            format!(
                "can't transfer file(s) to remote server: tries {}, files to be transferred {}, transferred files {}",
                self.attempts, expected, last_transferred
            ),
        ))
    }

    /// Receive files from a remote source (`user@host:/path`). The remote
    /// path is probed first so a missing source fails fast instead of
    /// burning the retry budget.
    async fn receive(&self, source: &str, destination: &str) -> Result<TransferOutcome> {
        let (host, remote_path) = source.split_once(':').ok_or_else(|| {
            BurError::Validation(format!("invalid remote source path '{}'", source))
        })?;

        if !probe_remote_path(host, remote_path).await? {
            return Err(BurError::transfer(
                source,
                format!("remote file '{}' does not exist", remote_path),
            ));
        }

        let source = self.transport.rewrite(source);
        info!(source = %source, "Receiving files from remote location");
        self.run_rsync(&source, destination).await
    }
}

#[async_trait]
impl TransferService for RsyncService {
    async fn transfer(&self, source: &str, destination: &str) -> Result<TransferOutcome> {
        if source.trim().is_empty() || destination.trim().is_empty() {
            return Err(BurError::Validation("empty transfer input".to_string()));
        }

        // A host-separator token in the source denotes a remote location.
        if source.contains('@') {
            self.receive(source, destination).await
        } else {
            self.send(source, destination).await
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CountKey {
    Total,
    Created,
    Deleted,
    Transferred,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const STATS_OUTPUT: &str = "\
Number of files: 5 (reg: 4, dir: 1)
Number of created files: 1
Number of deleted files: 0
Number of regular files transferred: 1
Total file size: 1.05K bytes
sent 687 bytes  received 119 bytes  537.33 bytes/sec
total size is 1.05K  speedup is 1.30
";

    struct ScriptedRunner {
        stdout: String,
        calls: Mutex<u32>,
    }

    impl ScriptedRunner {
        fn new(stdout: &str) -> Self {
            Self {
                stdout: stdout.to_string(),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _program: &str, _args: &[String]) -> Result<std::process::Output> {
            *self.calls.lock().unwrap() += 1;
            Ok(std::process::Output {
                status: std::process::ExitStatus::default(),
                stdout: self.stdout.clone().into_bytes(),
                stderr: Vec::new(),
            })
        }
    }

    #[test]
    fn parses_full_stats_block() {
        let outcome = RsyncService::parse_output(STATS_OUTPUT).unwrap();
        assert_eq!(outcome.total_files, Some(5));
        assert_eq!(outcome.created_files, Some(1));
        assert_eq!(outcome.deleted_files, Some(0));
        assert_eq!(outcome.transferred_files, Some(1));
        assert_eq!(outcome.rate.as_deref(), Some("537.33"));
        assert_eq!(outcome.speedup.as_deref(), Some("1.30"));
        assert_eq!(outcome.status, TransferStatus::Completed);
    }

    #[test]
    fn missing_required_field_fails_parse() {
        let partial = "Number of files: 5\nNumber of created files: 1\n";
        let err = RsyncService::parse_output(partial).unwrap_err();
        assert!(err.to_string().contains("deleted files"));
    }

    #[test]
    fn empty_output_fails_parse() {
        assert!(RsyncService::parse_output("   \n").is_err());
    }

    #[test]
    fn expected_count_of_directory_ignores_subdirectories() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.cfg"), b"x").unwrap();
        std::fs::write(temp.path().join("b.cfg"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();

        assert_eq!(RsyncService::expected_file_count(temp.path()).unwrap(), 2);
    }

    #[test]
    fn expected_count_of_single_file_is_one() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("artifact.tar.gpg");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(RsyncService::expected_file_count(&file).unwrap(), 1);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            RsyncService::expected_file_count(temp.path()).unwrap_err(),
            BurError::Validation(_)
        ));
    }

    #[test]
    fn daemon_transport_rewrites_destination() {
        let t = RsyncTransport::Daemon;
        assert_eq!(
            t.rewrite("user@10.0.0.1:/backups"),
            "rsync://user@10.0.0.1/rsyncd/backups"
        );
        assert_eq!(RsyncTransport::Ssh.rewrite("user@h:/p"), "user@h:/p");
    }

    #[tokio::test]
    async fn count_mismatch_exhausts_exactly_the_configured_attempts() {
        let temp = tempdir().unwrap();
        // Two files onsite, but the crafted output reports only 1
        // transferred, so every attempt mismatches.
        std::fs::write(temp.path().join("a.cfg"), b"x").unwrap();
        std::fs::write(temp.path().join("b.cfg"), b"x").unwrap();

        let runner = Arc::new(ScriptedRunner::new(STATS_OUTPUT));
        let svc = RsyncService::new(RsyncTransport::Ssh, 3, runner.clone());

        let err = svc
            .transfer(temp.path().to_str().unwrap(), "host:/backups")
            .await
            .unwrap_err();

        assert!(matches!(err, BurError::Transfer { .. }));
        let msg = err.to_string();
        assert!(msg.contains("tries 3"));
        assert!(msg.contains("files to be transferred 2"));
        assert!(msg.contains("transferred files 1"));
        assert_eq!(*runner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn matching_count_succeeds_on_first_attempt() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("artifact.tar.gpg");
        std::fs::write(&file, b"x").unwrap();

        let runner = Arc::new(ScriptedRunner::new(STATS_OUTPUT));
        let svc = RsyncService::new(RsyncTransport::Ssh, 3, runner.clone());

        let outcome = svc
            .transfer(file.to_str().unwrap(), "host:/backups")
            .await
            .unwrap();
        assert_eq!(outcome.transferred_files, Some(1));
        assert_eq!(*runner.calls.lock().unwrap(), 1);
    }
}
