//! Bulk copy strategy: a single `azcopy` invocation with no internal retry.
//!
//! Success is decided solely by the parsed `Final Job Status` field being
//! `Completed`; an explicit failure line in the output short-circuits
//! parsing entirely.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use crate::core::models::{TransferOutcome, TransferStatus};
use crate::core::transfer::{CommandRunner, TransferService};
use crate::error::{BurError, ParseError, Result};

const AZCOPY_CMD: &str = "azcopy";
const FAILURE_MARKER: &str = "failed to";
const COMPLETED_STATUS: &str = "Completed";

/// Labeled fields extracted from azcopy's text output.
const FIELD_ELAPSED: &str = "Elapsed Time (Minutes)";
const FIELD_TOTAL: &str = "Total Number Of Transfers";
const FIELD_COMPLETED: &str = "Number of Transfers Completed";
const FIELD_FAILED: &str = "Number of Transfers Failed";
const FIELD_SKIPPED: &str = "Number of Transfers Skipped";
const FIELD_BYTES: &str = "TotalBytesTransferred";
const FIELD_STATUS: &str = "Final Job Status";

pub struct AzCopyService {
    sas_token: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl AzCopyService {
    pub fn new(sas_token: Option<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { sas_token, runner }
    }

    fn is_url(path: &str) -> bool {
        // Compile-time constant pattern, cannot fail.
        let re = Regex::new(r"https?://\S+").unwrap();
        re.is_match(path)
    }

    /// Append the SAS token to whichever side addresses the object store.
    /// The artifact's base name is carried over into the destination.
    fn resolve_endpoints(&self, source: &str, destination: &str) -> Result<(String, String)> {
        let token = self.sas_token.as_deref().unwrap_or_default();

        let file_name = source.rsplit('/').next().unwrap_or(source);
        let destination_file = format!("{}/{}", destination.trim_end_matches('/'), file_name);

        if Self::is_url(destination) {
            Ok((source.to_string(), format!("{}{}", destination_file, token)))
        } else if Self::is_url(source) {
            Ok((format!("{}{}", source, token), destination_file))
        } else {
            Err(BurError::Validation(
                "neither source nor destination is an object store URL".to_string(),
            ))
        }
    }

    /// Parse azcopy's labeled-field block.
    ///
    /// Any line containing the failure marker bypasses field extraction and
    /// becomes the outcome's error text. Fields not found stay unset; only
    /// the caller's terminal-status check decides success.
    pub fn parse_output(raw: &str) -> TransferOutcome {
        let mut outcome = TransferOutcome::default();

        for line in raw.lines() {
            if line.contains(FAILURE_MARKER) {
                outcome.error = Some(line.trim().to_string());
                outcome.status = TransferStatus::Failed;
                return outcome;
            }

            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            if label.contains(FIELD_ELAPSED) {
                outcome.elapsed = Some(value.to_string());
            } else if label.contains(FIELD_COMPLETED) {
                outcome.transferred_files = value.parse().ok();
            } else if label.contains(FIELD_FAILED) {
                outcome.failed_files = value.parse().ok();
            } else if label.contains(FIELD_SKIPPED) {
                outcome.skipped_files = value.parse().ok();
            } else if label.contains(FIELD_TOTAL) {
                outcome.total_files = value.parse().ok();
            } else if label.contains(FIELD_BYTES) {
                outcome.total_bytes = value.parse().ok();
            } else if label.contains(FIELD_STATUS) {
                outcome.status = if value == COMPLETED_STATUS {
                    TransferStatus::Completed
                } else {
                    TransferStatus::Failed
                };
            }
        }

        outcome
    }
}

#[async_trait]
impl TransferService for AzCopyService {
    async fn transfer(&self, source: &str, destination: &str) -> Result<TransferOutcome> {
        if source.trim().is_empty() || destination.trim().is_empty() {
            return Err(BurError::Validation("empty transfer input".to_string()));
        }

        let (src, dst) = self.resolve_endpoints(source, destination)?;

        info!(source, destination, "Transferring via azcopy");

        let args = vec![
            "copy".to_string(),
            src,
            dst,
            "--output-type".to_string(),
            "text".to_string(),
        ];
        let output = self.runner.run(AZCOPY_CMD, &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout, "azcopy finished");

        let outcome = Self::parse_output(&stdout);

        if outcome.status != TransferStatus::Completed {
            let reason = outcome
                .error
                .clone()
                .map(|e| ParseError(e).to_string())
                .unwrap_or_else(|| "final job status was not 'Completed'".to_string());
            return Err(BurError::transfer(source, reason));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const SAMPLE_OUTPUT: &str = "\
Job 6b3c4a21 summary
Elapsed Time (Minutes): 0.1002
Total Number Of Transfers: 1
Number of Transfers Completed: 1
Number of Transfers Failed: 0
Number of Transfers Skipped: 0
TotalBytesTransferred: 524288
Final Job Status: Completed
";

    struct ScriptedRunner {
        outputs: Mutex<Vec<String>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<&str>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into_iter().rev().map(str::to_string).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _program: &str, args: &[String]) -> Result<std::process::Output> {
            self.calls.lock().unwrap().push(args.to_vec());
            let stdout = self.outputs.lock().unwrap().pop().unwrap_or_default();
            Ok(std::process::Output {
                status: std::process::ExitStatus::default(),
                stdout: stdout.into_bytes(),
                stderr: Vec::new(),
            })
        }
    }

    #[test]
    fn parses_all_labeled_fields() {
        let outcome = AzCopyService::parse_output(SAMPLE_OUTPUT);
        assert_eq!(outcome.status, TransferStatus::Completed);
        assert_eq!(outcome.elapsed.as_deref(), Some("0.1002"));
        assert_eq!(outcome.total_files, Some(1));
        assert_eq!(outcome.transferred_files, Some(1));
        assert_eq!(outcome.failed_files, Some(0));
        assert_eq!(outcome.skipped_files, Some(0));
        assert_eq!(outcome.total_bytes, Some(524288));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn failure_line_short_circuits_field_extraction() {
        let raw = "INFO: scanning\nfailed to perform copy command due to error: auth expired\nFinal Job Status: Completed\n";
        let outcome = AzCopyService::parse_output(raw);
        assert_eq!(outcome.status, TransferStatus::Failed);
        assert!(outcome.error.unwrap().contains("auth expired"));
        // Fields after the failure line are never read.
        assert!(outcome.elapsed.is_none());
    }

    #[test]
    fn missing_fields_stay_unset_without_error() {
        let outcome = AzCopyService::parse_output("Final Job Status: Completed\n");
        assert_eq!(outcome.status, TransferStatus::Completed);
        assert!(outcome.total_files.is_none());
    }

    #[tokio::test]
    async fn non_completed_status_is_a_transfer_error() {
        let runner = Arc::new(ScriptedRunner::new(vec!["Final Job Status: Cancelled\n"]));
        let svc = AzCopyService::new(Some("?sv=token".to_string()), runner.clone());

        let err = svc
            .transfer("/tmp/b.tar.gpg", "https://acct.blob.core.windows.net/backups")
            .await
            .unwrap_err();
        assert!(matches!(err, BurError::Transfer { .. }));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sas_token_is_appended_to_url_destination() {
        let runner = Arc::new(ScriptedRunner::new(vec![SAMPLE_OUTPUT]));
        let svc = AzCopyService::new(Some("?sv=token".to_string()), runner.clone());

        svc.transfer(
            "/staging/b.tar.gpg",
            "https://acct.blob.core.windows.net/backups",
        )
        .await
        .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0][0], "copy");
        assert_eq!(calls[0][1], "/staging/b.tar.gpg");
        assert_eq!(
            calls[0][2],
            "https://acct.blob.core.windows.net/backups/b.tar.gpg?sv=token"
        );
        assert_eq!(&calls[0][3..], &["--output-type", "text"]);
    }

    #[tokio::test]
    async fn rejects_transfer_with_no_url_side() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let svc = AzCopyService::new(None, runner);
        let err = svc.transfer("/a", "/b").await.unwrap_err();
        assert!(matches!(err, BurError::Validation(_)));
    }
}
