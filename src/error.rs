use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, BurError>;

/// Process exit codes, stable across releases so supervisors and alert
/// rules can key on them.
pub mod exit_code {
    pub const INVALID_INPUT: i32 = 2;
    pub const FAILED_UPLOAD: i32 = 3;
    pub const FAILED_DOWNLOAD: i32 = 4;
    pub const FAILED_OFFSITE_CLEANUP: i32 = 5;
}

/// Error taxonomy for the backup lifecycle.
///
/// `Validation` aborts a run before any remote interaction. `Processing` and
/// `Transfer` are scoped to a single backup unit and are collected per batch.
/// `Retention` failures are reported but never abort the run. `ProbeTimeout`
/// is a hard negative: an unresponsive remote shell is never interpreted as
/// "path does not exist".
#[derive(Debug, thiserror::Error)]
pub enum BurError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("failed to process backup '{tag}': {reason}")]
    Processing { tag: String, reason: String },

    #[error("transfer of '{subject}' failed: {reason}")]
    Transfer { subject: String, reason: String },

    #[error("retention failed, backups not removed: {not_removed:?}")]
    Retention { not_removed: Vec<String> },

    #[error("remote shell on '{host}' timed out after {timeout_secs}s")]
    ProbeTimeout { host: String, timeout_secs: u64 },

    #[error("external tool '{tool}' failed: {reason}")]
    Tool { tool: &'static str, reason: String },

    #[error("path '{0}' does not exist")]
    MissingPath(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to extract the required fields from a transfer tool's output.
///
/// Never crosses a `TransferService` boundary: both strategies wrap it into
/// `BurError::Transfer` before returning.
#[derive(Debug, thiserror::Error)]
#[error("could not parse transfer output: {0}")]
pub struct ParseError(pub String);

impl BurError {
    pub fn transfer(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        BurError::Transfer {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn processing(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        BurError::Processing {
            tag: tag.into(),
            reason: reason.into(),
        }
    }
}
