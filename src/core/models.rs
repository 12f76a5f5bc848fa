use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Suffix of a fully processed (archived + encrypted) backup artifact.
/// Offsite listings filter strictly on this suffix.
pub const PROCESSED_SUFFIX: &str = ".tar.gpg";

pub const GPG_SUFFIX: &str = ".gpg";

/// One dated backup directory discovered onsite.
///
/// Identity is the directory base name (`tag`). Immutable once read; the
/// filesystem remains the source of truth.
#[derive(Debug, Clone)]
pub struct BackupUnit {
    pub tag: String,
    pub source: PathBuf,
    pub modified: SystemTime,
}

/// A backup unit after the archive -> encrypt pipeline.
#[derive(Debug)]
pub struct ProcessedArtifact {
    pub path: PathBuf,
    pub tag: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Failed,
    Unknown,
}

/// Typed summary of a transfer tool run, derived purely from its stdout
/// and never mutated after creation.
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub total_files: Option<u64>,
    pub created_files: Option<u64>,
    pub deleted_files: Option<u64>,
    pub transferred_files: Option<u64>,
    pub failed_files: Option<u64>,
    pub skipped_files: Option<u64>,
    pub total_bytes: Option<u64>,
    pub elapsed: Option<String>,
    pub rate: Option<String>,
    pub speedup: Option<String>,
    pub status: TransferStatus,
    pub error: Option<String>,
}

impl Default for TransferStatus {
    fn default() -> Self {
        TransferStatus::Unknown
    }
}

/// Disjoint partition produced by applying a retention policy.
///
/// `removed` only contains targets whose deletion was re-verified by an
/// existence check. Both halves are always reported together.
#[derive(Debug, Default)]
pub struct RetentionOutcome {
    pub removed: Vec<String>,
    pub not_removed: Vec<String>,
}

impl RetentionOutcome {
    pub fn is_clean(&self) -> bool {
        self.not_removed.is_empty()
    }
}

/// Caller-facing result of one orchestrator phase (upload, download,
/// retention). Suitable for logging and alerting; a single failed unit
/// never crashes the run.
#[derive(Debug)]
pub struct PhaseReport {
    pub success: bool,
    pub message: String,
    pub tags: Vec<String>,
}

impl PhaseReport {
    pub fn ok(message: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            tags,
        }
    }

    pub fn failed(message: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            tags,
        }
    }
}
