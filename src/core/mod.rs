pub mod catalog;
pub mod dedup;
pub mod models;
pub mod orchestrator;
pub mod processor;
pub mod retention;
pub mod staging;
pub mod transfer;
pub mod watchdog;

pub use catalog::BackupCatalog;
pub use models::{BackupUnit, PhaseReport, ProcessedArtifact, TransferOutcome, TransferStatus};
pub use orchestrator::LifecycleOrchestrator;
