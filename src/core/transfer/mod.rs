//! Transfer of processed artifacts between onsite and offsite.
//!
//! Two interchangeable strategies behind one contract: a bulk copy tool
//! (azcopy) and a delta-sync tool (rsync). Selection is configuration
//! driven; tests substitute the trait with fakes.

pub mod azcopy;
pub mod rsync;

use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::models::TransferOutcome;
use crate::error::Result;

pub use azcopy::AzCopyService;
pub use rsync::{RsyncService, RsyncTransport, RSYNC_ATTEMPTS};

/// Which external tool moves artifacts over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Azcopy,
    Rsync,
}

#[async_trait]
pub trait TransferService: Send + Sync {
    /// Move `source` to `destination`, returning the parsed tool summary.
    /// Parse failures never escape raw; they surface as transfer errors.
    async fn transfer(&self, source: &str, destination: &str) -> Result<TransferOutcome>;
}

/// Seam over subprocess execution so strategy logic (retry bounds, output
/// grammar handling) is testable without the real tools installed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output>;
}

pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| crate::error::BurError::Tool {
                tool: "transfer",
                reason: format!("failed to spawn '{}': {}", program, e),
            })?;
        Ok(output)
    }
}

/// Build the configured transfer strategy.
pub fn create_service(
    mode: TransferMode,
    rsync_transport: RsyncTransport,
    sas_token: Option<String>,
) -> Arc<dyn TransferService> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    match mode {
        TransferMode::Azcopy => Arc::new(AzCopyService::new(sas_token, runner)),
        TransferMode::Rsync => Arc::new(RsyncService::new(rsync_transport, RSYNC_ATTEMPTS, runner)),
    }
}
