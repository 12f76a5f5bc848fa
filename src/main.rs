use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use bur::config::{AppConfig, DEFAULT_CONFIG_PATH};
use bur::core::orchestrator::LifecycleOrchestrator;
use bur::core::transfer::{self, RsyncTransport, TransferMode};
use bur::error::{exit_code, BurError};
use bur::logging::{self, LogConfig};
use bur::notify::create_notifier;
use bur::tools::{GpgEncryptor, SshShell, TarArchiver};

#[derive(Parser)]
#[command(name = "bur", about = "Backup upload and retention daemon", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON instead of human-readable lines.
    #[arg(long)]
    json_logs: bool,

    /// Override the configured transfer tool.
    #[arg(long, value_enum)]
    transfer_mode: Option<TransferMode>,

    /// Use the rsync daemon transport instead of rsync over ssh.
    #[arg(long)]
    rsync_daemon: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI overrides merged into the configuration with highest precedence.
#[derive(Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    transfer_mode: Option<TransferMode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    rsync_daemon: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process and upload pending backups, then run retention on both ends.
    Upload,
    /// Download one backup from offsite, decrypt and extract it.
    Download {
        /// Deployment whose backup should be restored.
        #[arg(short = 'p', long)]
        deployment: String,
        /// Tag of the backup to restore; defaults to the most recent.
        #[arg(short, long)]
        tag: Option<String>,
        /// Destination directory; defaults to the deployment's backup path.
        #[arg(short, long)]
        destination: Option<PathBuf>,
    },
    /// List the processed backups currently available offsite.
    List,
    /// Run retention on both ends without uploading anything.
    Retention,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(LogConfig {
        json: cli.json_logs,
        verbose: cli.verbose,
    });

    let overrides = CliOverrides {
        transfer_mode: cli.transfer_mode,
        rsync_daemon: cli.rsync_daemon,
    };
    let config = match AppConfig::load(&cli.config, Some(&overrides)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, config = %cli.config.display(), "Invalid configuration");
            return ExitCode::from(exit_code::INVALID_INPUT as u8);
        }
    };

    let orchestrator = build_orchestrator(config);

    match cli.command {
        Commands::Upload => {
            let reports = orchestrator.run_upload().await;
            for report in &reports {
                if report.success {
                    info!(tags = ?report.tags, "{}", report.message);
                } else {
                    error!("{}", report.message);
                }
            }
            if reports.iter().all(|r| r.success) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(exit_code::FAILED_UPLOAD as u8)
            }
        }
        Commands::Download {
            deployment,
            tag,
            destination,
        } => match orchestrator
            .run_download(&deployment, tag.as_deref(), destination.as_deref())
            .await
        {
            Ok(report) => {
                info!("{}", report.message);
                ExitCode::SUCCESS
            }
            Err(e @ BurError::Validation(_)) => {
                error!(error = %e, "Backup download rejected");
                ExitCode::from(exit_code::INVALID_INPUT as u8)
            }
            Err(e) => {
                error!(error = %e, "Backup download failed");
                ExitCode::from(exit_code::FAILED_DOWNLOAD as u8)
            }
        },
        Commands::List => match orchestrator.run_list().await {
            Ok(report) => {
                info!("{}", report.message);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Could not list offsite backups");
                ExitCode::FAILURE
            }
        },
        Commands::Retention => {
            let reports = orchestrator.run_retention().await;
            for report in &reports {
                if report.success {
                    info!(tags = ?report.tags, "{}", report.message);
                } else {
                    error!("{}", report.message);
                }
            }
            if reports.iter().all(|r| r.success) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(exit_code::FAILED_OFFSITE_CLEANUP as u8)
            }
        }
    }
}

fn build_orchestrator(config: AppConfig) -> LifecycleOrchestrator {
    let shell = Arc::new(SshShell::new(config.offsite.host()));
    let transport = if config.rsync_daemon {
        RsyncTransport::Daemon
    } else {
        RsyncTransport::Ssh
    };
    let transfer = transfer::create_service(
        config.transfer_mode,
        transport,
        config.offsite.sas_token.clone(),
    );
    let archiver = Arc::new(TarArchiver);
    let encryptor = Arc::new(GpgEncryptor::new(config.gnupg.user_email.clone()));
    let notifier = create_notifier(config.support.as_ref());

    LifecycleOrchestrator::new(config, shell, transfer, archiver, encryptor, notifier)
}
