//! Top-level sequencer for the backup lifecycle: upload, download, listing
//! and retention, per deployment.

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use tracing::{error, info, warn};

use crate::config::{AppConfig, DeploymentConfig};
use crate::core::catalog::BackupCatalog;
use crate::core::dedup::DedupGuard;
use crate::core::models::{PhaseReport, BackupUnit, PROCESSED_SUFFIX};
use crate::core::processor::BackupProcessor;
use crate::core::retention::RetentionPolicy;
use crate::core::staging::StagingDir;
use crate::core::transfer::TransferService;
use crate::core::watchdog::DelayWatchdog;
use crate::error::{exit_code, BurError, Result};
use crate::notify::{Notifier, RunEvent};
use crate::tools::{Archiver, Encryptor, RemoteShell};

/// Terminal state of one backup unit within a batch.
enum UnitOutcome {
    Uploaded,
    Skipped,
}

pub struct LifecycleOrchestrator {
    config: AppConfig,
    catalog: BackupCatalog,
    shell: Arc<dyn RemoteShell>,
    transfer: Arc<dyn TransferService>,
    processor: BackupProcessor,
    notifier: Option<Arc<dyn Notifier>>,
}

impl LifecycleOrchestrator {
    pub fn new(
        config: AppConfig,
        shell: Arc<dyn RemoteShell>,
        transfer: Arc<dyn TransferService>,
        archiver: Arc<dyn Archiver>,
        encryptor: Arc<dyn Encryptor>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            config,
            catalog: BackupCatalog::new(),
            shell,
            transfer,
            processor: BackupProcessor::new(archiver, encryptor),
            notifier,
        }
    }

    /// Upload every deployment's eligible backups, then run offsite and
    /// onsite retention. Retention runs even when the upload batch had
    /// failures: hygiene on both ends is best-effort, never skipped.
    pub async fn run_upload(&self) -> Vec<PhaseReport> {
        let mut reports = Vec::new();

        for (label, deployment) in &self.config.deployments {
            if !deployment.backup_path.exists() {
                error!(
                    deployment = %label,
                    path = %deployment.backup_path.display(),
                    "Backup path does not exist"
                );
                continue;
            }

            let watchdog = self.arm_delay_watchdog(label);

            let report = self.upload_deployment(label, deployment).await;
            if let Some(handle) = watchdog {
                handle.disarm();
            }

            if !report.success {
                self.notify_error("Backup Upload", &report.message, exit_code::FAILED_UPLOAD)
                    .await;
            } else if !report.tags.is_empty() {
                self.notify_success("Backup Upload", &report).await;
            }
            reports.push(report);

            reports.push(self.run_offsite_retention().await);
            reports.push(self.run_onsite_retention(label, deployment).await);
        }

        reports
    }

    /// Process one deployment's batch: dedup -> process -> transfer per
    /// unit, oldest first. Unit errors are collected, not fatal; the
    /// staging directory is deleted once per run on every exit path.
    async fn upload_deployment(&self, label: &str, deployment: &DeploymentConfig) -> PhaseReport {
        let units = match self.catalog.list_onsite(&deployment.backup_path) {
            Ok(units) if units.is_empty() => {
                return PhaseReport::failed(
                    format!("no valid backups found for deployment '{}'", label),
                    Vec::new(),
                );
            }
            Ok(units) => units,
            Err(e) => return PhaseReport::failed(e.to_string(), Vec::new()),
        };

        info!(
            deployment = %label,
            backups = ?units.iter().map(|u| u.tag.as_str()).collect::<Vec<_>>(),
            "Doing backup upload"
        );

        let staging = match self.prepare_paths(label).await {
            Ok(staging) => staging,
            Err(e) => return PhaseReport::failed(e.to_string(), Vec::new()),
        };

        let mut uploaded = Vec::new();
        let mut errors = Vec::new();

        for unit in &units {
            match self.upload_unit(unit, staging.path()).await {
                Ok(UnitOutcome::Uploaded) => uploaded.push(unit.tag.clone()),
                Ok(UnitOutcome::Skipped) => {
                    info!(tag = %unit.tag, "Backup already offsite, skipped")
                }
                Err(e) => {
                    error!(tag = %unit.tag, error = %e, "Backup upload failed");
                    errors.push(e.to_string());
                }
            }
        }

        drop(staging);

        if errors.is_empty() {
            let message = if uploaded.is_empty() {
                "no backups to upload to offsite".to_string()
            } else {
                format!("successfully uploaded {} backup(s)", uploaded.len())
            };
            PhaseReport::ok(message, uploaded)
        } else {
            PhaseReport::failed(errors.join("; "), uploaded)
        }
    }

    /// Ensure the remote backup root and the local staging folder exist.
    async fn prepare_paths(&self, label: &str) -> Result<StagingDir> {
        let remote_root = self.config.offsite.full_path();
        if !self.shell.exists(&remote_root).await? {
            self.shell.create_dir(&remote_root).await?;
        }

        StagingDir::create(self.config.offsite.temp_path.join(label))
    }

    async fn upload_unit(&self, unit: &BackupUnit, staging: &Path) -> Result<UnitOutcome> {
        let remote_root = self.config.offsite.full_path();

        if DedupGuard::already_uploaded(self.shell.as_ref(), &remote_root, &unit.tag).await? {
            return Ok(UnitOutcome::Skipped);
        }

        let artifact = self.processor.process(unit, staging).await?;
        info!(
            tag = %artifact.tag,
            secs = artifact.duration.as_secs(),
            "Backup processed"
        );

        let destination = self
            .config
            .offsite
            .transfer_root(self.config.transfer_mode)?;

        info!(
            artifact = %artifact.path.display(),
            destination = %destination,
            "Transferring backup to offsite"
        );
        self.transfer
            .transfer(&artifact.path.to_string_lossy(), &destination)
            .await?;

        info!(tag = %artifact.tag, "Backup transferred to offsite");
        Ok(UnitOutcome::Uploaded)
    }

    /// Download one backup: the given tag, or the newest available when no
    /// tag is provided. The artifact is decrypted and extracted in place.
    pub async fn run_download(
        &self,
        deployment_label: &str,
        backup_tag: Option<&str>,
        destination: Option<&Path>,
    ) -> Result<PhaseReport> {
        let deployment = self.deployment(deployment_label)?;

        let listing = self
            .catalog
            .list_offsite(self.shell.as_ref(), &self.config.offsite.full_path())
            .await?;

        let artifact_name = match backup_tag {
            Some(tag) if tag.trim().is_empty() => {
                return Err(BurError::Validation("empty backup tag".to_string()));
            }
            Some(tag) => {
                let name = format!("{}{}", tag, PROCESSED_SUFFIX);
                if !listing.contains(&name) {
                    return Err(BurError::Validation(format!(
                        "no backup with tag '{}' was found on offsite",
                        tag
                    )));
                }
                name
            }
            // The offsite listing is already newest-first; "most recent"
            // is the first element, no re-sort.
            None => listing
                .first()
                .cloned()
                .ok_or_else(|| BurError::Validation("no backups available offsite".to_string()))?,
        };

        let destination = match destination {
            Some(path) => path.to_path_buf(),
            None => {
                warn!(
                    path = %deployment.backup_path.display(),
                    "Backup download destination was not informed, default location will be used"
                );
                deployment.backup_path.clone()
            }
        };
        tokio::fs::create_dir_all(&destination).await?;

        let tag = artifact_name
            .strip_suffix(PROCESSED_SUFFIX)
            .unwrap_or(&artifact_name);
        if destination.join(tag).exists() {
            warn!(tag, "A backup with the same tag already exists onsite, it will be overridden");
        }

        let source = self.download_source(&artifact_name)?;
        info!(source = %source, destination = %destination.display(), "Downloading backup");
        self.transfer
            .transfer(&source, &destination.to_string_lossy())
            .await?;

        let downloaded = destination.join(&artifact_name);
        info!(artifact = %downloaded.display(), "Processing the downloaded backup");

        let decrypted = self.processor.decrypt_artifact(&downloaded).await?;
        let extracted = self
            .processor
            .extract_archive(&decrypted, &destination)
            .await?;
        info!(backup = %extracted.display(), "Backup downloaded and processed successfully");

        Ok(PhaseReport::ok(
            format!("backup '{}' downloaded to '{}'", tag, destination.display()),
            vec![tag.to_string()],
        ))
    }

    fn download_source(&self, artifact_name: &str) -> Result<String> {
        let root = self
            .config
            .offsite
            .transfer_root(self.config.transfer_mode)?;
        Ok(format!("{}/{}", root, artifact_name))
    }

    /// Log the processed artifacts currently available offsite.
    pub async fn run_list(&self) -> Result<PhaseReport> {
        let listing = self
            .catalog
            .list_offsite(self.shell.as_ref(), &self.config.offsite.full_path())
            .await?;

        info!(count = listing.len(), backups = ?listing, "Backups available on offsite");

        Ok(PhaseReport::ok(
            format!("{} backup(s) available on offsite", listing.len()),
            listing,
        ))
    }

    /// Prune offsite artifacts beyond the configured keep-count, with
    /// verified deletion.
    pub async fn run_offsite_retention(&self) -> PhaseReport {
        info!("Performing clean up on offsite");
        let policy = RetentionPolicy::new(self.config.offsite_retention());
        let remote_root = self.config.offsite.full_path();

        let listing = match self
            .catalog
            .list_offsite(self.shell.as_ref(), &remote_root)
            .await
        {
            Ok(listing) => listing,
            Err(e) => return self.retention_failure("offsite", e).await,
        };

        let prune = policy.prune_set(&listing);
        if prune.is_empty() {
            return PhaseReport::ok(
                "offsite clean up finished successfully with no backups removed",
                Vec::new(),
            );
        }

        match policy
            .apply_offsite(self.shell.as_ref(), &remote_root, &prune)
            .await
        {
            Ok(outcome) if outcome.is_clean() => PhaseReport::ok(
                "offsite backups clean up finished successfully",
                outcome.removed,
            ),
            Ok(outcome) => {
                let e = BurError::Retention {
                    not_removed: outcome.not_removed,
                };
                let report = self.retention_failure("offsite", e).await;
                PhaseReport {
                    tags: outcome.removed,
                    ..report
                }
            }
            Err(e) => self.retention_failure("offsite", e).await,
        }
    }

    /// Prune onsite backup directories beyond the deployment's keep-count.
    pub async fn run_onsite_retention(
        &self,
        label: &str,
        deployment: &DeploymentConfig,
    ) -> PhaseReport {
        info!(deployment = %label, "Performing clean up on onsite");
        let policy = RetentionPolicy::new(deployment.retention as usize);

        let tags = match self
            .catalog
            .list_onsite_tags_newest_first(&deployment.backup_path)
        {
            Ok(tags) => tags,
            Err(e) => return self.retention_failure("onsite", e).await,
        };

        let prune = policy.prune_set(&tags);
        if prune.is_empty() {
            return PhaseReport::ok(
                "onsite clean up finished successfully with no backups removed",
                Vec::new(),
            );
        }

        match policy.apply_onsite(&deployment.backup_path, &prune).await {
            Ok(outcome) if outcome.is_clean() => PhaseReport::ok(
                "onsite backups clean up finished successfully",
                outcome.removed,
            ),
            Ok(outcome) => {
                let e = BurError::Retention {
                    not_removed: outcome.not_removed,
                };
                let report = self.retention_failure("onsite", e).await;
                PhaseReport {
                    tags: outcome.removed,
                    ..report
                }
            }
            Err(e) => self.retention_failure("onsite", e).await,
        }
    }

    /// Run every deployment's retention (offsite first), as a standalone
    /// operation.
    pub async fn run_retention(&self) -> Vec<PhaseReport> {
        let mut reports = vec![self.run_offsite_retention().await];
        for (label, deployment) in &self.config.deployments {
            reports.push(self.run_onsite_retention(label, deployment).await);
        }
        reports
    }

    fn deployment(&self, label: &str) -> Result<&DeploymentConfig> {
        self.config.deployments.get(label).ok_or_else(|| {
            BurError::Validation(format!("unknown deployment '{}'", label))
        })
    }

    /// Arm the advisory delay watchdog for one deployment's batch, when a
    /// budget and a notifier are configured. The watchdog only alerts; it
    /// never cancels the batch.
    fn arm_delay_watchdog(
        &self,
        label: &str,
    ) -> Option<crate::core::watchdog::WatchdogHandle> {
        let budget = self.config.delay.as_ref()?.budget().ok()?;
        let notifier = self.notifier.clone()?;

        let deployment = label.to_string();
        let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let budget_secs = budget.as_secs();

        Some(DelayWatchdog::arm(budget, async move {
            warn!(deployment = %deployment, "Max delay reached for backup upload");
            let event = RunEvent::Warning {
                subject: format!(
                    "Max delay reached - offsite backup - Backup Upload - {}",
                    deployment
                ),
                messages: vec![
                    format!("Backup Upload for {} is taking longer than expected.", deployment),
                    format!("Backup Upload started at {} and is still running.", started_at),
                    format!("Max delay time defined ({}s) was reached.", budget_secs),
                ],
            };
            if let Err(e) = notifier.notify(event).await {
                error!(error = %e, "Could not send delay notification");
            }
        }))
    }

    async fn retention_failure(&self, end: &str, e: BurError) -> PhaseReport {
        error!(error = %e, "Clean up on {} failed", end);
        self.notify_error("Cleanup", &e.to_string(), exit_code::FAILED_OFFSITE_CLEANUP)
            .await;
        PhaseReport::failed(e.to_string(), Vec::new())
    }

    async fn notify_success(&self, operation: &str, report: &PhaseReport) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let event = RunEvent::Success {
            operation: operation.to_string(),
            messages: vec![
                report.message.clone(),
                format!("Backups: {}", report.tags.join(", ")),
            ],
        };
        if let Err(e) = notifier.notify(event).await {
            error!(error = %e, "Could not send success notification");
        }
    }

    async fn notify_error(&self, operation: &str, message: &str, exit_code: i32) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let event = RunEvent::Error {
            operation: operation.to_string(),
            messages: vec![message.to_string()],
            exit_code,
        };
        if let Err(e) = notifier.notify(event).await {
            error!(error = %e, "Could not send error notification");
        }
    }
}
