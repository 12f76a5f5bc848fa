//! Configuration loading and validation.
//!
//! Settings are merged from a TOML file, `BUR_`-prefixed environment
//! variables and serialized CLI overrides (highest precedence). Retention
//! counts and the delay budget are validated here, before any remote
//! interaction happens.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::core::transfer::TransferMode;
use crate::error::{BurError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bur/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub offsite: OffsiteConfig,
    /// Deployment label -> onsite settings.
    pub deployments: BTreeMap<String, DeploymentConfig>,
    pub gnupg: GnupgConfig,
    #[serde(default)]
    pub support: Option<SupportConfig>,
    #[serde(default)]
    pub delay: Option<DelayConfig>,
    #[serde(default = "default_transfer_mode")]
    pub transfer_mode: TransferMode,
    /// Use the rsync daemon transport instead of rsync over ssh.
    #[serde(default)]
    pub rsync_daemon: bool,
}

fn default_transfer_mode() -> TransferMode {
    TransferMode::Rsync
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsiteConfig {
    pub ip: String,
    pub user: String,
    /// Remote root under which the backup folder lives.
    pub path: String,
    /// Backup folder name, created under `path` when absent.
    pub folder: String,
    /// Local staging root used while processing uploads.
    pub temp_path: PathBuf,
    /// How many processed backups to keep offsite.
    pub retention: i64,
    /// Object-store account URL, required for the azcopy transfer mode.
    #[serde(default)]
    pub storage_account: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub sas_token: Option<String>,
}

impl OffsiteConfig {
    /// `user@ip`, the ssh endpoint for probes and retention.
    pub fn host(&self) -> String {
        format!("{}@{}", self.user, self.ip)
    }

    /// Remote backup root, e.g. `/offsite/network_dev_backups`.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), self.folder)
    }

    /// Destination root handed to the transfer tool.
    pub fn transfer_root(&self, mode: TransferMode) -> Result<String> {
        match mode {
            TransferMode::Rsync => Ok(format!("{}:{}", self.host(), self.full_path())),
            TransferMode::Azcopy => {
                let account = self.storage_account.as_deref().ok_or_else(|| {
                    BurError::Validation(
                        "azcopy transfer mode requires offsite.storage_account".to_string(),
                    )
                })?;
                let container = self.container.as_deref().ok_or_else(|| {
                    BurError::Validation(
                        "azcopy transfer mode requires offsite.container".to_string(),
                    )
                })?;
                Ok(format!("{}/{}", account.trim_end_matches('/'), container))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Onsite path holding this deployment's dated backup directories.
    pub backup_path: PathBuf,
    /// How many backups to keep onsite.
    pub retention: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GnupgConfig {
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportConfig {
    pub email_to: String,
    pub email_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Budget for one deployment's upload batch, e.g. "45m", "2h", "90s".
    pub max_delay: String,
}

impl DelayConfig {
    pub fn budget(&self) -> Result<Duration> {
        to_seconds(&self.max_delay).map(Duration::from_secs)
    }
}

/// Convert a duration string of the form `<number><unit>` (`s`, `m`, `h`)
/// to seconds.
pub fn to_seconds(duration: &str) -> Result<u64> {
    let duration = duration.trim();
    let (value, unit) = duration.split_at(duration.len().saturating_sub(1));

    let multiplier = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => {
            return Err(BurError::Validation(format!(
                "invalid time unit in '{}', must be 's', 'm' or 'h'",
                duration
            )))
        }
    };

    let value: f64 = value.parse().map_err(|_| {
        BurError::Validation(format!(
            "wrong time format '{}', expected number + unit",
            duration
        ))
    })?;

    Ok((value * multiplier) as u64)
}

impl AppConfig {
    /// Load and validate configuration, merging CLI overrides on top of the
    /// file and environment.
    pub fn load<O: Serialize>(path: &Path, overrides: Option<&O>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BUR_").split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| BurError::Validation(format!("cannot read configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.offsite.ip.trim().is_empty() || self.offsite.user.trim().is_empty() {
            return Err(BurError::Validation(
                "offsite ip and user must not be empty".to_string(),
            ));
        }
        if self.offsite.retention < 0 {
            return Err(BurError::Validation(format!(
                "offsite retention must be non-negative, got {}",
                self.offsite.retention
            )));
        }
        if self.deployments.is_empty() {
            return Err(BurError::Validation(
                "at least one deployment section is required".to_string(),
            ));
        }
        for (label, deployment) in &self.deployments {
            if deployment.retention < 0 {
                return Err(BurError::Validation(format!(
                    "onsite retention for '{}' must be non-negative, got {}",
                    label, deployment.retention
                )));
            }
        }
        if let Some(delay) = &self.delay {
            delay.budget()?;
        }
        // Surface a bad azcopy setup at validation time, not mid-upload.
        self.offsite.transfer_root(self.transfer_mode)?;
        Ok(())
    }

    pub fn offsite_retention(&self) -> usize {
        self.offsite.retention as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
            transfer_mode = "rsync"

            [offsite]
            ip = "10.1.100.4"
            user = "root"
            path = "/offsite_azure"
            folder = "network_dev_backups"
            temp_path = "/data1/bur_tmp"
            retention = 4

            [gnupg]
            user_name = "backup"
            user_email = "backup@root.com"

            [deployments.lab]
            backup_path = "/data1/network_dev_backups"
            retention = 2
        "#
        .to_string()
    }

    fn load_str(toml: &str) -> Result<AppConfig> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();
        AppConfig::load::<()>(&path, None)
    }

    #[test]
    fn loads_valid_configuration() {
        let config = load_str(&base_toml()).unwrap();
        assert_eq!(config.offsite.host(), "root@10.1.100.4");
        assert_eq!(
            config.offsite.full_path(),
            "/offsite_azure/network_dev_backups"
        );
        assert_eq!(
            config.offsite.transfer_root(TransferMode::Rsync).unwrap(),
            "root@10.1.100.4:/offsite_azure/network_dev_backups"
        );
        assert_eq!(config.deployments["lab"].retention, 2);
    }

    #[test]
    fn negative_retention_is_rejected() {
        let toml = base_toml().replace("retention = 4", "retention = -1");
        assert!(matches!(
            load_str(&toml).unwrap_err(),
            BurError::Validation(_)
        ));
    }

    #[test]
    fn azcopy_mode_requires_storage_account() {
        let toml = base_toml().replace("transfer_mode = \"rsync\"", "transfer_mode = \"azcopy\"");
        assert!(matches!(
            load_str(&toml).unwrap_err(),
            BurError::Validation(_)
        ));
    }

    #[test]
    fn duration_strings_parse_to_seconds() {
        assert_eq!(to_seconds("90s").unwrap(), 90);
        assert_eq!(to_seconds("15m").unwrap(), 900);
        assert_eq!(to_seconds("2h").unwrap(), 7200);
        assert_eq!(to_seconds("1.5h").unwrap(), 5400);
        assert!(to_seconds("10x").is_err());
        assert!(to_seconds("h").is_err());
    }
}
