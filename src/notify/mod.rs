mod email;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SupportConfig;

pub use email::EmailNotifier;

/// Events that trigger out-of-band notifications.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// An operation failed; carries the exit code the process will use.
    Error {
        operation: String,
        messages: Vec<String>,
        exit_code: i32,
    },
    /// Advisory alert, e.g. the delay watchdog firing mid-run.
    Warning {
        subject: String,
        messages: Vec<String>,
    },
    Success {
        operation: String,
        messages: Vec<String>,
    },
}

/// Trait for notification channel implementations.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: RunEvent) -> anyhow::Result<()>;
}

/// Build a notifier from the support section of the configuration, if one
/// is configured.
pub fn create_notifier(config: Option<&SupportConfig>) -> Option<Arc<dyn Notifier>> {
    let config = config?;
    if config.email_url.is_empty() || config.email_to.is_empty() {
        return None;
    }
    Some(Arc::new(EmailNotifier::new(
        config.email_url.clone(),
        config.email_to.clone(),
    )))
}
