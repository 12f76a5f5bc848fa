use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{Notifier, RunEvent};

/// Posts notification emails to an HTTP email service endpoint.
pub struct EmailNotifier {
    service_url: String,
    recipient: String,
    client: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(service_url: String, recipient: String) -> Self {
        Self {
            service_url,
            recipient,
            client: reqwest::Client::new(),
        }
    }

    fn format_payload(&self, event: &RunEvent) -> serde_json::Value {
        let (subject, messages) = match event {
            RunEvent::Error {
                operation,
                messages,
                exit_code,
            } => (
                format!("Error executing {} operation (code {})", operation, exit_code),
                messages.clone(),
            ),
            RunEvent::Warning { subject, messages } => (subject.clone(), messages.clone()),
            RunEvent::Success {
                operation,
                messages,
            } => (format!("{} operation finished", operation), messages.clone()),
        };

        json!({
            "personalizations": [{ "to": [{ "email": self.recipient }] }],
            "subject": subject,
            "content": [{
                "type": "text/html",
                "value": messages.join("<br>"),
            }],
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, event: RunEvent) -> anyhow::Result<()> {
        let payload = self.format_payload(&event);
        debug!(url = %self.service_url, "Sending notification email");

        self.client
            .post(&self.service_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
