//! Webhook delivery.
//!
//! POSTs each notification as JSON to a configured URL. Any non-2xx
//! response counts as a failed delivery for that target only.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::{NotificationTarget, NotifyError, Severity, NOTIFICATION_TITLE};

/// Body sent to webhook targets.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub severity: Severity,
    pub sent_at: String,
}

#[derive(Clone)]
pub struct WebhookTarget {
    url: String,
    http: Client,
}

impl WebhookTarget {
    pub fn new(url: String, http: Client) -> Self {
        Self { url, http }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationTarget for WebhookTarget {
    async fn send(&self, message: &str, severity: Severity) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            title: NOTIFICATION_TITLE,
            body: message,
            severity,
            sent_at: Utc::now().to_rfc3339(),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| NotifyError::Transport {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(url = %self.url, "Webhook notification delivered");
        Ok(())
    }

    fn target_name(&self) -> &str {
        &self.url
    }
}
