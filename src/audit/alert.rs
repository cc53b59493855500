//! Escalation channels for audit events that could not be persisted.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::error;
use url::Url;

use super::AuditEvent;

#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Deliver an alert. Must not fail; implementations fall back to logging.
    async fn escalate(&self, event: &AuditEvent, reason: &str);
}

/// Structured error log, scraped by whatever collects service logs.
#[derive(Clone, Debug, Default)]
pub struct LogAlert;

#[async_trait]
impl AlertChannel for LogAlert {
    async fn escalate(&self, event: &AuditEvent, reason: &str) {
        error!(
            alert.reason = reason,
            audit.id = %event.id,
            audit.event = %event.event_type,
            audit.actor = %event.actor,
            audit.target = event.target_id.as_deref().unwrap_or("-"),
            audit.timestamp = %event.timestamp,
            "audit event escalated: {}",
            event.detail
        );
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    reason: &'a str,
    event: &'a AuditEvent,
}

/// JSON POST to an operator webhook. Falls back to [`LogAlert`] on any failure.
#[derive(Clone, Debug)]
pub struct WebhookAlert {
    client: reqwest::Client,
    url: Url,
}

impl WebhookAlert {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertChannel for WebhookAlert {
    async fn escalate(&self, event: &AuditEvent, reason: &str) {
        let payload = WebhookPayload { reason, event };
        let result = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        if let Err(err) = result {
            error!("audit webhook delivery failed: {err}");
            LogAlert.escalate(event, reason).await;
        }
    }
}
