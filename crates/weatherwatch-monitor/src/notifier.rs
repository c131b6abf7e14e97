//! Alert delivery.
//!
//! Delivery is best-effort: the monitor logs a failed `send` and moves on.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, instrument, warn};
use weatherwatch_core::{NotifierConfig, NotifyError};

use crate::alerts::AlertEvent;

/// Outbound alert channel
pub trait Notifier: Send + Sync + 'static {
    fn send(&self, alerts: &[AlertEvent]) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes each alert to the log at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, alerts: &[AlertEvent]) -> Result<(), NotifyError> {
        for alert in alerts {
            warn!(
                "ALERT: {} temperature alert for {}: {:.1}°C at {}",
                alert.kind,
                alert.location,
                alert.temperature,
                alert.timestamp.to_rfc3339()
            );
        }
        Ok(())
    }
}

/// POSTs the alert batch as a JSON array.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    async fn send(&self, alerts: &[AlertEvent]) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(alerts)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        info!("Delivered {} alert(s) to webhook", alerts.len());
        Ok(())
    }
}

/// Notifier chosen from configuration.
#[derive(Debug, Clone)]
pub enum AlertNotifier {
    /// Log only (default).
    Log(LogNotifier),

    /// HTTP webhook.
    Webhook(WebhookNotifier),
}

impl AlertNotifier {
    /// Webhook when a URL is configured, log otherwise.
    pub fn from_config(config: &NotifierConfig, timeout: Duration) -> Result<Self, NotifyError> {
        match &config.webhook_url {
            Some(url) if !url.trim().is_empty() => {
                Ok(Self::Webhook(WebhookNotifier::new(url.trim(), timeout)?))
            }
            _ => Ok(Self::Log(LogNotifier)),
        }
    }

    pub fn is_webhook(&self) -> bool {
        matches!(self, Self::Webhook(_))
    }
}

impl Notifier for AlertNotifier {
    async fn send(&self, alerts: &[AlertEvent]) -> Result<(), NotifyError> {
        match self {
            Self::Log(notifier) => notifier.send(alerts).await,
            Self::Webhook(notifier) => notifier.send(alerts).await,
        }
    }
}
