//! Webhook channel: POSTs the reminder payload as JSON.

use crate::channels::traits::{ChannelSender, ReminderPayload};
use crate::channels::{ChannelConfig, ChannelKind};
use async_trait::async_trait;
use std::time::Duration;

/// Sender for [`ChannelConfig::Webhook`] channels.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    /// Create a sender whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::BoardError::Channel(format!("cannot build webhook client: {e}")))?;
        Ok(Self { client })
    }

    /// POST `payload` to `url`. Non-2xx responses are errors.
    pub async fn post(&self, url: &str, payload: &ReminderPayload) -> anyhow::Result<()> {
        let target = parse_webhook_url(url)?;
        let response = self.client.post(target).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook {url} responded with {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, config: &ChannelConfig, payload: &ReminderPayload) -> anyhow::Result<()> {
        let ChannelConfig::Webhook { url: Some(url) } = config else {
            anyhow::bail!("not a webhook channel with a url");
        };
        self.post(url, payload).await
    }
}

/// Parse and check a webhook target. Only http(s) is accepted.
pub fn parse_webhook_url(raw: &str) -> anyhow::Result<url::Url> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("invalid webhook url `{raw}`: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => anyhow::bail!("unsupported webhook scheme `{other}`"),
    }
}

/// Best-effort webhook delivery. Returns `true` on success; never errors.
pub async fn send_webhook_alert(sender: &WebhookSender, url: &str, payload: &ReminderPayload) -> bool {
    match sender.post(url, payload).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("webhook alert to {url} failed: {e}");
            false
        }
    }
}
