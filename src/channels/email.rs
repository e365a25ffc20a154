//! Email channel, delivered through an HTTP mail relay.
//!
//! The relay receives `{from, to, subject, text, metadata}` as JSON and is
//! responsible for SMTP. With no relay configured every email send fails.

use crate::channels::traits::{ChannelSender, ReminderPayload};
use crate::channels::{ChannelConfig, ChannelKind};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    metadata: &'a serde_json::Value,
}

/// Sender for [`ChannelConfig::Email`] channels.
#[derive(Debug, Clone)]
pub struct EmailSender {
    client: reqwest::Client,
    relay_url: Option<String>,
    from: String,
}

impl EmailSender {
    /// Create a sender posting to `relay_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        relay_url: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::BoardError::Channel(format!("cannot build email client: {e}")))?;
        Ok(Self {
            client,
            relay_url: relay_url.filter(|u| !u.trim().is_empty()),
            from: from.into(),
        })
    }

    /// Send `payload` to every non-blank recipient in one relay call.
    pub async fn deliver(&self, recipients: &[String], payload: &ReminderPayload) -> anyhow::Result<()> {
        let Some(relay_url) = self.relay_url.as_deref() else {
            anyhow::bail!("email relay is not configured");
        };

        let to: Vec<&str> = recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();
        if to.is_empty() {
            anyhow::bail!("no email recipients");
        }

        let message = RelayMessage {
            from: &self.from,
            to,
            subject: &payload.title,
            text: &payload.body,
            metadata: &payload.metadata,
        };

        let response = self.client.post(relay_url).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("mail relay responded with {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, config: &ChannelConfig, payload: &ReminderPayload) -> anyhow::Result<()> {
        let ChannelConfig::Email { recipients } = config else {
            anyhow::bail!("not an email channel");
        };
        self.deliver(recipients, payload).await
    }
}

/// Best-effort email delivery. Returns `true` on success; never errors.
pub async fn send_email_alert(
    sender: &EmailSender,
    recipients: &[String],
    payload: &ReminderPayload,
) -> bool {
    match sender.deliver(recipients, payload).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("email alert to {} recipient(s) failed: {e}", recipients.len());
            false
        }
    }
}
