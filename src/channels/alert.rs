//! One-off alerts to a single channel, outside any template.

use crate::channels::email::{EmailSender, send_email_alert};
use crate::channels::traits::ReminderPayload;
use crate::channels::webhook::{WebhookSender, send_webhook_alert};
use crate::channels::{ChannelConfig, NotificationChannel};
use crate::config::DeliveryConfig;

/// The built-in webhook and email senders, for direct best-effort alerts.
#[derive(Debug, Clone)]
pub struct AlertSenders {
    pub webhook: WebhookSender,
    pub email: EmailSender,
}

impl AlertSenders {
    /// Build both senders from delivery settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(delivery: &DeliveryConfig) -> crate::Result<Self> {
        Ok(Self {
            webhook: WebhookSender::new(delivery.timeout())?,
            email: EmailSender::new(
                delivery.email_relay_url.clone(),
                delivery.email_from.clone(),
                delivery.timeout(),
            )?,
        })
    }

    /// Send `payload` to `channel`. Returns `false` for channels without a
    /// target or of a type with no built-in sender.
    pub async fn alert(&self, channel: &NotificationChannel, payload: &ReminderPayload) -> bool {
        match &channel.config {
            ChannelConfig::Webhook { url: Some(url) } if !url.trim().is_empty() => {
                send_webhook_alert(&self.webhook, url, payload).await
            }
            ChannelConfig::Email { recipients } if !recipients.is_empty() => {
                send_email_alert(&self.email, recipients, payload).await
            }
            _ => {
                tracing::debug!("channel {} has nothing to alert", channel.id);
                false
            }
        }
    }
}
