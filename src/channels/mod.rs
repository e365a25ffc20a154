//! Outbound notification channels (webhook, email).
//!
//! Design goal: channel types are pluggable. A reminder template references
//! channels by id; the [`dispatch::Dispatcher`] resolves them through the
//! [`registry::ChannelRegistry`] and hands each one to the sender for its type.

pub mod alert;
pub mod dispatch;
pub mod email;
pub mod registry;
pub mod traits;
pub mod webhook;

pub use alert::AlertSenders;
pub use dispatch::{ChannelOutcome, DeliveryStatus, DispatchReport, Dispatcher};
pub use registry::ChannelRegistry;
pub use traits::{ChannelSender, ReminderPayload};

use serde::{Deserialize, Serialize};

/// Numeric channel identifier referenced from templates.
pub type ChannelId = u64;

/// A configured outbound notification mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    #[serde(default)]
    pub id: ChannelId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Type tag plus type-specific settings.
    #[serde(flatten)]
    pub config: ChannelConfig,
}

fn default_enabled() -> bool {
    true
}

/// Type-specific channel settings, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Webhook {
        #[serde(default)]
        url: Option<String>,
    },
    Email {
        #[serde(default)]
        recipients: Vec<String>,
    },
    /// Channel types this service cannot deliver to yet (push, sms).
    Other {
        #[serde(default)]
        kind: String,
    },
}

/// Channel type discriminant, used to pick a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Webhook,
    Email,
    Other,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Webhook => write!(f, "webhook"),
            Self::Email => write!(f, "email"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ChannelConfig {
    /// The channel type of this config.
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Webhook { .. } => ChannelKind::Webhook,
            Self::Email { .. } => ChannelKind::Email,
            Self::Other { .. } => ChannelKind::Other,
        }
    }

    /// Returns why this config has nowhere to deliver to, if so.
    pub fn missing_target(&self) -> Option<&'static str> {
        match self {
            Self::Webhook { url } => match url.as_deref().map(str::trim) {
                Some(u) if !u.is_empty() => None,
                _ => Some("webhook channel has no url"),
            },
            Self::Email { recipients } => {
                if recipients.iter().any(|r| !r.trim().is_empty()) {
                    None
                } else {
                    Some("email channel has no recipients")
                }
            }
            Self::Other { .. } => None,
        }
    }
}

impl NotificationChannel {
    /// Create an enabled webhook channel.
    pub fn webhook(id: ChannelId, url: impl Into<String>) -> Self {
        Self {
            id,
            name: format!("webhook-{id}"),
            enabled: true,
            config: ChannelConfig::Webhook {
                url: Some(url.into()),
            },
        }
    }

    /// Create an enabled email channel.
    pub fn email(id: ChannelId, recipients: Vec<String>) -> Self {
        Self {
            id,
            name: format!("email-{id}"),
            enabled: true,
            config: ChannelConfig::Email { recipients },
        }
    }

    /// The channel type.
    pub fn kind(&self) -> ChannelKind {
        self.config.kind()
    }
}
