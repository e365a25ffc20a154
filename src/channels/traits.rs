use crate::channels::{ChannelConfig, ChannelKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message delivered to every channel a reminder fans out to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
    pub template_key: String,
}

/// Channel sender contract. New channel types only need to implement this trait.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Channel type this sender delivers to.
    fn kind(&self) -> ChannelKind;

    /// Deliver `payload` using the channel-specific `config`.
    async fn send(&self, config: &ChannelConfig, payload: &ReminderPayload) -> anyhow::Result<()>;
}
