//! Reminder fan-out across notification channels.
//!
//! Every referenced channel is sent from its own spawned task, so a failing
//! or panicking sender never stops delivery to the others.

use crate::channels::alert::AlertSenders;
use crate::channels::traits::{ChannelSender, ReminderPayload};
use crate::channels::{ChannelId, ChannelKind, ChannelRegistry};
use crate::config::DeliveryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one channel within a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { error: String },
    Skipped { reason: String },
}

/// Per-channel outcome, in the order the template lists its channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    pub channel_id: ChannelId,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Outcome of one reminder dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    /// Number of channels that accepted the reminder.
    pub fn delivered(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Delivered))
    }

    /// Number of channels whose send failed.
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Failed { .. }))
    }

    /// Number of channels that were not attempted.
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Skipped { .. }))
    }

    /// Status for a given channel, if it was part of the dispatch.
    pub fn status_of(&self, channel_id: ChannelId) -> Option<&DeliveryStatus> {
        self.outcomes
            .iter()
            .find(|o| o.channel_id == channel_id)
            .map(|o| &o.status)
    }

    fn count(&self, pred: impl Fn(&DeliveryStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Resolves channels and routes each to the sender for its type.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ChannelRegistry,
    senders: Arc<HashMap<ChannelKind, Arc<dyn ChannelSender>>>,
    alerts: Option<AlertSenders>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.registry.len())
            .field("senders", &self.senders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher with no senders; add them with [`Dispatcher::with_sender`].
    pub fn new(registry: ChannelRegistry) -> Self {
        Self {
            registry,
            senders: Arc::new(HashMap::new()),
            alerts: None,
        }
    }

    /// Build the standard webhook + email dispatcher from delivery settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(registry: ChannelRegistry, delivery: &DeliveryConfig) -> crate::Result<Self> {
        let alerts = AlertSenders::from_config(delivery)?;
        let mut dispatcher = Self::new(registry)
            .with_sender(Arc::new(alerts.webhook.clone()))
            .with_sender(Arc::new(alerts.email.clone()));
        dispatcher.alerts = Some(alerts);
        Ok(dispatcher)
    }

    /// Built-in senders for direct alerts; `None` unless built with
    /// [`Dispatcher::from_config`].
    pub fn alerts(&self) -> Option<&AlertSenders> {
        self.alerts.as_ref()
    }

    /// Register (or replace) the sender for its channel type.
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        Arc::make_mut(&mut self.senders).insert(sender.kind(), sender);
        self
    }

    /// The channel directory this dispatcher resolves ids against.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Send `payload` to every channel in `channel_ids`.
    ///
    /// Never fails: unknown, disabled and target-less channels are skipped,
    /// send errors are recorded per channel.
    pub async fn dispatch(&self, channel_ids: &[ChannelId], payload: ReminderPayload) -> DispatchReport {
        let payload = Arc::new(payload);
        let mut outcomes: Vec<Option<DeliveryStatus>> = vec![None; channel_ids.len()];
        let mut in_flight = Vec::new();

        for (slot, &channel_id) in channel_ids.iter().enumerate() {
            let Some(channel) = self.registry.get(channel_id) else {
                warn!("reminder '{}': channel {channel_id} not found, skipping", payload.template_key);
                outcomes[slot] = Some(skipped("channel not found"));
                continue;
            };
            if !channel.enabled {
                debug!("reminder '{}': channel {channel_id} disabled", payload.template_key);
                outcomes[slot] = Some(skipped("channel disabled"));
                continue;
            }
            if let Some(reason) = channel.config.missing_target() {
                outcomes[slot] = Some(skipped(reason));
                continue;
            }
            let Some(sender) = self.senders.get(&channel.kind()).cloned() else {
                outcomes[slot] = Some(skipped(&format!(
                    "no sender for {} channels",
                    channel.kind()
                )));
                continue;
            };

            let payload = Arc::clone(&payload);
            let handle = tokio::spawn(async move { sender.send(&channel.config, &payload).await });
            in_flight.push((slot, handle));
        }

        for (slot, handle) in in_flight {
            let status = match handle.await {
                Ok(Ok(())) => DeliveryStatus::Delivered,
                Ok(Err(e)) => DeliveryStatus::Failed {
                    error: e.to_string(),
                },
                Err(join_err) => DeliveryStatus::Failed {
                    error: format!("send task aborted: {join_err}"),
                },
            };
            if let DeliveryStatus::Failed { error } = &status {
                warn!(
                    "reminder '{}': channel {} failed: {error}",
                    payload.template_key, channel_ids[slot]
                );
            }
            outcomes[slot] = Some(status);
        }

        DispatchReport {
            outcomes: channel_ids
                .iter()
                .zip(outcomes)
                .map(|(&channel_id, status)| ChannelOutcome {
                    channel_id,
                    status: status.unwrap_or_else(|| skipped("not attempted")),
                })
                .collect(),
        }
    }
}

fn skipped(reason: &str) -> DeliveryStatus {
    DeliveryStatus::Skipped {
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::channels::{ChannelConfig, NotificationChannel};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Webhook stand-in that fails for urls containing "fail" and panics for "panic".
    #[derive(Default)]
    struct RecordingSender {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        async fn send(&self, config: &ChannelConfig, _payload: &ReminderPayload) -> anyhow::Result<()> {
            let ChannelConfig::Webhook { url: Some(url) } = config else {
                anyhow::bail!("unexpected config");
            };
            self.seen.lock().unwrap().push(url.clone());
            if url.contains("panic") {
                panic!("sender blew up");
            }
            if url.contains("fail") {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    fn payload() -> ReminderPayload {
        ReminderPayload {
            title: "t".to_owned(),
            body: "b".to_owned(),
            metadata: serde_json::json!({}),
            template_key: "t1".to_owned(),
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_siblings() {
        let registry = ChannelRegistry::new(vec![
            NotificationChannel::webhook(1, "https://example.com/fail"),
            NotificationChannel::webhook(2, "https://example.com/ok"),
        ]);
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = Dispatcher::new(registry).with_sender(sender.clone());

        let report = dispatcher.dispatch(&[1, 2], payload()).await;

        assert!(matches!(report.status_of(1), Some(DeliveryStatus::Failed { .. })));
        assert_eq!(report.status_of(2), Some(&DeliveryStatus::Delivered));
        assert_eq!(sender.seen.lock().unwrap().len(), 2);
        assert_eq!(report.outcomes[0].channel_id, 1);
        assert_eq!(report.outcomes[1].channel_id, 2);
    }

    #[tokio::test]
    async fn panicking_sender_is_isolated() {
        let registry = ChannelRegistry::new(vec![
            NotificationChannel::webhook(1, "https://example.com/panic"),
            NotificationChannel::webhook(2, "https://example.com/ok"),
        ]);
        let dispatcher =
            Dispatcher::new(registry).with_sender(Arc::new(RecordingSender::default()));

        let report = dispatcher.dispatch(&[1, 2], payload()).await;

        assert_eq!(report.failed(), 1);
        assert_eq!(report.delivered(), 1);
    }

    #[tokio::test]
    async fn unknown_disabled_and_unroutable_channels_are_skipped() {
        let mut disabled = NotificationChannel::webhook(2, "https://example.com/ok");
        disabled.enabled = false;
        let registry = ChannelRegistry::new(vec![
            disabled,
            NotificationChannel::email(3, vec!["a@b.c".to_owned()]),
            NotificationChannel {
                id: 4,
                name: "sms".to_owned(),
                enabled: true,
                config: ChannelConfig::Other {
                    kind: "sms".to_owned(),
                },
            },
            NotificationChannel {
                id: 5,
                name: "empty".to_owned(),
                enabled: true,
                config: ChannelConfig::Webhook { url: None },
            },
        ]);
        let dispatcher =
            Dispatcher::new(registry).with_sender(Arc::new(RecordingSender::default()));

        let report = dispatcher.dispatch(&[99, 2, 3, 4, 5], payload()).await;

        assert_eq!(report.skipped(), 5);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn empty_channel_list_yields_empty_report() {
        let dispatcher = Dispatcher::new(ChannelRegistry::default());
        let report = dispatcher.dispatch(&[], payload()).await;
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn report_serializes_with_flat_status() {
        let report = DispatchReport {
            outcomes: vec![ChannelOutcome {
                channel_id: 1,
                status: DeliveryStatus::Failed {
                    error: "boom".to_owned(),
                },
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["channelId"], 1);
        assert_eq!(json["outcomes"][0]["status"], "failed");
        assert_eq!(json["outcomes"][0]["error"], "boom");
    }
}
