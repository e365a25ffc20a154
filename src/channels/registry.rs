//! In-memory channel directory shared by the dispatcher and the admin API.

use crate::channels::webhook::parse_webhook_url;
use crate::channels::{ChannelConfig, ChannelId, NotificationChannel};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cheaply cloneable handle to the channel directory.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<BTreeMap<ChannelId, NotificationChannel>>>,
}

impl ChannelRegistry {
    /// Build a registry seeded with `channels`. Later duplicates of an id win.
    pub fn new(channels: impl IntoIterator<Item = NotificationChannel>) -> Self {
        let map = channels.into_iter().map(|c| (c.id, c)).collect();
        Self {
            channels: Arc::new(RwLock::new(map)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ChannelId, NotificationChannel>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ChannelId, NotificationChannel>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a channel by id.
    pub fn get(&self, id: ChannelId) -> Option<NotificationChannel> {
        self.read().get(&id).cloned()
    }

    /// All channels ordered by id.
    pub fn list(&self) -> Vec<NotificationChannel> {
        self.read().values().cloned().collect()
    }

    /// Insert or replace a channel.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BoardError::Channel`] if a webhook url is present but invalid.
    pub fn upsert(&self, channel: NotificationChannel) -> crate::Result<()> {
        if let ChannelConfig::Webhook { url: Some(url) } = &channel.config
            && !url.trim().is_empty()
        {
            parse_webhook_url(url).map_err(|e| crate::BoardError::Channel(e.to_string()))?;
        }
        self.write().insert(channel.id, channel);
        Ok(())
    }

    /// Remove a channel. Returns `true` when it existed.
    pub fn remove(&self, id: ChannelId) -> bool {
        self.write().remove(&id).is_some()
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no channels are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn seeded_channels_are_listed_in_id_order() {
        let registry = ChannelRegistry::new(vec![
            NotificationChannel::webhook(5, "https://example.com/5"),
            NotificationChannel::email(2, vec!["a@b.c".to_owned()]),
        ]);
        let ids: Vec<_> = registry.list().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn upsert_replaces_and_validates() {
        let registry = ChannelRegistry::default();
        registry
            .upsert(NotificationChannel::webhook(1, "https://example.com/a"))
            .unwrap();
        registry
            .upsert(NotificationChannel::webhook(1, "https://example.com/b"))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get(1).unwrap().config,
            ChannelConfig::Webhook { url: Some(ref u) } if u.ends_with("/b")
        ));

        let bad = registry.upsert(NotificationChannel::webhook(2, "gopher://x"));
        assert!(matches!(bad, Err(crate::BoardError::Channel(_))));
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn clones_share_state() {
        let registry = ChannelRegistry::default();
        let other = registry.clone();
        other
            .upsert(NotificationChannel::email(9, vec!["x@y.z".to_owned()]))
            .unwrap();
        assert!(registry.get(9).is_some());
        assert!(registry.remove(9));
        assert!(!other.remove(9));
        assert!(other.is_empty());
    }
}
