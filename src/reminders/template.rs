//! Reminder template definitions.

use crate::channels::{ChannelId, ReminderPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Numeric template identifier, generated by the store.
pub type TemplateId = u64;

/// Opaque key-value metadata carried through to channels.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Title used when a template has none.
pub const DEFAULT_REMINDER_TITLE: &str = "Reminder";

/// A stored reminder template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTemplate {
    pub id: TemplateId,
    /// Unique, stable key.
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub schedule_cron: Option<String>,
    /// Channels in dispatch order, without duplicates.
    #[serde(default)]
    pub channel_ids: Vec<ChannelId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl ReminderTemplate {
    /// An enabled template with no schedule and no channels.
    pub fn new(id: TemplateId, key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            key: key.into(),
            title: String::new(),
            body: String::new(),
            schedule_cron: None,
            channel_ids: Vec::new(),
            enabled: true,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a stored template from a create request.
    pub(crate) fn from_new(id: TemplateId, new: NewTemplate) -> Self {
        let mut template = Self::new(id, new.key.trim());
        template.title = new.title;
        template.body = new.body;
        template.schedule_cron = normalize_cron(new.schedule_cron);
        template.channel_ids = dedup_channel_ids(new.channel_ids);
        template.enabled = new.enabled;
        template.metadata = new.metadata;
        template
    }

    /// Payload delivered to each channel when this template fires.
    pub fn payload(&self) -> ReminderPayload {
        let title = if self.title.trim().is_empty() {
            DEFAULT_REMINDER_TITLE.to_owned()
        } else {
            self.title.clone()
        };
        ReminderPayload {
            title,
            body: self.body.clone(),
            metadata: serde_json::Value::Object(self.metadata.clone()),
            template_key: self.key.clone(),
        }
    }

    /// Whether this template should have a live job, cron validity aside.
    pub fn wants_schedule(&self) -> bool {
        self.enabled && self.schedule_cron.is_some()
    }
}

/// Create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, alias = "schedule_cron")]
    pub schedule_cron: Option<String>,
    #[serde(default, alias = "channel_ids")]
    pub channel_ids: Vec<ChannelId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewTemplate {
    /// Enabled template request with the given key and nothing else set.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: String::new(),
            body: String::new(),
            schedule_cron: None,
            channel_ids: Vec::new(),
            enabled: true,
            metadata: Metadata::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn cron(mut self, cron: impl Into<String>) -> Self {
        self.schedule_cron = Some(cron.into());
        self
    }

    pub fn channels(mut self, ids: impl IntoIterator<Item = ChannelId>) -> Self {
        self.channel_ids = ids.into_iter().collect();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Partial update. Absent fields are left unchanged; `scheduleCron: null`
/// clears the schedule.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePatch {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, alias = "schedule_cron", deserialize_with = "double_option")]
    pub schedule_cron: Option<Option<String>>,
    #[serde(default, alias = "channel_ids")]
    pub channel_ids: Option<Vec<ChannelId>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl TemplatePatch {
    /// `true` when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
            && self.title.is_none()
            && self.body.is_none()
            && self.schedule_cron.is_none()
            && self.channel_ids.is_none()
            && self.enabled.is_none()
            && self.metadata.is_none()
    }

    /// Apply to `template`, bumping `updated_at`.
    pub(crate) fn apply(self, template: &mut ReminderTemplate) {
        if let Some(key) = self.key {
            template.key = key.trim().to_owned();
        }
        if let Some(title) = self.title {
            template.title = title;
        }
        if let Some(body) = self.body {
            template.body = body;
        }
        if let Some(cron) = self.schedule_cron {
            template.schedule_cron = normalize_cron(cron);
        }
        if let Some(ids) = self.channel_ids {
            template.channel_ids = dedup_channel_ids(ids);
        }
        if let Some(enabled) = self.enabled {
            template.enabled = enabled;
        }
        if let Some(metadata) = self.metadata {
            template.metadata = metadata;
        }
        template.updated_at = Utc::now();
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn normalize_cron(cron: Option<String>) -> Option<String> {
    cron.map(|c| c.trim().to_owned()).filter(|c| !c.is_empty())
}

fn dedup_channel_ids(ids: Vec<ChannelId>) -> Vec<ChannelId> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
