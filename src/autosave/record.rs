//! Progress record and partial update types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the tracked item (e.g. a book).
pub type SubjectId = u64;

/// Authoritative progress for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub subject_id: SubjectId,
    /// Serialized reader cursor (e.g. an EPUB CFI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Completion, 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// Empty record for `subject_id`.
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            position: None,
            page: None,
            percent: None,
            updated_at: None,
        }
    }
}

/// Partial progress write. Absent fields leave the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

impl ProgressUpdate {
    /// Update setting only the page.
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    /// Update setting only the percentage.
    pub fn percent(percent: f64) -> Self {
        Self {
            percent: Some(percent),
            ..Self::default()
        }
    }

    /// Update setting only the cursor.
    pub fn position(position: impl Into<String>) -> Self {
        Self {
            position: Some(position.into()),
            ..Self::default()
        }
    }

    /// Builder form of [`ProgressUpdate::percent`].
    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent);
        self
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.page.is_none() && self.percent.is_none()
    }

    /// Fold `newer` into `self`; set fields in `newer` win.
    pub fn merge(&mut self, newer: ProgressUpdate) {
        if newer.position.is_some() {
            self.position = newer.position;
        }
        if newer.page.is_some() {
            self.page = newer.page;
        }
        if newer.percent.is_some() {
            self.percent = newer.percent;
        }
    }

    /// Write the set fields into `record`. Percent is clamped to 0–100.
    pub fn apply_to(&self, record: &mut ProgressRecord) {
        if let Some(position) = &self.position {
            record.position = Some(position.clone());
        }
        if let Some(page) = self.page {
            record.page = Some(page);
        }
        if let Some(percent) = self.percent {
            let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
            record.percent = Some(percent);
        }
    }
}
