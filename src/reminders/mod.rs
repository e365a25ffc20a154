//! Reminder templates: definitions, persistence and lifecycle.
//!
//! Each enabled template with a valid cron expression has exactly one live
//! job in the [`crate::scheduler::ReminderScheduler`]. Create, update and
//! delete keep that invariant; updates reschedule unconditionally.

pub mod service;
pub mod store;
pub mod template;

pub use service::{InitSummary, JobsOverview, ReminderService, ScheduledTemplate, TriggerResult};
pub use store::{TemplatePage, TemplateStore};
pub use template::{Metadata, NewTemplate, ReminderTemplate, TemplateId, TemplatePatch};
