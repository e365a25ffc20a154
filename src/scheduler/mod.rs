//! Cron job scheduler for reminder templates.
//!
//! Keeps one tokio job per enabled, cron-bearing template. The job table is
//! owned by [`ReminderScheduler`]; every register/cancel for a template id
//! happens under a single lock acquisition.

pub mod cron;
pub mod runner;
pub mod tasks;

pub use cron::CronSchedule;
pub use runner::ReminderScheduler;
pub use tasks::{JobStatus, ScheduleStatus};
