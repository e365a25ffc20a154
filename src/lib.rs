//! SadhanaBoard: progress autosave and reminder scheduling.
//!
//! # Architecture
//!
//! - **Autosave**: a per-subject controller that debounces progress updates
//!   into single merged writes against a persistence API
//! - **Reminders**: template CRUD that keeps exactly one cron job alive per
//!   enabled, cron-bearing template
//! - **Scheduler**: the tokio job table behind reminders
//! - **Channels**: webhook and email delivery with per-channel failure isolation
//! - **Server**: the axum HTTP surface for both halves

pub mod autosave;
pub mod channels;
pub mod config;
pub mod error;
pub mod reminders;
pub mod scheduler;
pub mod server;

pub use config::BoardConfig;
pub use error::{BoardError, Result};
