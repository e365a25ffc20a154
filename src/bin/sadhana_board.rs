//! SadhanaBoard service binary.
//!
//! Usage: `sadhana-board [CONFIG_PATH]`. Without a path the default config
//! location is used; a missing file means defaults.
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`), and also to a
//! daily rolling file when `logging.dir` is configured.

use sadhana_board::autosave::ProgressStore;
use sadhana_board::channels::{ChannelRegistry, Dispatcher};
use sadhana_board::config::{BoardConfig, LoggingConfig};
use sadhana_board::reminders::{ReminderService, TemplateStore};
use sadhana_board::scheduler::ReminderScheduler;
use sadhana_board::server::{AppState, BoardServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(BoardConfig::default_config_path);
    let config = BoardConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("cannot load {}: {e}", config_path.display()))?;

    let _log_guard = init_tracing(&config.logging);
    tracing::info!("sadhana-board starting (config: {})", config_path.display());

    let registry = ChannelRegistry::new(config.channels.clone());
    let dispatcher = Dispatcher::from_config(registry, &config.delivery)?;
    let store = match &config.reminders.state_path {
        Some(path) => TemplateStore::open(path)?,
        None => TemplateStore::in_memory(),
    };
    let scheduler = ReminderScheduler::new(dispatcher);
    let reminders = Arc::new(
        ReminderService::new(store, scheduler)
            .with_default_page_size(config.reminders.default_page_size),
    );

    let summary = reminders.initialize_scheduled_jobs()?;
    tracing::info!(
        "registered {} reminder jobs ({} with invalid cron)",
        summary.scheduled,
        summary.invalid_cron
    );

    let progress = match &config.progress.state_path {
        Some(path) => ProgressStore::open(path)?,
        None => ProgressStore::in_memory(),
    };

    let server = BoardServer::start(&config.server, AppState::new(Arc::clone(&reminders), progress)).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown();
    reminders.shutdown();
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sadhana-board.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}
