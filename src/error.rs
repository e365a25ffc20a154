//! Error types for the SadhanaBoard service.

/// Top-level error type for autosave, reminders and delivery.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Template or progress store error (read, write, serialization).
    #[error("store error: {0}")]
    Store(String),

    /// A template with this key already exists.
    #[error("duplicate template key: {0}")]
    DuplicateKey(String),

    /// No template exists with this id.
    #[error("template {0} not found")]
    TemplateNotFound(u64),

    /// Request failed validation (blank key, malformed field).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Scheduler error (job registration, cron evaluation).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Notification channel configuration or delivery error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Progress persistence API error.
    #[error("progress error: {0}")]
    Progress(String),

    /// HTTP server error.
    #[error("http error: {0}")]
    Http(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BoardError>;
