//! Configuration types for the SadhanaBoard service.

use crate::channels::NotificationChannel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Client-side progress autosave settings.
    pub autosave: AutosaveConfig,
    /// Server-side progress store settings.
    pub progress: ProgressConfig,
    /// Reminder template store and scheduler settings.
    pub reminders: ReminderConfig,
    /// Outbound notification delivery settings.
    pub delivery: DeliveryConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Notification channels available to reminder templates.
    pub channels: Vec<NotificationChannel>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
        }
    }
}

/// Progress autosave configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Inactivity delay before buffered updates are flushed, in milliseconds.
    pub delay_ms: u64,
    /// Base URL of the progress persistence API.
    pub api_base_url: String,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            api_base_url: "http://127.0.0.1:8787".to_owned(),
        }
    }
}

impl AutosaveConfig {
    /// The debounce window as a [`std::time::Duration`].
    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delay_ms)
    }
}

/// Server-side progress store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// JSON file holding progress records (None = in-memory only).
    pub state_path: Option<PathBuf>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            state_path: Some(default_data_dir().join("progress.json")),
        }
    }
}

/// Reminder template configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// JSON file holding reminder templates (None = in-memory only).
    pub state_path: Option<PathBuf>,
    /// Page size used when a list request gives no limit.
    pub default_page_size: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            state_path: Some(default_data_dir().join("templates.json")),
            default_page_size: 50,
        }
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Per-request timeout for webhook and mail relay calls, in seconds.
    pub timeout_secs: u64,
    /// HTTP mail relay endpoint used by email channels.
    pub email_relay_url: Option<String>,
    /// Sender address passed to the mail relay.
    pub email_from: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            email_relay_url: None,
            email_from: "reminders@sadhanaboard.local".to_owned(),
        }
    }
}

impl DeliveryConfig {
    /// The request timeout as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files (None = stderr only).
    pub dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sadhana-board")
}

impl BoardConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BoardError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BoardError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sadhana-board/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sadhana-board").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sadhana-board")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sadhana-board/config.toml")
        }
    }
}
