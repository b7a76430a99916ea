//! Supervisor configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::instance::SessionSize;
use crate::{AppError, Result};

/// Keystroke batching policy, immutable once the coalescer is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Whether literal characters are merged before delivery.
    pub enabled: bool,
    /// Maximum time a literal byte may wait before being flushed.
    pub flush_interval: Duration,
    /// Pending size (bytes) that forces a flush.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            flush_interval: Duration::from_millis(default_flush_interval_ms()),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// `[batch]` table as written in TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchSection {
    /// Whether batching is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Flush interval in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Pending size that forces a flush.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            enabled: false,
            flush_interval_ms: default_flush_interval_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// `[session]` table: default pane dimensions and scrollback.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionSection {
    /// Pane width in columns.
    #[serde(default = "default_width")]
    pub width: u16,
    /// Pane height in rows.
    #[serde(default = "default_height")]
    pub height: u16,
    /// Scrollback lines kept by the multiplexer.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_flush_interval_ms() -> u64 {
    10
}

fn default_max_batch_size() -> usize {
    64
}

fn default_width() -> u16 {
    200
}

fn default_height() -> u16 {
    30
}

fn default_history_limit() -> u32 {
    50_000
}

fn default_tmux_binary() -> PathBuf {
    PathBuf::from("tmux")
}

fn default_socket_prefix() -> String {
    "tmux-supervisor".into()
}

fn default_max_history() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    256
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_graceful_stop_timeout_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// Supervisor configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Multiplexer executable.
    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: PathBuf,
    /// Prefix for per-instance socket names; also the shared socket name.
    #[serde(default = "default_socket_prefix")]
    pub socket_prefix: String,
    /// Input history capacity; 0 disables tracking.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Bound of the batch dispatcher queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Timeout for each one-shot multiplexer invocation.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Grace period between interrupt and forced teardown.
    #[serde(default = "default_graceful_stop_timeout_ms")]
    pub graceful_stop_timeout_ms: u64,
    /// Use the persistent control-mode channel instead of one-shot sends.
    #[serde(default = "default_true")]
    pub persistent_control: bool,
    /// Keystroke batching settings.
    #[serde(default)]
    pub batch: BatchSection,
    /// Default session dimensions.
    #[serde(default)]
    pub session: SessionSection,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tmux_binary: default_tmux_binary(),
            socket_prefix: default_socket_prefix(),
            max_history: default_max_history(),
            queue_capacity: default_queue_capacity(),
            command_timeout_ms: default_command_timeout_ms(),
            graceful_stop_timeout_ms: default_graceful_stop_timeout_ms(),
            persistent_control: true,
            batch: BatchSection::default(),
            session: SessionSection::default(),
        }
    }
}

impl SupervisorConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Batching policy derived from the `[batch]` table.
    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            enabled: self.batch.enabled,
            flush_interval: Duration::from_millis(self.batch.flush_interval_ms),
            max_batch_size: self.batch.max_batch_size,
        }
    }

    /// Default session dimensions derived from the `[session]` table.
    #[must_use]
    pub fn default_size(&self) -> SessionSize {
        SessionSize {
            width: self.session.width,
            height: self.session.height,
            history_limit: self.session.history_limit,
        }
    }

    /// Per-invocation multiplexer timeout.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Grace period used by the graceful-shutdown sequence.
    #[must_use]
    pub fn graceful_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_stop_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.socket_prefix.trim().is_empty() {
            return Err(AppError::Config("socket_prefix must not be empty".into()));
        }

        if self.queue_capacity == 0 {
            return Err(AppError::Config(
                "queue_capacity must be greater than zero".into(),
            ));
        }

        if self.command_timeout_ms == 0 {
            return Err(AppError::Config(
                "command_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.batch.enabled && self.batch.max_batch_size == 0 {
            return Err(AppError::Config(
                "batch.max_batch_size must be greater than zero when batching is enabled".into(),
            ));
        }

        if self.session.width == 0 || self.session.height == 0 {
            return Err(AppError::Config(
                "session width and height must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
