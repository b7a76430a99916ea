//! Error types shared across the supervisor.

use std::fmt::{Display, Formatter};

/// Shared supervisor result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Supervisor error enumeration covering all failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Caller supplied an unusable argument (empty id, zero size, ...).
    InvalidArgument(String),
    /// Instance is already starting, running, or ready.
    AlreadyRunning(String),
    /// Instance is not marked running.
    NotRunning(String),
    /// The named multiplexer session (or its server) does not exist.
    SessionNotFound(String),
    /// Readiness was not observed before the deadline.
    ReadyTimeout(String),
    /// A control-mode write did not complete within its bound.
    WriteTimeout(String),
    /// Subprocess spawn, pipe, or file-system failure.
    Io(String),
    /// The multiplexer exited non-zero for a reason other than not-found.
    Multiplexer(String),
    /// Control-mode handshake or response failure.
    Protocol(String),
    /// Configuration parsing or validation failure.
    Config(String),
}

impl AppError {
    /// Whether the error means the target session or server is already gone.
    ///
    /// Shutdown paths swallow these silently and log everything else.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }

    /// Prefix the message with `context`, keeping the variant.
    #[must_use]
    pub fn wrap(self, context: &str) -> Self {
        match self {
            Self::InvalidArgument(msg) => Self::InvalidArgument(format!("{context}: {msg}")),
            Self::AlreadyRunning(msg) => Self::AlreadyRunning(format!("{context}: {msg}")),
            Self::NotRunning(msg) => Self::NotRunning(format!("{context}: {msg}")),
            Self::SessionNotFound(msg) => Self::SessionNotFound(format!("{context}: {msg}")),
            Self::ReadyTimeout(msg) => Self::ReadyTimeout(format!("{context}: {msg}")),
            Self::WriteTimeout(msg) => Self::WriteTimeout(format!("{context}: {msg}")),
            Self::Io(msg) => Self::Io(format!("{context}: {msg}")),
            Self::Multiplexer(msg) => Self::Multiplexer(format!("{context}: {msg}")),
            Self::Protocol(msg) => Self::Protocol(format!("{context}: {msg}")),
            Self::Config(msg) => Self::Config(format!("{context}: {msg}")),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::NotRunning(msg) => write!(f, "not running: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::ReadyTimeout(msg) => write!(f, "ready timeout: {msg}"),
            Self::WriteTimeout(msg) => write!(f, "write timeout: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Multiplexer(msg) => write!(f, "multiplexer: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
