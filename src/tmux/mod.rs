//! Multiplexer command surface.
//!
//! Every operation targets an explicit socket (`tmux -L <socket>`). Each
//! supervised instance owns a dedicated socket so a crashed server cannot
//! take down sessions belonging to other instances; the bare prefix names
//! the shared socket used for global operations.

pub mod cli;

use std::path::PathBuf;

use crate::models::instance::SessionSize;
use crate::{BoxFuture, Result};

pub use cli::TmuxCli;

/// Socket dedicated to one instance: `<prefix>-<instance_id>`.
#[must_use]
pub fn instance_socket(prefix: &str, instance_id: &str) -> String {
    format!("{}-{}", encode_name(prefix), encode_name(instance_id))
}

/// Shared socket for operations not tied to an instance.
#[must_use]
pub fn global_socket(prefix: &str) -> String {
    encode_name(prefix)
}

/// Session name for an instance.
#[must_use]
pub fn session_name(prefix: &str, instance_id: &str) -> String {
    format!("{}-{}", encode_name(prefix), encode_name(instance_id))
}

/// Make `raw` safe as a socket or session name.
///
/// Dots and colons are target separators in the multiplexer's target
/// syntax. ASCII letters, digits, and `-` pass through; every other byte
/// becomes `_` plus two lowercase hex digits. `_` itself is escaped, so
/// distinct inputs always give distinct names.
#[must_use]
pub fn encode_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

/// Where a `set-option` applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionScope {
    /// Server-global (`-g`).
    Global,
    /// A single session (`-t <name>`).
    Session(String),
    /// The windows of a session (`-w -t <name>`).
    Window(String),
}

impl OptionScope {
    /// Command-line flags for this scope.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Global => vec!["-g".into()],
            Self::Session(name) => vec!["-t".into(), name.clone()],
            Self::Window(name) => vec!["-w".into(), "-t".into(), name.clone()],
        }
    }
}

/// Parameters for `new-session -d`.
///
/// The history limit only reaches panes created after it is set, and a
/// fresh socket has no server to set it on. [`args`](Self::args) therefore
/// chains `set-option -g history-limit` and `new-session` into one client
/// invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// Session name.
    pub name: String,
    /// Pane size and scrollback.
    pub size: SessionSize,
    /// Start directory (`-c`).
    pub work_dir: Option<PathBuf>,
}

impl NewSession {
    /// Command-line arguments after the socket selector.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "set-option".to_owned(),
            "-g".to_owned(),
            "history-limit".to_owned(),
            self.size.history_limit.to_string(),
            ";".to_owned(),
            "new-session".to_owned(),
            "-d".to_owned(),
            "-s".to_owned(),
            self.name.clone(),
            "-x".to_owned(),
            self.size.width.to_string(),
            "-y".to_owned(),
            self.size.height.to_string(),
        ];
        if let Some(ref dir) = self.work_dir {
            args.push("-c".to_owned());
            args.push(dir.to_string_lossy().into_owned());
        }
        args
    }
}

/// Operations the supervisor issues against the multiplexer.
///
/// Not-found conditions (missing session, no server on the socket) are
/// reported as [`AppError::SessionNotFound`](crate::AppError::SessionNotFound).
pub trait Multiplexer: Send + Sync {
    /// `has-session -t <session>`; a missing session or server is `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the multiplexer cannot be invoked.
    fn has_session<'a>(&'a self, socket: &'a str, session: &'a str)
        -> BoxFuture<'a, Result<bool>>;

    /// `set-option -g history-limit <n> ; new-session -d -s <name> -x <w> -y <h> [-c <dir>]`.
    ///
    /// Starts the server when the socket has none.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Multiplexer` if creation fails.
    fn new_session<'a>(&'a self, socket: &'a str, spec: &'a NewSession)
        -> BoxFuture<'a, Result<()>>;

    /// `kill-session -t <session>`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is already gone.
    fn kill_session<'a>(&'a self, socket: &'a str, session: &'a str)
        -> BoxFuture<'a, Result<()>>;

    /// `kill-server`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if no server runs on the socket.
    fn kill_server<'a>(&'a self, socket: &'a str) -> BoxFuture<'a, Result<()>>;

    /// `set-option [scope] <key> <value>`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Multiplexer` if the option is rejected.
    fn set_option<'a>(
        &'a self,
        socket: &'a str,
        scope: &'a OptionScope,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// `send-keys -t <session> [-l] <keys>`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is gone.
    fn send_keys<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
        keys: &'a str,
        literal: bool,
    ) -> BoxFuture<'a, Result<()>>;

    /// `capture-pane -t <session> -p -e [-S -<n>]`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` if the session is gone.
    fn capture_pane<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
        scrollback: Option<u32>,
    ) -> BoxFuture<'a, Result<String>>;

    /// `display-message -t <session> -p '#{pane_pid}'`; `None` when unresolvable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the multiplexer cannot be invoked.
    fn pane_pid<'a>(&'a self, socket: &'a str, session: &'a str)
        -> BoxFuture<'a, Result<Option<i32>>>;
}
