//! Persistent control-mode sender with one-shot fallback.
//!
//! [`ControlChannel`] keeps one `tmux -C` connection per bound session so the
//! keystroke hot path writes a line instead of spawning a process. A stuck or
//! failed write disconnects, reconnects once, and retries once; anything
//! beyond that is delegated to the fallback [`Sender`].

pub mod connection;
pub mod escape;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info_span, warn, Instrument};

use crate::input::Sender;
use crate::{AppError, BoxFuture, Result};

pub use connection::Connection;
pub use escape::{escape_for_control_mode, send_keys_command};

/// Writes attempted per send: the first and one retry.
const MAX_WRITES: usize = 2;

/// Connections opened per send: the first and one reconnect.
const MAX_OPENS: usize = 2;

/// [`Sender`] backed by a lazily-opened control-mode connection.
pub struct ControlChannel {
    binary: PathBuf,
    socket: String,
    session: String,
    write_timeout: Duration,
    fallback: Arc<dyn Sender>,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("socket", &self.socket)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ControlChannel {
    /// Build a channel bound to `session` on `socket`.
    ///
    /// Nothing is spawned until the first send.
    #[must_use]
    pub fn new(
        binary: impl Into<PathBuf>,
        socket: impl Into<String>,
        session: impl Into<String>,
        fallback: Arc<dyn Sender>,
    ) -> Self {
        Self {
            binary: binary.into(),
            socket: socket.into(),
            session: session.into(),
            write_timeout: connection::WRITE_TIMEOUT,
            fallback,
            conn: Mutex::new(None),
        }
    }

    /// Override the per-write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Session this channel is bound to.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Whether a live connection is currently held.
    pub async fn connected(&self) -> bool {
        let mut guard = self.conn.lock().await;
        guard.as_mut().is_some_and(Connection::is_alive)
    }

    /// Tear down the connection, if any. Idempotent.
    pub async fn close(&self) {
        let taken = self.conn.lock().await.take();
        if let Some(conn) = taken {
            conn.shutdown().await;
        }
    }

    /// Write through the persistent connection, reconnecting once on failure.
    ///
    /// The connection lock is held while a line is written, so writes from
    /// concurrent callers reach the server in lock-acquisition order.
    /// Connecting happens outside the lock.
    async fn send_persistent(&self, keys: &str, literal: bool) -> Result<()> {
        let line = send_keys_command(&self.session, keys, literal);
        let mut writes = 0;
        let mut opens = 0;

        loop {
            let mut guard = self.conn.lock().await;
            let failure = match guard.as_mut() {
                Some(conn) => {
                    if conn.is_alive() {
                        writes += 1;
                        match conn.write_line(&line, self.write_timeout).await {
                            Ok(()) => return Ok(()),
                            Err(err) => Some(err),
                        }
                    } else {
                        Some(AppError::Protocol("control mode process exited".into()))
                    }
                }
                None => None,
            };
            let stale = guard.take();
            drop(guard);
            if let Some(conn) = stale {
                conn.shutdown().await;
            }

            if let Some(err) = failure {
                if writes >= MAX_WRITES || opens >= MAX_OPENS {
                    return Err(err);
                }
                warn!(session = %self.session, %err, "control mode connection failed, reconnecting");
            }

            opens += 1;
            let fresh = Connection::open(&self.binary, &self.socket, &self.session).await?;
            let mut guard = self.conn.lock().await;
            let surplus = if guard.is_none() {
                *guard = Some(fresh);
                None
            } else {
                Some(fresh)
            };
            drop(guard);
            // Another caller connected first; keep theirs.
            if let Some(conn) = surplus {
                conn.shutdown().await;
            }
        }
    }
}

impl Sender for ControlChannel {
    fn send_keys<'a>(
        &'a self,
        session: &'a str,
        keys: &'a str,
        literal: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(
            async move {
                if session != self.session {
                    debug!(
                        bound = %self.session,
                        requested = session,
                        "session mismatch, using fallback sender"
                    );
                    return self.fallback.send_keys(session, keys, literal).await;
                }

                match self.send_persistent(keys, literal).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        warn!(session, %err, "persistent send failed, using fallback sender");
                        self.fallback.send_keys(session, keys, literal).await
                    }
                }
            }
            .instrument(info_span!("control_send", socket = %self.socket)),
        )
    }
}
