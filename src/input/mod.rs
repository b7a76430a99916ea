//! Keystroke delivery.
//!
//! The [`Sender`] trait is the single seam between callers that produce
//! input and the mechanism that delivers it to a multiplexer session. Two
//! implementations exist: [`OneShotSender`] spawns one `send-keys`
//! subprocess per call, and
//! [`ControlChannel`](crate::control::ControlChannel) keeps a persistent
//! control-mode connection and falls back to a one-shot sender.

pub mod coalescer;
mod dispatcher;
pub mod keys;

use std::sync::Arc;

use crate::tmux::Multiplexer;
use crate::{BoxFuture, Result};

pub use coalescer::{CoalescerOptions, InputCoalescer};

/// Delivers keys or literal text to a multiplexer session.
pub trait Sender: Send + Sync {
    /// Send `keys` to `session`; `literal` disables key-name lookup.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying delivery mechanism.
    fn send_keys<'a>(
        &'a self,
        session: &'a str,
        keys: &'a str,
        literal: bool,
    ) -> BoxFuture<'a, Result<()>>;
}

/// [`Sender`] that runs one `send-keys` invocation per call.
#[derive(Clone)]
pub struct OneShotSender {
    mux: Arc<dyn Multiplexer>,
    socket: String,
}

impl std::fmt::Debug for OneShotSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotSender")
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

impl OneShotSender {
    /// Build a sender bound to `socket`.
    #[must_use]
    pub fn new(mux: Arc<dyn Multiplexer>, socket: impl Into<String>) -> Self {
        Self {
            mux,
            socket: socket.into(),
        }
    }
}

impl Sender for OneShotSender {
    fn send_keys<'a>(
        &'a self,
        session: &'a str,
        keys: &'a str,
        literal: bool,
    ) -> BoxFuture<'a, Result<()>> {
        self.mux.send_keys(&self.socket, session, keys, literal)
    }
}
