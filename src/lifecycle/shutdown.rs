//! Canonical graceful-shutdown sequence.
//!
//! snapshot tree → interrupt → wait for root exit → kill session →
//! kill server → force-kill survivors.
//!
//! The kill-server step only runs on a dedicated instance socket. The shared
//! socket hosts unrelated sessions, so there only the target session goes.
//!
//! Best-effort by contract: nothing is returned, already-gone conditions are
//! logged at debug, anything else at warn. Safe on sessions and sockets that
//! no longer exist, and safe to repeat.

use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::key_event::KeyEvent;
use crate::process;
use crate::tmux::Multiplexer;
use crate::Result;

/// Who else lives on the socket being shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerScope {
    /// The socket belongs to this session alone; its server is killed too.
    Dedicated,
    /// The socket is shared; the server is left running.
    Shared,
}

/// Stop `session` on `socket`, escalating from Ctrl+C to SIGKILL.
pub async fn graceful_shutdown(
    mux: &dyn Multiplexer,
    socket: &str,
    session: &str,
    grace: Duration,
    scope: ServerScope,
) {
    async move {
        let pids = process::snapshot(mux, socket, session).await;
        debug!(pids = ?pids, "process snapshot taken");

        log_step(
            "interrupt",
            mux.send_keys(socket, session, KeyEvent::INTERRUPT_KEY, false)
                .await,
        );

        if let Some(&root) = pids.first() {
            if process::wait_for_exit(root, grace).await {
                debug!(pid = root, "root process exited after interrupt");
            } else {
                debug!(pid = root, "root process outlived grace period");
            }
        }

        log_step("kill-session", mux.kill_session(socket, session).await);
        match scope {
            ServerScope::Dedicated => log_step("kill-server", mux.kill_server(socket).await),
            ServerScope::Shared => debug!("shared socket, server left running"),
        }

        let killed = process::ensure_killed(&pids);
        if killed.is_empty() {
            info!("session shut down");
        } else {
            info!(killed = ?killed, "session shut down; survivors force-killed");
        }
    }
    .instrument(info_span!("graceful_shutdown", socket, session))
    .await;
}

fn log_step(step: &str, result: Result<()>) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_gone() => debug!(step, %err, "target already gone"),
        Err(err) => warn!(step, %err, "shutdown step failed"),
    }
}
