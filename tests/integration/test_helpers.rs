//! Shared fakes for integration tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tmux_supervisor::lifecycle::{CommandBackend, LifecycleOptions, SessionLifecycle};
use tmux_supervisor::models::instance::AgentInstance;
use tmux_supervisor::tmux::{Multiplexer, NewSession, OptionScope};
use tmux_supervisor::{AppError, BoxFuture, Result};

pub const PREFIX: &str = "sup";

/// In-memory multiplexer that records every call as a flat string.
#[derive(Default)]
pub struct FakeMux {
    calls: Mutex<Vec<String>>,
    sessions: Mutex<HashSet<(String, String)>>,
    pane: Mutex<String>,
    pane_pid: Mutex<Option<i32>>,
    pub fail_new_session: AtomicBool,
    /// Milliseconds `new_session` sleeps before creating the session.
    pub new_session_delay_ms: AtomicU64,
}

impl FakeMux {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Index of the first call starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn add_session(&self, socket: &str, session: &str) {
        self.sessions
            .lock()
            .unwrap()
            .insert((socket.to_owned(), session.to_owned()));
    }

    pub fn remove_session(&self, socket: &str, session: &str) {
        self.sessions
            .lock()
            .unwrap()
            .remove(&(socket.to_owned(), session.to_owned()));
    }

    pub fn exists(&self, socket: &str, session: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .contains(&(socket.to_owned(), session.to_owned()))
    }

    pub fn set_pane(&self, text: &str) {
        *self.pane.lock().unwrap() = text.to_owned();
    }

    pub fn set_pane_pid(&self, pid: Option<i32>) {
        *self.pane_pid.lock().unwrap() = pid;
    }

    /// A server runs on `socket` while it hosts at least one session.
    pub fn server_running(&self, socket: &str) -> bool {
        self.sessions.lock().unwrap().iter().any(|(s, _)| s == socket)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn require(&self, socket: &str, session: &str) -> Result<()> {
        if self.exists(socket, session) {
            Ok(())
        } else {
            Err(AppError::SessionNotFound(format!("can't find session: {session}")))
        }
    }
}

impl Multiplexer for FakeMux {
    fn has_session<'a>(&'a self, socket: &'a str, session: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.record(format!("has-session {socket} {session}"));
            Ok(self.exists(socket, session))
        })
    }

    fn new_session<'a>(&'a self, socket: &'a str, spec: &'a NewSession) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(format!("new-session {socket} {}", spec.args().join(" ")));
            let delay = self.new_session_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_new_session.load(Ordering::SeqCst) {
                return Err(AppError::Multiplexer("duplicate session".into()));
            }
            self.add_session(socket, &spec.name);
            Ok(())
        })
    }

    fn kill_session<'a>(&'a self, socket: &'a str, session: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(format!("kill-session {socket} {session}"));
            self.require(socket, session)?;
            self.sessions
                .lock()
                .unwrap()
                .remove(&(socket.to_owned(), session.to_owned()));
            Ok(())
        })
    }

    fn kill_server<'a>(&'a self, socket: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(format!("kill-server {socket}"));
            let mut sessions = self.sessions.lock().unwrap();
            let before = sessions.len();
            sessions.retain(|(s, _)| s != socket);
            if before == sessions.len() {
                return Err(AppError::SessionNotFound(format!(
                    "no server running on {socket}"
                )));
            }
            Ok(())
        })
    }

    fn set_option<'a>(
        &'a self,
        socket: &'a str,
        scope: &'a OptionScope,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(format!(
                "set-option {socket} {} {key} {value}",
                scope.args().join(" ")
            ));
            if !self.server_running(socket) {
                return Err(AppError::SessionNotFound(format!(
                    "error connecting to /tmp/tmux-0/{socket} (No such file or directory)"
                )));
            }
            Ok(())
        })
    }

    fn send_keys<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
        keys: &'a str,
        literal: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mode = if literal { "literal" } else { "key" };
            self.record(format!("send-keys {socket} {session} {mode} {keys}"));
            self.require(socket, session)
        })
    }

    fn capture_pane<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
        _scrollback: Option<u32>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.record(format!("capture-pane {socket} {session}"));
            self.require(socket, session)?;
            Ok(self.pane.lock().unwrap().clone())
        })
    }

    fn pane_pid<'a>(&'a self, socket: &'a str, session: &'a str) -> BoxFuture<'a, Result<Option<i32>>> {
        Box::pin(async move {
            self.record(format!("pane-pid {socket} {session}"));
            Ok(*self.pane_pid.lock().unwrap())
        })
    }
}

pub fn backend() -> Arc<CommandBackend> {
    Arc::new(CommandBackend::new("agent", Vec::new()).with_resume_args(vec!["--continue".into()]))
}

pub fn lifecycle(mux: &Arc<FakeMux>) -> SessionLifecycle {
    SessionLifecycle::new(
        Arc::clone(mux) as Arc<dyn Multiplexer>,
        backend(),
        LifecycleOptions::default(),
    )
}

pub fn instance(id: &str, dir: &Path) -> AgentInstance {
    AgentInstance::new(id, PREFIX, dir.to_path_buf(), format!("task for {id}"))
}
