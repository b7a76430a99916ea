//! Readiness predicates polled by
//! [`SessionLifecycle::wait_for_ready`](super::SessionLifecycle::wait_for_ready).

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::models::instance::Instance;
use crate::tmux::Multiplexer;
use crate::BoxFuture;

/// Decides whether a started instance is ready for input.
pub trait ReadinessProbe: Send + Sync {
    /// Evaluate readiness once. Errors count as "not ready".
    fn is_ready<'a>(&'a self, instance: &'a dyn Instance) -> BoxFuture<'a, bool>;
}

/// Ready when the instance is marked running and its session exists.
#[derive(Clone)]
pub struct SessionAliveProbe {
    mux: Arc<dyn Multiplexer>,
}

impl SessionAliveProbe {
    /// Probe sessions through `mux`.
    #[must_use]
    pub fn new(mux: Arc<dyn Multiplexer>) -> Self {
        Self { mux }
    }
}

impl ReadinessProbe for SessionAliveProbe {
    fn is_ready<'a>(&'a self, instance: &'a dyn Instance) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if !instance.is_running() {
                return false;
            }
            match self
                .mux
                .has_session(instance.socket_name(), instance.session_name())
                .await
            {
                Ok(exists) => exists,
                Err(err) => {
                    debug!(instance_id = instance.id(), %err, "readiness check failed");
                    false
                }
            }
        })
    }
}

/// Ready when the instance is running and the captured pane matches a pattern.
#[derive(Clone)]
pub struct OutputPatternProbe {
    mux: Arc<dyn Multiplexer>,
    pattern: Regex,
    scrollback: Option<u32>,
}

impl OutputPatternProbe {
    /// Match `pattern` against the visible pane.
    #[must_use]
    pub fn new(mux: Arc<dyn Multiplexer>, pattern: Regex) -> Self {
        Self {
            mux,
            pattern,
            scrollback: None,
        }
    }

    /// Also search the last `lines` of scrollback.
    #[must_use]
    pub fn with_scrollback(mut self, lines: u32) -> Self {
        self.scrollback = Some(lines);
        self
    }
}

impl ReadinessProbe for OutputPatternProbe {
    fn is_ready<'a>(&'a self, instance: &'a dyn Instance) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if !instance.is_running() {
                return false;
            }
            match self
                .mux
                .capture_pane(
                    instance.socket_name(),
                    instance.session_name(),
                    self.scrollback,
                )
                .await
            {
                Ok(pane) => self.pattern.is_match(&pane),
                Err(err) => {
                    debug!(instance_id = instance.id(), %err, "pane capture failed");
                    false
                }
            }
        })
    }
}
