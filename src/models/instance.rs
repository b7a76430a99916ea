//! Instance contract consumed by the session lifecycle and a concrete
//! implementation used by the binary.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::tmux::{instance_socket, session_name};

/// Pane dimensions and scrollback for a session.
///
/// Zero fields mean "unset" and are replaced by the supervisor defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSize {
    /// Columns.
    pub width: u16,
    /// Rows.
    pub height: u16,
    /// Scrollback lines.
    pub history_limit: u32,
}

impl SessionSize {
    /// Fill unset fields from `defaults`.
    #[must_use]
    pub fn or_defaults(self, defaults: SessionSize) -> Self {
        Self {
            width: if self.width == 0 { defaults.width } else { self.width },
            height: if self.height == 0 {
                defaults.height
            } else {
                self.height
            },
            history_limit: if self.history_limit == 0 {
                defaults.history_limit
            } else {
                self.history_limit
            },
        }
    }
}

/// Lifecycle state of one instance as tracked by the supervisor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// No session; quiescent.
    #[default]
    Stopped,
    /// Session being created and the hosted process launched.
    Starting,
    /// Hosted process launched.
    Running,
    /// Readiness observed.
    Ready,
    /// Graceful shutdown in progress.
    Stopping,
}

impl InstanceState {
    /// Whether the instance holds, or is acquiring, a live session.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Ready)
    }
}

impl Display for InstanceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// Object supervised by [`SessionLifecycle`](crate::lifecycle::SessionLifecycle).
///
/// Hooks run synchronously on the lifecycle task and must not block.
pub trait Instance: Send + Sync {
    /// Stable identifier, used as the state-map key.
    fn id(&self) -> &str;
    /// Multiplexer session name.
    fn session_name(&self) -> &str;
    /// Dedicated multiplexer socket for this instance.
    fn socket_name(&self) -> &str;
    /// Working directory of the hosted process; receives the prompt file.
    fn work_dir(&self) -> &Path;
    /// Task payload written to the prompt file.
    fn task(&self) -> &str;
    /// Requested pane size; zero fields fall back to defaults.
    fn size(&self) -> SessionSize;
    /// Whether the hosted process is considered running.
    fn is_running(&self) -> bool;
    /// Update the running flag.
    fn set_running(&self, running: bool);
    /// Record when the hosted process was launched.
    fn set_started_at(&self, at: DateTime<Utc>);
    /// Called after a successful start or reconnect.
    fn on_started(&self) {}
    /// Called after stop completes.
    fn on_stopped(&self) {}
}

/// Notification emitted by [`AgentInstance`] hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The instance started or was reconnected.
    Started {
        /// Instance identifier.
        instance_id: String,
    },
    /// The instance stopped.
    Stopped {
        /// Instance identifier.
        instance_id: String,
    },
}

/// Default [`Instance`] implementation.
#[derive(Debug)]
pub struct AgentInstance {
    id: String,
    session_name: String,
    socket_name: String,
    work_dir: PathBuf,
    task: String,
    size: SessionSize,
    running: AtomicBool,
    started_at_ms: AtomicI64,
    events: Option<mpsc::Sender<LifecycleEvent>>,
}

impl AgentInstance {
    /// Build an instance whose session and socket names derive from `id`.
    #[must_use]
    pub fn new(id: &str, socket_prefix: &str, work_dir: PathBuf, task: String) -> Self {
        Self {
            id: id.to_owned(),
            session_name: session_name(socket_prefix, id),
            socket_name: instance_socket(socket_prefix, id),
            work_dir,
            task,
            size: SessionSize::default(),
            running: AtomicBool::new(false),
            started_at_ms: AtomicI64::new(0),
            events: None,
        }
    }

    /// Override the pane size.
    #[must_use]
    pub fn with_size(mut self, size: SessionSize) -> Self {
        self.size = size;
        self
    }

    /// Deliver [`LifecycleEvent`]s on `tx` from the lifecycle hooks.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<LifecycleEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Launch time recorded by the last start, if any.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.started_at_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(ref tx) = self.events {
            if tx.try_send(event).is_err() {
                debug!(instance_id = %self.id, "lifecycle event receiver full or closed");
            }
        }
    }
}

impl Instance for AgentInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn session_name(&self) -> &str {
        &self.session_name
    }

    fn socket_name(&self) -> &str {
        &self.socket_name
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn task(&self) -> &str {
        &self.task
    }

    fn size(&self) -> SessionSize {
        self.size
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn set_started_at(&self, at: DateTime<Utc>) {
        self.started_at_ms
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }

    fn on_started(&self) {
        self.emit(LifecycleEvent::Started {
            instance_id: self.id.clone(),
        });
    }

    fn on_stopped(&self) {
        self.emit(LifecycleEvent::Stopped {
            instance_id: self.id.clone(),
        });
    }
}
