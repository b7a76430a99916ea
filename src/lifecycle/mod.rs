//! Session lifecycle state machine.
//!
//! ```text
//! Stopped → Starting → Running → Ready
//!              ↘──────────↘────────↘── Stopping → Stopped
//! ```
//!
//! State checks and transitions happen under one manager-wide lock, which is
//! released before any multiplexer invocation. Claiming a transitional state
//! (`Starting`, `Stopping`) under the lock is what keeps two Start/Stop
//! operations on the same instance from running concurrently. A `Stop` that
//! finds the instance `Starting` waits for that start to settle first.

pub mod backend;
pub mod readiness;
pub mod shutdown;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::SupervisorConfig;
use crate::input::{OneShotSender, Sender};
use crate::models::instance::{Instance, InstanceState, SessionSize};
use crate::tmux::{Multiplexer, NewSession, OptionScope};
use crate::{AppError, Result};

pub use backend::{Backend, CommandBackend, StartMode};
pub use readiness::{OutputPatternProbe, ReadinessProbe, SessionAliveProbe};
pub use shutdown::{graceful_shutdown, ServerScope};

/// First readiness poll interval.
pub const READY_POLL_INITIAL: Duration = Duration::from_millis(50);

/// Ceiling for the doubling readiness poll interval.
pub const READY_POLL_MAX: Duration = Duration::from_millis(500);

/// Tunables for [`SessionLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Size used for any field an instance leaves unset.
    pub default_size: SessionSize,
    /// Grace period between interrupt and forced teardown.
    pub graceful_stop_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            default_size: SessionSize {
                width: 200,
                height: 30,
                history_limit: 50_000,
            },
            graceful_stop_timeout: Duration::from_millis(500),
        }
    }
}

impl From<&SupervisorConfig> for LifecycleOptions {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            default_size: config.default_size(),
            graceful_stop_timeout: config.graceful_stop_timeout(),
        }
    }
}

/// Creates, supervises, and tears down one multiplexer session per instance.
pub struct SessionLifecycle {
    mux: Arc<dyn Multiplexer>,
    backend: Arc<dyn Backend>,
    probe: Arc<dyn ReadinessProbe>,
    options: LifecycleOptions,
    states: Mutex<HashMap<String, InstanceState>>,
    settled: Notify,
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SessionLifecycle {
    /// Build a manager; readiness defaults to [`SessionAliveProbe`].
    #[must_use]
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        backend: Arc<dyn Backend>,
        options: LifecycleOptions,
    ) -> Self {
        let probe = Arc::new(SessionAliveProbe::new(Arc::clone(&mux)));
        Self {
            mux,
            backend,
            probe,
            options,
            states: Mutex::new(HashMap::new()),
            settled: Notify::new(),
        }
    }

    /// Replace the readiness predicate.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Current state of `instance_id`; unknown ids are `Stopped`.
    pub async fn get_state(&self, instance_id: &str) -> InstanceState {
        self.states
            .lock()
            .await
            .get(instance_id)
            .copied()
            .unwrap_or_default()
    }

    /// Forget `instance_id`. Call when an instance is permanently removed.
    pub async fn clear_state(&self, instance_id: &str) {
        self.states.lock().await.remove(instance_id);
    }

    /// Start a fresh instance.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidArgument` for an instance with an empty id.
    /// - `AppError::AlreadyRunning` if the instance is starting, running,
    ///   ready, or stopping.
    /// - Any step failure, wrapped with the step name, after the partial
    ///   session and prompt file have been removed.
    pub async fn start(&self, instance: &dyn Instance) -> Result<()> {
        self.start_with_mode(instance, StartMode::Fresh).await
    }

    /// Start an instance with an explicit [`StartMode`].
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn start_with_mode(&self, instance: &dyn Instance, mode: StartMode) -> Result<()> {
        validate(instance)?;
        let id = instance.id();

        async move {
            self.claim(id, InstanceState::Starting, |current| {
                if current.is_active() || current == InstanceState::Stopping {
                    Err(AppError::AlreadyRunning(format!("instance {id} is {current}")))
                } else {
                    Ok(())
                }
            })
            .await?;

            if let Err(err) = self.launch(instance, mode).await {
                self.set_state(id, InstanceState::Stopped).await;
                warn!(%err, "start failed, rolled back");
                return Err(err.wrap(&format!("start {id}")));
            }

            instance.set_running(true);
            instance.set_started_at(Utc::now());
            self.set_state(id, InstanceState::Running).await;
            info!(?mode, "instance started");
            instance.on_started();
            Ok(())
        }
        .instrument(info_span!("start", instance_id = id, session = instance.session_name()))
        .await
    }

    /// Stop an instance with the graceful-shutdown sequence.
    ///
    /// No-op when already stopped or stopping. An in-flight start or
    /// reconnect is allowed to finish before the teardown begins. Never
    /// fails: the session may already be gone, so internal errors are only
    /// logged.
    pub async fn stop(&self, instance: &dyn Instance) {
        let id = instance.id();
        async move {
            if let Err(err) = self.claim_stopping(id).await {
                debug!(%err, "stop skipped");
                return;
            }

            graceful_shutdown(
                self.mux.as_ref(),
                instance.socket_name(),
                instance.session_name(),
                self.options.graceful_stop_timeout,
                ServerScope::Dedicated,
            )
            .await;

            instance.set_running(false);
            self.set_state(id, InstanceState::Stopped).await;
            info!("instance stopped");
            instance.on_stopped();
        }
        .instrument(info_span!("stop", instance_id = id, session = instance.session_name()))
        .await;
    }

    /// Stop (when running or ready), then start.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`start`](Self::start).
    pub async fn restart(&self, instance: &dyn Instance) -> Result<()> {
        if matches!(
            self.get_state(instance.id()).await,
            InstanceState::Running | InstanceState::Ready
        ) {
            self.stop(instance).await;
        }
        self.start(instance).await
    }

    /// Poll the readiness probe until it holds or `timeout` elapses.
    ///
    /// Polls back off from [`READY_POLL_INITIAL`] doubling to
    /// [`READY_POLL_MAX`]. On success a `Running` instance becomes `Ready`;
    /// on failure the state is left unchanged.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` if the instance is not (or stops being)
    ///   marked running.
    /// - `AppError::ReadyTimeout` when the deadline passes.
    pub async fn wait_for_ready(&self, instance: &dyn Instance, timeout: Duration) -> Result<()> {
        let id = instance.id();
        let deadline = Instant::now() + timeout;
        let mut interval = READY_POLL_INITIAL;

        loop {
            if !instance.is_running() {
                return Err(AppError::NotRunning(format!(
                    "instance {id} stopped while waiting for readiness"
                )));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let ready = tokio::time::timeout(remaining, self.probe.is_ready(instance))
                .await
                .unwrap_or(false);
            if ready {
                let mut states = self.states.lock().await;
                if states.get(id) == Some(&InstanceState::Running) {
                    states.insert(id.to_owned(), InstanceState::Ready);
                }
                drop(states);
                info!(instance_id = id, "instance ready");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AppError::ReadyTimeout(format!(
                    "instance {id} not ready after {timeout:?}"
                )));
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = (interval * 2).min(READY_POLL_MAX);
        }
    }

    /// Re-adopt an existing session without relaunching the hosted process.
    ///
    /// # Errors
    ///
    /// - `AppError::AlreadyRunning` if the instance is running, ready, or
    ///   mid-transition.
    /// - `AppError::SessionNotFound` if the session does not exist.
    /// - Multiplexer errors while re-enabling bell monitoring.
    pub async fn reconnect(&self, instance: &dyn Instance) -> Result<()> {
        validate(instance)?;
        let id = instance.id();

        async move {
            let previous = self
                .claim(id, InstanceState::Starting, |current| {
                    if current == InstanceState::Stopped {
                        Ok(())
                    } else {
                        Err(AppError::AlreadyRunning(format!("instance {id} is {current}")))
                    }
                })
                .await?;

            if let Err(err) = self.adopt(instance).await {
                self.set_state(id, previous).await;
                return Err(err.wrap(&format!("reconnect {id}")));
            }

            instance.set_running(true);
            self.set_state(id, InstanceState::Running).await;
            info!("instance reconnected");
            instance.on_started();
            Ok(())
        }
        .instrument(info_span!("reconnect", instance_id = id, session = instance.session_name()))
        .await
    }

    /// Check `current` with `allow` and move to `next` under the state lock.
    ///
    /// Returns the state that was replaced.
    async fn claim<F>(&self, id: &str, next: InstanceState, allow: F) -> Result<InstanceState>
    where
        F: FnOnce(InstanceState) -> Result<()>,
    {
        let mut states = self.states.lock().await;
        let current = states.get(id).copied().unwrap_or_default();
        allow(current)?;
        states.insert(id.to_owned(), next);
        Ok(current)
    }

    /// Claim `Stopping`, first waiting out any `Starting` holder.
    async fn claim_stopping(&self, id: &str) -> Result<()> {
        loop {
            let mut states = self.states.lock().await;
            let current = states.get(id).copied().unwrap_or_default();
            match current {
                InstanceState::Stopped | InstanceState::Stopping => {
                    return Err(AppError::NotRunning(format!("instance {id} is {current}")));
                }
                InstanceState::Starting => {
                    // Registered before the lock is released, so the
                    // transition out of Starting cannot be missed.
                    let settled = self.settled.notified();
                    tokio::pin!(settled);
                    settled.as_mut().enable();
                    drop(states);
                    debug!("waiting for start to settle");
                    settled.await;
                }
                InstanceState::Running | InstanceState::Ready => {
                    states.insert(id.to_owned(), InstanceState::Stopping);
                    return Ok(());
                }
            }
        }
    }

    async fn set_state(&self, id: &str, state: InstanceState) {
        self.states.lock().await.insert(id.to_owned(), state);
        self.settled.notify_waiters();
    }

    async fn launch(&self, instance: &dyn Instance, mode: StartMode) -> Result<()> {
        let prompt_path = instance.work_dir().join(self.backend.prompt_file_name());
        let mut prompt_written = false;
        let result = self
            .launch_steps(instance, &prompt_path, mode, &mut prompt_written)
            .await;
        if result.is_err() {
            self.rollback(instance, prompt_written.then_some(prompt_path.as_path()))
                .await;
        }
        result
    }

    async fn launch_steps(
        &self,
        instance: &dyn Instance,
        prompt_path: &std::path::Path,
        mode: StartMode,
        prompt_written: &mut bool,
    ) -> Result<()> {
        let socket = instance.socket_name();
        let session = instance.session_name();
        let size = instance.size().or_defaults(self.options.default_size);

        if self
            .mux
            .has_session(socket, session)
            .await
            .map_err(|err| err.wrap("check stale session"))?
        {
            debug!("removing stale session");
            match self.mux.kill_session(socket, session).await {
                Ok(()) => {}
                Err(err) if err.is_gone() => {}
                Err(err) => return Err(err.wrap("remove stale session")),
            }
        }

        let spec = NewSession {
            name: session.to_owned(),
            size,
            work_dir: Some(PathBuf::from(instance.work_dir())),
        };
        self.mux
            .new_session(socket, &spec)
            .await
            .map_err(|err| err.wrap("create session"))?;

        self.mux
            .set_option(
                socket,
                &OptionScope::Window(session.to_owned()),
                "monitor-bell",
                "on",
            )
            .await
            .map_err(|err| err.wrap("enable bell monitoring"))?;

        tokio::fs::write(prompt_path, instance.task())
            .await
            .map_err(|err| {
                AppError::Io(format!(
                    "write prompt file {}: {err}",
                    prompt_path.display()
                ))
            })?;
        *prompt_written = true;

        let command = self.backend.start_command(prompt_path, mode);
        let sender = OneShotSender::new(Arc::clone(&self.mux), socket);
        sender
            .send_keys(session, &command, true)
            .await
            .map_err(|err| err.wrap("send start command"))?;
        sender
            .send_keys(session, "Enter", false)
            .await
            .map_err(|err| err.wrap("send start command enter"))?;

        Ok(())
    }

    async fn rollback(&self, instance: &dyn Instance, prompt_path: Option<&std::path::Path>) {
        match self
            .mux
            .kill_session(instance.socket_name(), instance.session_name())
            .await
        {
            Ok(()) => debug!("partial session killed"),
            Err(err) if err.is_gone() => {}
            Err(err) => warn!(%err, "failed to kill partial session"),
        }

        let Some(prompt_path) = prompt_path else {
            return;
        };
        match tokio::fs::remove_file(prompt_path).await {
            Ok(()) => debug!(path = %prompt_path.display(), "prompt file removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(%err, path = %prompt_path.display(), "failed to remove prompt file"),
        }
    }

    async fn adopt(&self, instance: &dyn Instance) -> Result<()> {
        let socket = instance.socket_name();
        let session = instance.session_name();
        if !self.mux.has_session(socket, session).await? {
            return Err(AppError::SessionNotFound(format!(
                "session {session} on socket {socket}"
            )));
        }
        self.mux
            .set_option(
                socket,
                &OptionScope::Window(session.to_owned()),
                "monitor-bell",
                "on",
            )
            .await
            .map_err(|err| err.wrap("enable bell monitoring"))
    }
}

fn validate(instance: &dyn Instance) -> Result<()> {
    if instance.id().trim().is_empty() {
        return Err(AppError::InvalidArgument("instance id must not be empty".into()));
    }
    if instance.session_name().is_empty() || instance.socket_name().is_empty() {
        return Err(AppError::InvalidArgument(format!(
            "instance {} has no session or socket name",
            instance.id()
        )));
    }
    Ok(())
}
