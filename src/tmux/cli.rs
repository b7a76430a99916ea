//! [`Multiplexer`] backed by one-shot `tmux` subprocess invocations.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::{Multiplexer, NewSession, OptionScope};
use crate::{AppError, BoxFuture, Result};

/// Stderr fragments that mean the session or its server no longer exists.
const GONE_MARKERS: &[&str] = &[
    "can't find session",
    "session not found",
    "no server running",
    "error connecting to",
    "can't find pane",
];

/// Invokes `tmux -L <socket> ...` once per operation.
#[derive(Debug, Clone)]
pub struct TmuxCli {
    binary: PathBuf,
    timeout: Duration,
}

impl TmuxCli {
    /// Build a client for `binary` with a per-invocation `timeout`.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Executable used for every invocation.
    #[must_use]
    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    /// Run one invocation and return its stdout.
    ///
    /// # Errors
    ///
    /// - `AppError::Io` on spawn failure or timeout.
    /// - `AppError::SessionNotFound` when stderr reports a missing target.
    /// - `AppError::Multiplexer` for any other non-zero exit.
    pub async fn run(&self, socket: &str, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-L")
            .arg(socket)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The last command of a `;`-chained list names the invocation.
        let verb = args
            .rsplit(|arg| arg == ";")
            .next()
            .and_then(|command| command.first())
            .map_or("", String::as_str);
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result
                .map_err(|err| AppError::Io(format!("failed to run tmux {verb}: {err}")))?,
            Err(_) => {
                return Err(AppError::Io(format!(
                    "tmux {verb} timed out after {:?}",
                    self.timeout
                )))
            }
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        debug!(socket, verb, %stderr, "tmux invocation failed");
        Err(classify_failure(verb, &stderr))
    }
}

/// Map a failed invocation's stderr onto the error taxonomy.
#[must_use]
pub fn classify_failure(verb: &str, stderr: &str) -> AppError {
    let lowered = stderr.to_ascii_lowercase();
    if GONE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        AppError::SessionNotFound(format!("tmux {verb}: {stderr}"))
    } else {
        AppError::Multiplexer(format!("tmux {verb} failed: {stderr}"))
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_owned()).collect()
}

impl Multiplexer for TmuxCli {
    fn has_session<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            match self.run(socket, &owned(&["has-session", "-t", session])).await {
                Ok(_) => Ok(true),
                Err(err) if err.is_gone() => Ok(false),
                // has-session reports a missing session with a bare exit 1 on
                // some versions.
                Err(AppError::Multiplexer(_)) => Ok(false),
                Err(err) => Err(err),
            }
        })
    }

    fn new_session<'a>(
        &'a self,
        socket: &'a str,
        spec: &'a NewSession,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.run(socket, &spec.args()).await.map(drop) })
    }

    fn kill_session<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.run(socket, &owned(&["kill-session", "-t", session]))
                .await
                .map(drop)
        })
    }

    fn kill_server<'a>(&'a self, socket: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.run(socket, &owned(&["kill-server"])).await.map(drop) })
    }

    fn set_option<'a>(
        &'a self,
        socket: &'a str,
        scope: &'a OptionScope,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut args = vec!["set-option".to_owned()];
            args.extend(scope.args());
            args.push(key.to_owned());
            args.push(value.to_owned());
            self.run(socket, &args).await.map(drop)
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
            let mut args = owned(&["send-keys", "-t", session]);
            if literal {
                args.push("-l".to_owned());
                // A payload starting with '-' would otherwise parse as a flag.
                args.push("--".to_owned());
            }
            args.push(keys.to_owned());
            self.run(socket, &args).await.map(drop)
        })
    }

    fn capture_pane<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
        scrollback: Option<u32>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut args = owned(&["capture-pane", "-t", session, "-p", "-e"]);
            if let Some(lines) = scrollback {
                args.push("-S".to_owned());
                args.push(format!("-{lines}"));
            }
            self.run(socket, &args).await
        })
    }

    fn pane_pid<'a>(
        &'a self,
        socket: &'a str,
        session: &'a str,
    ) -> BoxFuture<'a, Result<Option<i32>>> {
        Box::pin(async move {
            let out = match self
                .run(
                    socket,
                    &owned(&["display-message", "-t", session, "-p", "#{pane_pid}"]),
                )
                .await
            {
                Ok(out) => out,
                Err(err) if err.is_gone() => return Ok(None),
                Err(err) => return Err(err),
            };
            Ok(out.trim().parse::<i32>().ok().filter(|pid| *pid > 0))
        })
    }
}
