//! A single control-mode connection to one multiplexer session.
//!
//! The connection owns the `tmux -C attach-session` child, its stdin (behind
//! a mutex so a detached writer task can hold it), and two drain tasks that
//! discard stdout and stderr so the server never blocks on a full pipe.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Overall bound on the handshake read.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// Response lines inspected for a handshake marker.
pub const VERIFY_MAX_LINES: usize = 5;

/// Bound on a single command write.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Bound on reaping the child after it is killed.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

const SUCCESS_MARKER: &str = "%session-changed";
const ERROR_MARKERS: &[&str] = &["%error", "%exit"];

/// Outcome of scanning handshake lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// `%session-changed` seen.
    Attached,
    /// No marker within the line bound; treated as success.
    Unconfirmed,
    /// `%error` or `%exit` seen; carries the offending line.
    Rejected(String),
}

/// Scan up to [`VERIFY_MAX_LINES`] lines for a handshake marker.
///
/// # Errors
///
/// Returns `AppError::Protocol` on a read error or when the stream ends
/// before any marker.
pub async fn read_handshake<R>(reader: &mut R) -> Result<Handshake>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    for _ in 0..VERIFY_MAX_LINES {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|err| AppError::Protocol(format!("control mode read failed: {err}")))?;
        if n == 0 {
            return Err(AppError::Protocol(
                "control mode closed before handshake".into(),
            ));
        }

        let trimmed = line.trim_end();
        if trimmed.starts_with(SUCCESS_MARKER) {
            return Ok(Handshake::Attached);
        }
        if ERROR_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            return Ok(Handshake::Rejected(trimmed.to_owned()));
        }
    }
    Ok(Handshake::Unconfirmed)
}

/// Live control-mode connection.
#[derive(Debug)]
pub struct Connection {
    session: String,
    child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    drains: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Spawn `tmux -L <socket> -C attach-session -t <session>` and verify it.
    ///
    /// # Errors
    ///
    /// - `AppError::Io` if the process cannot be spawned or its pipes captured.
    /// - `AppError::Protocol` if the handshake fails or the process exits
    ///   during verification.
    pub async fn open(binary: &Path, socket: &str, session: &str) -> Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.args(["-L", socket, "-C", "attach-session", "-t", session])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Io(format!("failed to spawn control mode client: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Io("failed to capture control mode stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io("failed to capture control mode stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io("failed to capture control mode stderr".into()))?;

        let mut reader = BufReader::new(stdout);
        if let Err(err) = verify(&mut child, &mut reader).await {
            child.start_kill().ok();
            let _ = tokio::time::timeout(REAP_TIMEOUT, child.wait()).await;
            return Err(err);
        }

        let drains = vec![
            tokio::spawn(drain(reader, "stdout")),
            tokio::spawn(drain(stderr, "stderr")),
        ];

        info!(
            socket,
            session,
            pid = child.id().unwrap_or(0),
            "control mode connection established"
        );

        Ok(Self {
            session: session.to_owned(),
            child,
            stdin: Arc::new(Mutex::new(stdin)),
            drains,
        })
    }

    /// Session this connection is attached to.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Whether the control-mode process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Write one command line, bounded by `timeout`.
    ///
    /// The write runs on its own task and reports through a single-slot
    /// channel. On timeout the task is abandoned; the caller must treat the
    /// connection as stuck and disconnect it, which unblocks the write.
    ///
    /// # Errors
    ///
    /// - `AppError::WriteTimeout` if the write does not finish in time.
    /// - `AppError::Io` if the write fails.
    pub async fn write_line(&self, line: &str, timeout: Duration) -> Result<()> {
        let stdin = Arc::clone(&self.stdin);
        let bytes = line.as_bytes().to_vec();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut pipe = stdin.lock().await;
            let result = match pipe.write_all(&bytes).await {
                Ok(()) => pipe.flush().await,
                Err(err) => Err(err),
            };
            // Nobody is listening once the timeout fired.
            let _ = tx.send(result);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(AppError::Io(format!("control mode write failed: {err}"))),
            Ok(Err(_)) => Err(AppError::Io("control mode writer vanished".into())),
            Err(_) => Err(AppError::WriteTimeout(format!(
                "control mode write exceeded {timeout:?}"
            ))),
        }
    }

    /// Close the pipes, kill the process, and reap it.
    pub async fn shutdown(mut self) {
        drop(self.stdin);
        if let Err(err) = self.child.start_kill() {
            debug!(session = %self.session, %err, "control mode process already gone");
        }
        match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(session = %self.session, ?status, "control mode process reaped"),
            Ok(Err(err)) => warn!(session = %self.session, %err, "failed to reap control mode process"),
            Err(_) => warn!(session = %self.session, "control mode process did not exit after kill"),
        }
        // Drains finish on their own once the pipes hit EOF.
        self.drains.clear();
    }
}

async fn verify<R>(child: &mut Child, reader: &mut R) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match tokio::time::timeout(VERIFY_TIMEOUT, read_handshake(reader)).await {
        Ok(Ok(Handshake::Attached | Handshake::Unconfirmed)) => Ok(()),
        Ok(Ok(Handshake::Rejected(line))) => Err(AppError::Protocol(format!(
            "control mode rejected attach: {line}"
        ))),
        Ok(Err(err)) => Err(err),
        Err(_) => match child.try_wait() {
            Ok(Some(status)) => Err(AppError::Protocol(format!(
                "control mode client exited during verification ({status})"
            ))),
            // Still running with nothing to say yet; proceed optimistically.
            _ => Ok(()),
        },
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, stream: &'static str) {
    let mut buf = vec![0_u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(stream, %err, "control mode drain stopped");
                break;
            }
        }
    }
}
