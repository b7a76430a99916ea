//! Batch dispatcher task.
//!
//! A single task owns the pending-literal accumulator and consumes a bounded
//! queue of accepted input. It is the only writer of batch state, so events
//! reach the [`Sender`] in acceptance order with literal runs merged but never
//! reordered around keys.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::keys::{segments, Segment, PASTE_END, PASTE_START};
use super::Sender;
use crate::config::BatchConfig;
use crate::models::key_event::KeyEvent;
use crate::Result;

/// Message accepted by the dispatcher queue.
pub(crate) enum Dispatch {
    /// Deliver an event; `reply` receives the outcome when present.
    Deliver {
        session: String,
        event: KeyEvent,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Flush, acknowledge, and exit.
    Close(oneshot::Sender<()>),
}

struct Pending {
    session: String,
    text: String,
    deadline: Instant,
}

pub(crate) struct Dispatcher {
    sender: Arc<dyn Sender>,
    batch: BatchConfig,
    pending: Option<Pending>,
}

impl Dispatcher {
    pub(crate) fn new(sender: Arc<dyn Sender>, batch: BatchConfig) -> Self {
        Self {
            sender,
            batch,
            pending: None,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Dispatch>) {
        loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);
            let msg = tokio::select! {
                msg = rx.recv() => msg,
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.flush().await;
                    continue;
                }
            };

            match msg {
                None => {
                    self.flush().await;
                    debug!("input dispatcher: queue closed, stopping");
                    break;
                }
                Some(Dispatch::Close(ack)) => {
                    self.flush().await;
                    let _ = ack.send(());
                    debug!("input dispatcher: close requested, stopping");
                    break;
                }
                Some(Dispatch::Deliver {
                    session,
                    event,
                    reply,
                }) => self.handle(session, event, reply).await,
            }
        }
    }

    async fn handle(
        &mut self,
        session: String,
        event: KeyEvent,
        reply: Option<oneshot::Sender<Result<()>>>,
    ) {
        if self.batch.enabled {
            if let KeyEvent::LiteralText(ref text) = event {
                self.accumulate(session, text).await;
                if let Some(tx) = reply {
                    let _ = tx.send(Ok(()));
                }
                return;
            }
        }

        self.flush().await;
        let result = deliver(self.sender.as_ref(), &session, &event).await;
        match reply {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                if let Err(err) = result {
                    warn!(session, %err, kind = ?event.kind(), "async input delivery failed");
                }
            }
        }
    }

    async fn accumulate(&mut self, session: String, text: &str) {
        if text.is_empty() {
            return;
        }

        if self.pending.as_ref().is_some_and(|p| p.session != session) {
            self.flush().await;
        }

        let pending = self.pending.get_or_insert_with(|| Pending {
            session,
            text: String::new(),
            deadline: Instant::now() + self.batch.flush_interval,
        });
        pending.text.push_str(text);

        if pending.text.len() >= self.batch.max_batch_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if let Err(err) = self
            .sender
            .send_keys(&pending.session, &pending.text, true)
            .await
        {
            warn!(
                session = %pending.session,
                %err,
                bytes = pending.text.len(),
                "batched literal flush failed"
            );
        }
    }
}

/// Deliver one event without batching.
pub(crate) async fn deliver(sender: &dyn Sender, session: &str, event: &KeyEvent) -> Result<()> {
    match event {
        KeyEvent::Text(text) => send_classified(sender, session, text).await,
        KeyEvent::SpecialKey(key) => sender.send_keys(session, key, false).await,
        KeyEvent::Interrupt => {
            sender
                .send_keys(session, KeyEvent::INTERRUPT_KEY, false)
                .await
        }
        KeyEvent::LiteralText(text) => {
            if text.is_empty() {
                return Ok(());
            }
            sender.send_keys(session, text, true).await
        }
        KeyEvent::PasteBlock(text) => {
            sender.send_keys(session, PASTE_START, true).await?;
            if !text.is_empty() {
                sender.send_keys(session, text, true).await?;
            }
            sender.send_keys(session, PASTE_END, true).await
        }
    }
}

/// Send classified text, abandoning the rest on the first failure.
pub(crate) async fn send_classified(sender: &dyn Sender, session: &str, text: &str) -> Result<()> {
    for (idx, segment) in segments(text).into_iter().enumerate() {
        match segment {
            Segment::Literal(run) => sender
                .send_keys(session, run, true)
                .await
                .map_err(|err| err.wrap(&format!("send input segment {idx} (literal)")))?,
            Segment::Key(key) => sender
                .send_keys(session, &key, false)
                .await
                .map_err(|err| err.wrap(&format!("send input segment {idx} (key {key})")))?,
        }
    }
    Ok(())
}
