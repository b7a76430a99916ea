//! Input coalescer: the caller-facing keystroke API.
//!
//! Every accepted operation is recorded in a bounded history and handed to
//! the dispatcher task, which owns batching state and preserves acceptance
//! order per coalescer. [`InputCoalescer::send_input`] waits for its outcome;
//! the key, literal, and paste operations return as soon as the event is
//! queued.
//!
//! When the dispatcher queue is full (or already closed) the event is sent
//! directly through the [`Sender`] on the caller's task. That path is bounded
//! by the sender's own timeouts, never drops input, and gives up ordering
//! relative to events still waiting in the queue.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info_span, warn, Instrument};

use super::dispatcher::{self, Dispatch, Dispatcher};
use super::Sender;
use crate::config::{BatchConfig, SupervisorConfig};
use crate::models::key_event::{HistoryEntry, KeyEvent};
use crate::{AppError, Result};

/// Construction options for an [`InputCoalescer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerOptions {
    /// Batching policy.
    pub batch: BatchConfig,
    /// History capacity; 0 disables tracking.
    pub max_history: usize,
    /// Bound of the dispatcher queue.
    pub queue_capacity: usize,
}

impl Default for CoalescerOptions {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            max_history: 100,
            queue_capacity: 256,
        }
    }
}

impl From<&SupervisorConfig> for CoalescerOptions {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            batch: config.batch_config(),
            max_history: config.max_history,
            queue_capacity: config.queue_capacity,
        }
    }
}

#[derive(Debug, Default)]
struct Buffers {
    history: VecDeque<HistoryEntry>,
    manual: String,
}

/// Batches and orders keystrokes on their way to a [`Sender`].
pub struct InputCoalescer {
    sender: Arc<dyn Sender>,
    max_history: usize,
    buffers: Mutex<Buffers>,
    queue: mpsc::Sender<Dispatch>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for InputCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputCoalescer")
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}

impl InputCoalescer {
    /// Build a coalescer and spawn its dispatcher task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(sender: Arc<dyn Sender>, options: CoalescerOptions) -> Self {
        let (queue, rx) = mpsc::channel(options.queue_capacity.max(1));
        let dispatcher = Dispatcher::new(Arc::clone(&sender), options.batch);
        let handle = tokio::spawn(dispatcher.run(rx).instrument(info_span!("input_dispatcher")));

        Self {
            sender,
            max_history: options.max_history,
            buffers: Mutex::new(Buffers::default()),
            queue,
            dispatcher: Mutex::new(Some(handle)),
        }
    }

    /// Send classified text and wait for delivery.
    ///
    /// Regular characters travel as literal runs and special characters as
    /// symbolic keys, in input order.
    ///
    /// # Errors
    ///
    /// Returns the first delivery error, wrapped with the failing segment;
    /// the remaining input is abandoned.
    pub async fn send_input(&self, session: &str, text: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let msg = Dispatch::Deliver {
            session: session.to_owned(),
            event: KeyEvent::Text(text.to_owned()),
            reply: Some(tx),
        };
        match self.accept(msg).await {
            Ok(()) => rx
                .await
                .map_err(|_| AppError::Io("input dispatcher dropped the request".into()))?,
            Err(_) => {
                warn!(session, "input queue unavailable, sending input directly");
                dispatcher::send_classified(self.sender.as_ref(), session, text).await
            }
        }
    }

    /// Queue a symbolic key. Delivery failures are logged, not returned.
    pub async fn send_key(&self, session: &str, key: &str) {
        self.submit(session, KeyEvent::SpecialKey(key.to_owned()))
            .await;
    }

    /// Queue Ctrl+C.
    pub async fn send_interrupt(&self, session: &str) {
        self.submit(session, KeyEvent::Interrupt).await;
    }

    /// Queue literal text without classification.
    pub async fn send_literal(&self, session: &str, text: &str) {
        self.submit(session, KeyEvent::LiteralText(text.to_owned()))
            .await;
    }

    /// Queue text wrapped in bracketed-paste markers.
    ///
    /// The start marker, the text, and the end marker are three separate
    /// literal sends.
    pub async fn send_paste(&self, session: &str, text: &str) {
        self.submit(session, KeyEvent::PasteBlock(text.to_owned()))
            .await;
    }

    /// Copy of the recorded history, oldest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.buffers.lock().await.history.iter().cloned().collect()
    }

    /// Append to the manual buffer.
    pub async fn append_to_buffer(&self, data: &str) {
        self.buffers.lock().await.manual.push_str(data);
    }

    /// Bytes currently held in the manual buffer.
    pub async fn buffer_size(&self) -> usize {
        self.buffers.lock().await.manual.len()
    }

    /// Discard the manual buffer.
    pub async fn clear_buffer(&self) {
        self.buffers.lock().await.manual.clear();
    }

    /// Send the manual buffer through [`send_input`](Self::send_input).
    ///
    /// Returns the number of bytes sent; `0` when the buffer was empty.
    ///
    /// # Errors
    ///
    /// Returns the delivery error from `send_input`. The buffer is emptied
    /// either way.
    pub async fn flush_buffer(&self, session: &str) -> Result<usize> {
        let data = std::mem::take(&mut self.buffers.lock().await.manual);
        if data.is_empty() {
            return Ok(0);
        }
        self.send_input(session, &data).await?;
        Ok(data.len())
    }

    /// Deliver everything already accepted, flush pending literals, and stop
    /// the dispatcher. Safe to call more than once.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.queue.send(Dispatch::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn submit(&self, session: &str, event: KeyEvent) {
        let msg = Dispatch::Deliver {
            session: session.to_owned(),
            event,
            reply: None,
        };
        if let Err(Dispatch::Deliver { event, .. }) = self.accept(msg).await {
            warn!(session, kind = ?event.kind(), "input queue unavailable, sending directly");
            if let Err(err) = dispatcher::deliver(self.sender.as_ref(), session, &event).await {
                warn!(session, %err, "direct input delivery failed");
            }
        }
    }

    /// Record the event and enqueue it as one step under the buffers lock,
    /// so history order is queue order. `try_send` never waits, so the lock
    /// is held only briefly. Hands `msg` back when the queue is full or
    /// closed.
    async fn accept(&self, msg: Dispatch) -> std::result::Result<(), Dispatch> {
        let mut buffers = self.buffers.lock().await;
        if let Dispatch::Deliver { ref event, .. } = msg {
            if self.max_history > 0 {
                buffers.history.push_back(HistoryEntry::from(event));
                while buffers.history.len() > self.max_history {
                    buffers.history.pop_front();
                }
            }
        }
        self.queue.try_send(msg).map_err(|err| match err {
            TrySendError::Full(msg) | TrySendError::Closed(msg) => msg,
        })
    }
}
