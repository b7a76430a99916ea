//! Key events accepted by the input coalescer and the history they leave.

use serde::Serialize;

/// Kind of a recorded input operation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    /// Classified text delivered through `send_input`.
    Text,
    /// A symbolic key (including interrupts).
    Key,
    /// Unclassified literal text.
    Literal,
    /// A bracketed-paste block.
    Paste,
}

/// A single unit of caller-issued input, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    /// Text whose characters are classified into literal runs and keys.
    Text(String),
    /// A symbolic multiplexer key name such as `Enter` or `C-a`.
    SpecialKey(String),
    /// Text delivered byte-for-byte.
    LiteralText(String),
    /// Text wrapped in bracketed-paste markers.
    PasteBlock(String),
    /// Ctrl+C.
    Interrupt,
}

impl KeyEvent {
    /// Multiplexer key name sent for [`KeyEvent::Interrupt`].
    pub const INTERRUPT_KEY: &'static str = "C-c";

    /// History kind recorded for this event.
    #[must_use]
    pub fn kind(&self) -> KeyEventKind {
        match self {
            Self::Text(_) => KeyEventKind::Text,
            Self::SpecialKey(_) | Self::Interrupt => KeyEventKind::Key,
            Self::LiteralText(_) => KeyEventKind::Literal,
            Self::PasteBlock(_) => KeyEventKind::Paste,
        }
    }

    /// Payload string carried by the event.
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::Text(s) | Self::SpecialKey(s) | Self::LiteralText(s) | Self::PasteBlock(s) => s,
            Self::Interrupt => Self::INTERRUPT_KEY,
        }
    }
}

/// One recorded entry in the bounded input history.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Text or key name as submitted.
    pub payload: String,
    /// Operation that produced the entry.
    pub kind: KeyEventKind,
}

impl From<&KeyEvent> for HistoryEntry {
    fn from(event: &KeyEvent) -> Self {
        Self {
            payload: event.payload().to_owned(),
            kind: event.kind(),
        }
    }
}
