//! Materializes stored history records into a session transcript.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::gateway::HistoryRecord;

/// Opening line shown when a session has no content yet.
pub const GREETING: &str = "¡Hola! Soy el asistente virtual del Instituto Tecnológico de Tijuana. ¿En qué puedo ayudarte hoy?";

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// One bubble in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// Display-only wall-clock label, fixed when the message first became
    /// visible. Not a storage or ordering key.
    pub timestamp: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::stamped(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::stamped(Sender::Assistant, text)
    }

    fn stamped(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: display_timestamp(),
        }
    }
}

/// Current wall-clock label for message bubbles.
pub fn display_timestamp() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Expands history records, in arrival order, into the messages they
/// carry: the user side first, then the assistant side, skipping empty
/// fields. An empty result is replaced by the single greeting message.
///
/// The store keeps no per-turn clock and its return order is trusted as
/// insertion order, so every message from one load shares one read-time
/// timestamp and nothing here re-sorts.
pub fn materialize(records: &[HistoryRecord]) -> Vec<Message> {
    let timestamp = display_timestamp();
    let mut messages = Vec::with_capacity(records.len() * 2);
    for record in records {
        if !record.user_text.is_empty() {
            messages.push(Message {
                sender: Sender::User,
                text: record.user_text.clone(),
                timestamp: timestamp.clone(),
            });
        }
        if !record.assistant_text.is_empty() {
            messages.push(Message {
                sender: Sender::Assistant,
                text: record.assistant_text.clone(),
                timestamp: timestamp.clone(),
            });
        }
    }
    if messages.is_empty() {
        messages.push(Message {
            sender: Sender::Assistant,
            text: GREETING.to_string(),
            timestamp,
        });
    }
    messages
}
