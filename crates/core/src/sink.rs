//! Transport sink: where a turn's notifications go.
//!
//! The presentation layer (WebSocket, SSE, terminal) is modelled purely as a
//! fire-and-forget receiver of [`SinkEvent`]s. Emitting never blocks and never
//! fails from the caller's point of view; a closed receiver is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message::{Message, Role};

/// Coarse processing state shown by front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Processing,
    Idle,
    Error,
}

/// A notification emitted during a turn.
///
/// Serialized with a `type` tag so the JSON frames can be forwarded to web
/// clients as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    /// A history entry became visible
    NewMessage {
        role: Role,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// Processing state changed
    StatusUpdate { status: TurnStatus, message: String },

    /// An incremental piece of the agent's reply
    StreamChunk { content: String },

    /// A memory was retrieved for the current turn
    MemoryRetrieved { query: String, memory: String },

    /// Counters after a turn or a dispatch
    StateUpdate { loop_count: u64, memory_action: String },

    /// The conversation was reset
    ConversationCleared,
}

impl SinkEvent {
    /// The wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::StatusUpdate { .. } => "status_update",
            Self::StreamChunk { .. } => "stream_chunk",
            Self::MemoryRetrieved { .. } => "memory_retrieved",
            Self::StateUpdate { .. } => "state_update",
            Self::ConversationCleared => "conversation_cleared",
        }
    }

    pub fn status(status: TurnStatus, message: impl Into<String>) -> Self {
        Self::StatusUpdate {
            status,
            message: message.into(),
        }
    }

    pub fn chunk(content: impl Into<String>) -> Self {
        Self::StreamChunk {
            content: content.into(),
        }
    }

    /// Announce a history entry.
    pub fn new_message(message: &Message) -> Self {
        Self::NewMessage {
            role: message.role,
            content: message.content.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// Receiver of turn notifications.
pub trait TransportSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: SinkEvent);
}

/// A sink that forwards events into an unbounded tokio channel.
///
/// Used by the gateway (one per socket / SSE response) and the terminal chat.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransportSink for ChannelSink {
    fn emit(&self, event: SinkEvent) {
        // Receiver gone means the client disconnected; nothing to do.
        let _ = self.tx.send(event);
    }
}
