//! Per-conversation turn state.
//!
//! One [`TurnState`] lives as long as its conversation and is threaded
//! through every step of every turn. Steps hold no per-turn data of their
//! own; everything they need to hand to each other goes through here.

use std::sync::Arc;

use anemone_core::message::{Message, Role};
use anemone_core::sink::{SinkEvent, TransportSink};
use serde::{Deserialize, Serialize};

/// The pending instruction for the next memory dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryAction {
    #[default]
    None,
    Retrieve,
    Persist,
}

impl MemoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Retrieve => "retrieve",
            Self::Persist => "persist",
        }
    }
}

impl std::fmt::Display for MemoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutable record threaded through one conversation's turns.
#[derive(Default)]
pub struct TurnState {
    /// Dialogue plus synthetic system annotations, oldest first
    pub history: Vec<Message>,

    /// Completed agent responses; drives summarize/persist scheduling
    pub loop_count: u64,

    /// What the next memory dispatch should do
    pub memory_action: MemoryAction,

    /// Lookup key of the most recent retrieval (display only)
    pub memory_query: String,

    /// Text retrieved for the current turn, empty once consumed
    pub memory_payload: String,

    /// Whether a retrieval already ran since the last completed response
    pub retrieved_this_turn: bool,

    /// The agent response produced by the current turn, if any
    pub last_reply: Option<String>,

    sink: Option<Arc<dyn TransportSink>>,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing history.
    pub fn with_history(history: Vec<Message>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TransportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach or detach the transport sink.
    pub fn set_sink(&mut self, sink: Option<Arc<dyn TransportSink>>) {
        self.sink = sink;
    }

    pub fn sink(&self) -> Option<Arc<dyn TransportSink>> {
        self.sink.clone()
    }

    /// Send a notification if a sink is attached; silently skipped otherwise.
    pub fn notify(&self, event: SinkEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    /// Reset per-turn markers before running a new turn.
    ///
    /// Also drops memory left behind by a turn that was stopped early, so a
    /// payload is only ever used by the turn that retrieved it.
    pub fn begin_turn(&mut self) {
        self.last_reply = None;
        self.retrieved_this_turn = false;
        self.memory_action = MemoryAction::None;
        self.memory_query.clear();
        self.memory_payload.clear();
    }

    /// The explicit "clear conversation" reset.
    pub fn reset(&mut self) {
        self.history.clear();
        self.loop_count = 0;
        self.memory_action = MemoryAction::None;
        self.memory_query.clear();
        self.memory_payload.clear();
        self.retrieved_this_turn = false;
        self.last_reply = None;
    }

    /// The most recent user-authored entry.
    pub fn last_user_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Render the whole history as one `role: content` blob for persistence.
    pub fn serialize_history(&self) -> String {
        self.history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnState")
            .field("history", &self.history.len())
            .field("loop_count", &self.loop_count)
            .field("memory_action", &self.memory_action)
            .field("memory_query", &self.memory_query)
            .field("memory_payload", &self.memory_payload)
            .field("retrieved_this_turn", &self.retrieved_this_turn)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
