//! Host-side conversation runtime.
//!
//! Owns the map from conversation id to turn state. Each conversation's
//! state sits behind its own async mutex, so turns of one conversation run
//! one after another while different conversations proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use anemone_config::AppConfig;
use anemone_core::memory::MemoryStore;
use anemone_core::message::{ConversationId, Message};
use anemone_core::provider::Provider;
use anemone_core::sink::{SinkEvent, TransportSink, TurnStatus};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{error, info};

use crate::flow::{Flow, FlowError, FlowSettings, build_flow};
use crate::state::{MemoryAction, TurnState};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Flow(#[from] FlowError),
}

/// What a submitted turn produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub reply: Option<String>,
    pub loop_count: u64,
    pub steps: usize,
}

/// A read-only view of one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub history: Vec<Message>,
    pub loop_count: u64,
    pub memory_action: MemoryAction,
    pub memory_query: String,
}

/// A conversation's state locked for one turn, with the turn's sink attached.
///
/// Dropping it detaches the sink, including when the caller abandons
/// `submit` halfway through.
struct AttachedTurn<'a> {
    state: MutexGuard<'a, TurnState>,
}

impl<'a> AttachedTurn<'a> {
    fn new(mut state: MutexGuard<'a, TurnState>, sink: Option<Arc<dyn TransportSink>>) -> Self {
        state.set_sink(sink);
        Self { state }
    }
}

impl std::ops::Deref for AttachedTurn<'_> {
    type Target = TurnState;

    fn deref(&self) -> &TurnState {
        &self.state
    }
}

impl std::ops::DerefMut for AttachedTurn<'_> {
    fn deref_mut(&mut self) -> &mut TurnState {
        &mut self.state
    }
}

impl Drop for AttachedTurn<'_> {
    fn drop(&mut self) {
        self.state.set_sink(None);
    }
}

pub struct ConversationRuntime {
    flow: Flow,
    agent_name: String,
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<TurnState>>>>,
}

impl ConversationRuntime {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            agent_name: "Anemone".into(),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Build the standard turn graph from configuration.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, memory: Arc<dyn MemoryStore>) -> Self {
        let settings = FlowSettings::from(config);
        Self::new(build_flow(&settings, provider, memory)).with_agent_name(config.agent.name.as_str())
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    async fn conversation(&self, id: &ConversationId) -> Arc<Mutex<TurnState>> {
        if let Some(state) = self.conversations.read().await.get(id) {
            return state.clone();
        }
        self.conversations
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Run one turn for `id` with a new user message.
    ///
    /// The sink, if any, is attached for the duration of the turn only.
    pub async fn submit(
        &self,
        id: &ConversationId,
        text: &str,
        sink: Option<Arc<dyn TransportSink>>,
    ) -> Result<TurnOutcome, RuntimeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RuntimeError::EmptyMessage);
        }

        let conversation = self.conversation(id).await;
        let mut state = AttachedTurn::new(conversation.lock().await, sink);
        state.begin_turn();

        let message = Message::user(text);
        state.notify(SinkEvent::new_message(&message));
        state.history.push(message);
        state.notify(SinkEvent::status(
            TurnStatus::Processing,
            format!("{} is thinking...", self.agent_name),
        ));

        info!(conversation = %id, loop_count = state.loop_count, "Turn started");
        let result = self.flow.run(&mut *state).await;

        let outcome = match result {
            Ok(flow) => {
                state.notify(SinkEvent::StateUpdate {
                    loop_count: state.loop_count,
                    memory_action: state.memory_action.to_string(),
                });
                state.notify(SinkEvent::status(TurnStatus::Idle, ""));
                info!(conversation = %id, steps = flow.steps, loop_count = state.loop_count, "Turn finished");
                Ok(TurnOutcome {
                    reply: state.last_reply.clone(),
                    loop_count: state.loop_count,
                    steps: flow.steps,
                })
            }
            Err(e) => {
                error!(conversation = %id, error = %e, "Turn aborted");
                state.notify(SinkEvent::status(TurnStatus::Error, format!("Error: {e}")));
                Err(e.into())
            }
        };

        outcome
    }

    /// Empty the conversation's history and counters.
    pub async fn clear(&self, id: &ConversationId, sink: Option<Arc<dyn TransportSink>>) {
        let conversation = self.conversation(id).await;
        let mut state = conversation.lock().await;
        state.reset();
        if let Some(sink) = sink {
            sink.emit(SinkEvent::ConversationCleared);
        }
        info!(conversation = %id, "Conversation cleared");
    }

    pub async fn snapshot(&self, id: &ConversationId) -> Option<ConversationSnapshot> {
        let conversation = self.conversations.read().await.get(id)?.clone();
        let state = conversation.lock().await;
        Some(ConversationSnapshot {
            conversation_id: id.clone(),
            history: state.history.clone(),
            loop_count: state.loop_count,
            memory_action: state.memory_action,
            memory_query: state.memory_query.clone(),
        })
    }

    /// Forget a conversation entirely. Returns whether it existed.
    pub async fn remove(&self, id: &ConversationId) -> bool {
        self.conversations.write().await.remove(id).is_some()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}
