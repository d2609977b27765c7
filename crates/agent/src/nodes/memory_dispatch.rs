//! Memory dispatch: run the retrieve or persist the agent scheduled.

use std::sync::Arc;

use anemone_core::memory::MemoryStore;
use anemone_core::sink::SinkEvent;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::prompts::MEMORY_UNAVAILABLE;
use crate::state::{MemoryAction, TurnState};
use crate::step::{Label, RetryPolicy, Step, StepError, StepKind};

pub struct MemoryDispatchStep {
    store: Arc<dyn MemoryStore>,
    retry: RetryPolicy,
}

impl MemoryDispatchStep {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DispatchPrep {
    action: MemoryAction,
    query: Option<String>,
    transcript: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Retrieved { query: String, text: String },
    Persisted { id: Option<String> },
    Skipped,
}

#[async_trait]
impl Step for MemoryDispatchStep {
    type Prep = DispatchPrep;
    type Exec = DispatchOutcome;

    fn kind(&self) -> StepKind {
        StepKind::MemoryDispatch
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn prepare(&self, state: &TurnState) -> DispatchPrep {
        state.notify(SinkEvent::StateUpdate {
            loop_count: state.loop_count,
            memory_action: state.memory_action.to_string(),
        });

        let action = state.memory_action;
        DispatchPrep {
            action,
            query: state.last_user_message().map(str::to_string),
            transcript: match action {
                MemoryAction::Persist => state.serialize_history(),
                _ => String::new(),
            },
        }
    }

    async fn perform(&self, prep: &DispatchPrep) -> Result<DispatchOutcome, StepError> {
        match prep.action {
            MemoryAction::Retrieve => {
                let query = prep.query.as_deref().ok_or(StepError::MissingUserMessage)?;
                let text = self.store.retrieve(query).await?;
                Ok(DispatchOutcome::Retrieved {
                    query: query.to_string(),
                    text,
                })
            }
            MemoryAction::Persist => {
                let id = self.store.save(&prep.transcript).await?;
                Ok(DispatchOutcome::Persisted { id: Some(id) })
            }
            MemoryAction::None => Ok(DispatchOutcome::Skipped),
        }
    }

    fn fallback(&self, prep: &DispatchPrep, error: StepError) -> DispatchOutcome {
        match prep.action {
            MemoryAction::Retrieve => {
                warn!(store = self.store.name(), error = %error, "Memory retrieval failed");
                DispatchOutcome::Retrieved {
                    query: String::new(),
                    text: MEMORY_UNAVAILABLE.to_string(),
                }
            }
            MemoryAction::Persist => {
                warn!(store = self.store.name(), error = %error, "Persisting conversation failed, skipping");
                DispatchOutcome::Persisted { id: None }
            }
            MemoryAction::None => DispatchOutcome::Skipped,
        }
    }

    fn finalize(&self, state: &mut TurnState, _prep: DispatchPrep, exec: DispatchOutcome) -> Option<Label> {
        state.memory_action = MemoryAction::None;

        match exec {
            DispatchOutcome::Retrieved { query, text } => {
                info!(query = %query, found = !text.is_empty(), "Memory retrieved");
                if !text.is_empty() {
                    state.notify(SinkEvent::MemoryRetrieved {
                        query: query.clone(),
                        memory: text.clone(),
                    });
                }
                state.memory_query = query;
                state.memory_payload = text;
                state.retrieved_this_turn = true;
                Some(Label::Default)
            }
            DispatchOutcome::Persisted { id } => {
                if let Some(id) = id {
                    info!(id = %id, "Conversation persisted to memory");
                }
                None
            }
            DispatchOutcome::Skipped => {
                debug!("Memory dispatch with nothing to do");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemone_core::error::MemoryError;
    use anemone_core::message::Message;
    use std::time::Duration;

    use crate::step::Node;
    use crate::test_helpers::{RecordingSink, ScriptedMemory};

    fn step(store: &Arc<ScriptedMemory>) -> MemoryDispatchStep {
        MemoryDispatchStep::new(store.clone()).with_retry(RetryPolicy::new(0, Duration::ZERO))
    }

    #[tokio::test]
    async fn retrieve_uses_latest_user_message() {
        let store = Arc::new(ScriptedMemory::new().with_retrieval(Ok("Core Directive #1: explore")));
        let sink = Arc::new(RecordingSink::default());
        let mut state = TurnState::with_history(vec![
            Message::user("Hi"),
            Message::agent("Hello"),
            Message::user("What is your function?"),
        ])
        .with_sink(sink.clone());
        state.memory_action = MemoryAction::Retrieve;

        let label = step(&store).run(&mut state).await;

        assert_eq!(label, Some(Label::Default));
        assert_eq!(store.queries(), vec!["What is your function?".to_string()]);
        assert_eq!(state.memory_payload, "Core Directive #1: explore");
        assert_eq!(state.memory_query, "What is your function?");
        assert_eq!(state.memory_action, MemoryAction::None);
        assert!(state.retrieved_this_turn);
        assert_eq!(sink.event_types(), vec!["state_update", "memory_retrieved"]);
    }

    #[tokio::test]
    async fn empty_retrieval_is_not_announced() {
        let store = Arc::new(ScriptedMemory::new());
        let sink = Arc::new(RecordingSink::default());
        let mut state = TurnState::with_history(vec![Message::user("Anything?")]).with_sink(sink.clone());
        state.memory_action = MemoryAction::Retrieve;

        step(&store).run(&mut state).await;

        assert!(state.memory_payload.is_empty());
        assert!(state.retrieved_this_turn);
        assert_eq!(sink.event_types(), vec!["state_update"]);
    }

    #[tokio::test]
    async fn store_failure_yields_placeholder() {
        let store = Arc::new(
            ScriptedMemory::new().with_retrieval(Err(MemoryError::Unavailable("disk gone".into()))),
        );
        let mut state = TurnState::with_history(vec![Message::user("Remember me?")]);
        state.memory_action = MemoryAction::Retrieve;

        let label = step(&store).run(&mut state).await;

        assert_eq!(label, Some(Label::Default));
        assert_eq!(state.memory_payload, MEMORY_UNAVAILABLE);
        assert!(state.memory_query.is_empty());
    }

    #[tokio::test]
    async fn missing_user_message_is_a_failure_not_a_crash() {
        let store = Arc::new(ScriptedMemory::new());
        let mut state = TurnState::with_history(vec![Message::system("Summary of conversation so far: x")]);
        state.memory_action = MemoryAction::Retrieve;

        step(&store).run(&mut state).await;

        assert!(store.queries().is_empty());
        assert_eq!(state.memory_payload, MEMORY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn persist_saves_serialized_history() {
        let store = Arc::new(ScriptedMemory::new());
        let mut state = TurnState::with_history(vec![Message::system("Summary of conversation so far: we talked")]);
        state.memory_action = MemoryAction::Persist;

        let label = step(&store).run(&mut state).await;

        assert_eq!(label, None);
        assert_eq!(store.saved(), vec!["system: Summary of conversation so far: we talked".to_string()]);
        assert_eq!(state.memory_action, MemoryAction::None);
    }

    #[tokio::test]
    async fn persist_failure_is_skipped() {
        let store = Arc::new(ScriptedMemory::new().failing_save(MemoryError::Storage("read-only".into())));
        let mut state = TurnState::with_history(vec![Message::user("hi")]);
        state.memory_action = MemoryAction::Persist;

        let label = step(&store).run(&mut state).await;

        assert_eq!(label, None);
        assert!(store.saved().is_empty());
        assert_eq!(state.memory_action, MemoryAction::None);
    }
}
