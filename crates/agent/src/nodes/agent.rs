//! The agent step: produce the user-visible reply or ask for memories.

use std::sync::Arc;
use std::time::Duration;

use anemone_core::error::ProviderError;
use anemone_core::message::Message;
use anemone_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use anemone_core::sink::{SinkEvent, TransportSink};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cleanup::{clean_response, is_retrieve_command, stable_prefix};
use crate::guard;
use crate::prompts;
use crate::state::{MemoryAction, TurnState};
use crate::step::{Label, RetryPolicy, Step, StepError, StepKind};
use crate::stream_buffer::StreamBuffer;

/// Which scheduled label, if any, follows the `loop_count`-th completed response.
///
/// Persistence wins when both periods divide the count; a period of 0 never fires.
pub fn schedule_label(loop_count: u64, persist_every: u64, summarize_every: u64) -> Option<Label> {
    let due = |period: u64| period > 0 && loop_count % period == 0;
    if due(persist_every) {
        Some(Label::Persist)
    } else if due(summarize_every) {
        Some(Label::MemoryFilter)
    } else {
        None
    }
}

pub struct AgentStep {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    system_prompt: String,
    persist_every: u64,
    summarize_every: u64,
    flush_chars: usize,
    retry: RetryPolicy,
    /// Bounds opening the stream and each wait for a fragment
    attempt_timeout: Option<Duration>,
}

impl AgentStep {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            system_prompt: system_prompt.into(),
            persist_every: 10,
            summarize_every: 5,
            flush_chars: crate::stream_buffer::DEFAULT_FLUSH_CHARS,
            retry: RetryPolicy::default(),
            attempt_timeout: None,
        }
        .with_retry(RetryPolicy::default())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_schedule(mut self, persist_every: u64, summarize_every: u64) -> Self {
        self.persist_every = persist_every;
        self.summarize_every = summarize_every;
        self
    }

    pub fn with_flush_chars(mut self, flush_chars: usize) -> Self {
        self.flush_chars = flush_chars;
        self
    }

    /// The policy's timeout is applied inside the stream, not around the
    /// whole attempt: an attempt that already emitted fragments is never
    /// repeated.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.attempt_timeout = retry.timeout;
        self.retry = RetryPolicy { timeout: None, ..retry };
        self
    }

    async fn open_stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, StepError> {
        let receiver = match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.stream(request))
                .await
                .map_err(|_| StepError::Timeout(limit))??,
            None => self.provider.stream(request).await?,
        };
        Ok(receiver)
    }

    async fn next_fragment(&self, fragments: &mut ChunkReceiver) -> Option<Result<StreamChunk, ProviderError>> {
        match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, fragments.recv()).await {
                Ok(item) => item,
                Err(_) => Some(Err(ProviderError::Timeout(format!(
                    "no fragment for {}s",
                    limit.as_secs()
                )))),
            },
            None => fragments.recv().await,
        }
    }

    /// Record a finished reply and pick the scheduled label.
    fn complete_response(&self, state: &mut TurnState, text: String) -> Option<Label> {
        let message = Message::agent(text.clone());
        state.notify(SinkEvent::new_message(&message));
        state.history.push(message);
        state.last_reply = Some(text);
        state.loop_count += 1;
        state.memory_payload.clear();
        state.memory_query.clear();
        state.retrieved_this_turn = false;

        let label = schedule_label(state.loop_count, self.persist_every, self.summarize_every);
        if label == Some(Label::Persist) {
            state.memory_action = MemoryAction::Persist;
        }
        debug!(loop_count = state.loop_count, label = ?label, "Agent response recorded");
        label
    }
}

pub struct AgentPrep {
    messages: Vec<Message>,
    sink: Option<Arc<dyn TransportSink>>,
}

impl AgentPrep {
    fn emit(&self, fragment: impl Into<String>) {
        if let Some(sink) = &self.sink {
            sink.emit(SinkEvent::chunk(fragment));
        }
    }
}

/// The cleaned backend response, or the command it turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub is_command: bool,
}

#[async_trait]
impl Step for AgentStep {
    type Prep = AgentPrep;
    type Exec = AgentReply;

    fn kind(&self) -> StepKind {
        StepKind::Agent
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn prepare(&self, state: &TurnState) -> AgentPrep {
        let mut messages = Vec::with_capacity(state.history.len() + 2);
        messages.push(Message::system(self.system_prompt.as_str()));
        messages.extend(state.history.iter().cloned());
        if !state.memory_payload.is_empty() {
            messages.push(Message::system(prompts::memory_context(
                &state.memory_query,
                &state.memory_payload,
            )));
        }
        AgentPrep {
            messages,
            sink: state.sink(),
        }
    }

    async fn perform(&self, prep: &AgentPrep) -> Result<AgentReply, StepError> {
        let request = ProviderRequest {
            temperature: self.temperature,
            stream: true,
            ..ProviderRequest::new(self.model.as_str(), prep.messages.clone())
        };
        let mut fragments = self.open_stream(request).await?;

        let mut raw = String::new();
        let mut buffer = StreamBuffer::new(self.flush_chars);

        while let Some(item) = self.next_fragment(&mut fragments).await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    let cleaned = clean_response(&raw);
                    if buffer.is_suspended() {
                        return Ok(AgentReply {
                            text: cleaned,
                            is_command: true,
                        });
                    }

                    warn!(error = %e, received = raw.len(), "Backend stream failed mid-response");
                    if let Some(fragment) = buffer.finish(&cleaned) {
                        prep.emit(fragment);
                    }
                    let diagnostic = e.diagnostic();
                    let text = if cleaned.is_empty() {
                        prep.emit(diagnostic.as_str());
                        diagnostic
                    } else {
                        prep.emit(format!(" {diagnostic}"));
                        format!("{cleaned} {diagnostic}")
                    };
                    return Ok(AgentReply {
                        text,
                        is_command: false,
                    });
                }
            };

            let Some(content) = chunk.content.filter(|c| !c.is_empty()) else {
                continue;
            };
            raw.push_str(&content);
            if buffer.is_suspended() {
                continue;
            }

            let cleaned = clean_response(&raw);
            if is_retrieve_command(&cleaned) {
                debug!("Retrieve command detected, suppressing stream");
                buffer.suspend();
                continue;
            }
            if let Some(fragment) = buffer.offer(stable_prefix(&cleaned)) {
                prep.emit(fragment);
            }
        }

        let cleaned = clean_response(&raw);
        let is_command = buffer.is_suspended() || is_retrieve_command(&cleaned);
        if !is_command {
            if let Some(fragment) = buffer.finish(&cleaned) {
                prep.emit(fragment);
            }
        }
        Ok(AgentReply {
            text: cleaned,
            is_command,
        })
    }

    fn fallback(&self, prep: &AgentPrep, error: StepError) -> AgentReply {
        let text = error.diagnostic();
        prep.emit(text.as_str());
        AgentReply {
            text,
            is_command: false,
        }
    }

    fn finalize(&self, state: &mut TurnState, _prep: AgentPrep, exec: AgentReply) -> Option<Label> {
        if !exec.is_command {
            return self.complete_response(state, exec.text);
        }

        match guard::intercept(state) {
            Some(answer) => {
                info!(
                    payload_len = state.memory_payload.len(),
                    "Repeated retrieve command answered from held memory"
                );
                state.notify(SinkEvent::chunk(answer.as_str()));
                self.complete_response(state, answer)
            }
            None => {
                state.memory_action = MemoryAction::Retrieve;
                Some(Label::Retrieve)
            }
        }
    }
}
