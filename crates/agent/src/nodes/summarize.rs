//! Summarization: compact the whole history into one system entry.

use std::sync::Arc;

use anemone_core::message::Message;
use anemone_core::provider::{Provider, ProviderRequest};
use async_trait::async_trait;
use tracing::info;

use crate::prompts;
use crate::state::{MemoryAction, TurnState};
use crate::step::{Label, RetryPolicy, Step, StepError, StepKind};

pub struct SummarizeStep {
    provider: Arc<dyn Provider>,
    model: String,
    prompt: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl SummarizeStep {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            prompt: prompt.into(),
            temperature: 0.7,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Step for SummarizeStep {
    type Prep = Vec<Message>;
    type Exec = String;

    fn kind(&self) -> StepKind {
        StepKind::Summarize
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn prepare(&self, state: &TurnState) -> Vec<Message> {
        std::iter::once(Message::system(self.prompt.as_str()))
            .chain(state.history.iter().cloned())
            .collect()
    }

    async fn perform(&self, messages: &Vec<Message>) -> Result<String, StepError> {
        let request = ProviderRequest {
            temperature: self.temperature,
            ..ProviderRequest::new(self.model.as_str(), messages.clone())
        };
        let response = self.provider.complete(request).await?;
        Ok(response.content.trim().to_string())
    }

    fn fallback(&self, _messages: &Vec<Message>, error: StepError) -> String {
        error.diagnostic()
    }

    fn finalize(&self, state: &mut TurnState, messages: Vec<Message>, summary: String) -> Option<Label> {
        info!(entries = messages.len() - 1, summary_len = summary.len(), "History compacted");
        state.history = vec![Message::system(prompts::summary_entry(&summary))];

        // Persistence is the only thing that follows a compaction.
        (state.memory_action == MemoryAction::Persist).then_some(Label::Default)
    }
}
