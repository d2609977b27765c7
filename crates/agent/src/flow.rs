//! The execution kernel.
//!
//! A [`Flow`] is a table of nodes keyed by [`StepKind`] and a transition
//! table keyed by `(StepKind, Label)`. Running it is a plain loop: run the
//! current node, look its label up, move on, until a node yields no label
//! or the step cap is hit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anemone_config::{AppConfig, DEFAULT_SUMMARY_PROMPT, DEFAULT_SYSTEM_PROMPT};
use anemone_core::memory::MemoryStore;
use anemone_core::provider::Provider;
use tracing::{debug, warn};

use crate::nodes::{AgentStep, MemoryDispatchStep, SummarizeStep};
use crate::state::TurnState;
use crate::step::{Label, Node, RetryPolicy, Step, StepKind};
use crate::stream_buffer::DEFAULT_FLUSH_CHARS;

/// Default hard cap on steps executed in one turn.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// A turn that the kernel had to stop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("step limit of {limit} exceeded (last step: {last_step})")]
    StepLimitExceeded { limit: usize, last_step: StepKind },

    #[error("no node registered for step '{0}'")]
    MissingStep(StepKind),
}

/// How a completed turn went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutcome {
    /// Steps executed, the first one included
    pub steps: usize,
    pub last_step: StepKind,
    /// Every step in execution order
    pub path: Vec<StepKind>,
}

pub struct Flow {
    start: StepKind,
    nodes: HashMap<StepKind, Arc<dyn Node>>,
    transitions: HashMap<(StepKind, Label), StepKind>,
    max_steps: usize,
}

impl Flow {
    pub fn new(start: StepKind) -> Self {
        Self {
            start,
            nodes: HashMap::new(),
            transitions: HashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Register a step under its own kind.
    pub fn with_step<S: Step + 'static>(self, step: S) -> Self {
        let kind = step.kind();
        self.with_node(kind, Arc::new(step))
    }

    pub fn with_node(mut self, kind: StepKind, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(kind, node);
        self
    }

    pub fn with_transition(mut self, from: StepKind, label: Label, to: StepKind) -> Self {
        self.transitions.insert((from, label), to);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Where `label` leads from `from`, if anywhere.
    pub fn next(&self, from: StepKind, label: Label) -> Option<StepKind> {
        self.transitions.get(&(from, label)).copied()
    }

    /// Run one turn against `state`.
    ///
    /// On [`FlowError::StepLimitExceeded`] the state is left as the last
    /// completed step finalized it.
    pub async fn run(&self, state: &mut TurnState) -> Result<FlowOutcome, FlowError> {
        let mut current = self.start;
        let mut path = Vec::new();

        loop {
            if path.len() >= self.max_steps {
                let last_step = path.last().copied().unwrap_or(current);
                warn!(limit = self.max_steps, last_step = %last_step, "Step limit exceeded, stopping turn");
                return Err(FlowError::StepLimitExceeded {
                    limit: self.max_steps,
                    last_step,
                });
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or(FlowError::MissingStep(current))?;
            path.push(current);

            let Some(label) = node.run(state).await else {
                debug!(step = %current, steps = path.len(), "Turn finished");
                break;
            };

            match self.next(current, label) {
                Some(next) => {
                    debug!(step = %current, label = %label, next = %next, "Transition");
                    current = next;
                }
                None => {
                    warn!(step = %current, label = %label, "No transition for label, ending turn");
                    break;
                }
            }
        }

        Ok(FlowOutcome {
            steps: path.len(),
            last_step: current,
            path,
        })
    }
}

/// Plain values the turn graph is built from.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub model: String,
    pub summary_model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub summary_prompt: String,
    pub persist_every: u64,
    pub summarize_every: u64,
    pub max_steps: usize,
    pub retry: RetryPolicy,
    pub stream_flush_chars: usize,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            model: "phi4-mini".into(),
            summary_model: "phi4-mini".into(),
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            summary_prompt: DEFAULT_SUMMARY_PROMPT.into(),
            persist_every: 10,
            summarize_every: 5,
            max_steps: DEFAULT_MAX_STEPS,
            retry: RetryPolicy::default(),
            stream_flush_chars: DEFAULT_FLUSH_CHARS,
        }
    }
}

impl From<&AppConfig> for FlowSettings {
    fn from(config: &AppConfig) -> Self {
        let agent = &config.agent;
        Self {
            model: config.default_model.clone(),
            summary_model: config.summary_model().to_string(),
            temperature: config.default_temperature,
            system_prompt: agent.system_prompt.clone(),
            summary_prompt: agent.summary_prompt.clone(),
            persist_every: agent.persist_every,
            summarize_every: agent.summarize_every,
            max_steps: agent.max_steps,
            retry: RetryPolicy::new(agent.max_retries, Duration::from_millis(agent.retry_wait_ms))
                .with_timeout(Duration::from_secs(agent.request_timeout_secs)),
            stream_flush_chars: agent.stream_flush_chars,
        }
    }
}

/// The conversational turn graph.
///
/// ```text
/// agent --retrieve_memory--> memory_dispatch --default--> agent
/// agent --persist----------> summarize --default--> memory_dispatch
/// agent --memory_filter----> summarize
/// ```
pub fn build_flow(settings: &FlowSettings, provider: Arc<dyn Provider>, memory: Arc<dyn MemoryStore>) -> Flow {
    let agent = AgentStep::new(provider.clone(), settings.model.as_str(), settings.system_prompt.as_str())
        .with_temperature(settings.temperature)
        .with_schedule(settings.persist_every, settings.summarize_every)
        .with_flush_chars(settings.stream_flush_chars)
        .with_retry(settings.retry);
    let dispatch = MemoryDispatchStep::new(memory).with_retry(settings.retry);
    let summarize = SummarizeStep::new(provider, settings.summary_model.as_str(), settings.summary_prompt.as_str())
        .with_temperature(settings.temperature)
        .with_retry(settings.retry);

    Flow::new(StepKind::Agent)
        .with_step(agent)
        .with_step(dispatch)
        .with_step(summarize)
        .with_transition(StepKind::Agent, Label::Retrieve, StepKind::MemoryDispatch)
        .with_transition(StepKind::MemoryDispatch, Label::Default, StepKind::Agent)
        .with_transition(StepKind::Agent, Label::Persist, StepKind::Summarize)
        .with_transition(StepKind::Summarize, Label::Default, StepKind::MemoryDispatch)
        .with_transition(StepKind::Agent, Label::MemoryFilter, StepKind::Summarize)
        .with_max_steps(settings.max_steps)
}
