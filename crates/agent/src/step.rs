//! The step contract: prepare → perform → finalize.
//!
//! Side-effecting I/O lives in `perform` and is the only phase that is ever
//! retried. `prepare` is a pure read of [`TurnState`]; `finalize` is the only
//! phase that mutates it, and it always receives a definite result (the
//! real one, or the degraded one from `fallback`).

use std::time::Duration;

use anemone_core::error::{MemoryError, ProviderError};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::state::TurnState;

/// Identity of a step in the turn graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Agent,
    MemoryDispatch,
    Summarize,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::MemoryDispatch => "memory_dispatch",
            Self::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value a step's finalize returns to pick the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    /// The agent asked for its memories
    #[serde(rename = "retrieve_memory")]
    Retrieve,
    /// Time to compact history and persist it
    #[serde(rename = "persist")]
    Persist,
    /// Time to compact history
    #[serde(rename = "memory_filter")]
    MemoryFilter,
    /// Hand control back along the default edge
    #[serde(rename = "default")]
    Default,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieve => "retrieve_memory",
            Self::Persist => "persist",
            Self::MemoryFilter => "memory_filter",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry parameters for a step's `perform` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Delay between attempts
    pub wait: Duration,

    /// Bound on a single attempt; an elapsed attempt counts as a failure
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        Self {
            max_retries,
            wait,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Total attempts, first one included.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            wait: Duration::ZERO,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Why one `perform` attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("no user message to use as a memory query")]
    MissingUserMessage,
}

impl StepError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingUserMessage)
    }

    /// User-legible degraded text for this failure.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Provider(e) => e.diagnostic(),
            Self::Timeout(limit) => format!(
                "Error: Timed out after {}s waiting for the language model backend. Is it running?",
                limit.as_secs()
            ),
            Self::Memory(e) => format!("Error: Memory store unavailable ({e})."),
            Self::MissingUserMessage => "Error: There is no message to search my memory for.".into(),
        }
    }
}

/// One unit of the turn graph.
///
/// Implementations are stateless definitions (model, prompt, retry policy);
/// all per-turn data flows through [`TurnState`].
#[async_trait]
pub trait Step: Send + Sync {
    /// What `prepare` hands to `perform` and `finalize`.
    type Prep: Send + Sync;

    /// What `perform` (or `fallback`) produces.
    type Exec: Send;

    fn kind(&self) -> StepKind;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Read what the step needs from the turn state.
    fn prepare(&self, state: &TurnState) -> Self::Prep;

    /// Do the step's I/O. May be attempted several times.
    async fn perform(&self, prep: &Self::Prep) -> Result<Self::Exec, StepError>;

    /// Degraded-but-valid result once every attempt has failed.
    fn fallback(&self, prep: &Self::Prep, error: StepError) -> Self::Exec;

    /// Apply the result to the turn state and pick the outgoing label.
    fn finalize(&self, state: &mut TurnState, prep: Self::Prep, exec: Self::Exec) -> Option<Label>;
}

/// A runnable node of the turn graph.
///
/// Every [`Step`] is a node; the blanket impl supplies the retry loop.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &mut TurnState) -> Option<Label>;
}

#[async_trait]
impl<S> Node for S
where
    S: Step,
{
    async fn run(&self, state: &mut TurnState) -> Option<Label> {
        let prep = self.prepare(state);
        let exec = perform_with_retry(self, &prep).await;
        self.finalize(state, prep, exec)
    }
}

/// Run `perform` under the step's retry policy, falling back on exhaustion.
pub async fn perform_with_retry<S>(step: &S, prep: &S::Prep) -> S::Exec
where
    S: Step + ?Sized,
{
    let policy = step.retry_policy();
    let attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match policy.timeout {
            Some(limit) => tokio::time::timeout(limit, step.perform(prep))
                .await
                .unwrap_or(Err(StepError::Timeout(limit))),
            None => step.perform(prep).await,
        };

        let error = match result {
            Ok(exec) => {
                if attempt > 1 {
                    debug!(step = %step.kind(), attempt, "Step succeeded after retry");
                }
                return exec;
            }
            Err(e) => e,
        };

        if attempt >= attempts || !error.is_retryable() {
            warn!(step = %step.kind(), attempt, error = %error, "Step failed, using degraded result");
            return step.fallback(prep, error);
        }

        warn!(step = %step.kind(), attempt, error = %error, "Step attempt failed, retrying");
        if !policy.wait.is_zero() {
            tokio::time::sleep(policy.wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times, then succeeds with the attempt number.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        policy: RetryPolicy,
        error: StepError,
    }

    impl Flaky {
        fn new(failures: u32, max_retries: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                policy: RetryPolicy::new(max_retries, Duration::ZERO),
                error: StepError::Provider(ProviderError::Network("refused".into())),
            }
        }
    }

    #[async_trait]
    impl Step for Flaky {
        type Prep = ();
        type Exec = String;

        fn kind(&self) -> StepKind {
            StepKind::Agent
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy
        }

        fn prepare(&self, _state: &TurnState) {}

        async fn perform(&self, _prep: &()) -> Result<String, StepError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(format!("ok on attempt {call}"))
            }
        }

        fn fallback(&self, _prep: &(), error: StepError) -> String {
            error.diagnostic()
        }

        fn finalize(&self, state: &mut TurnState, _prep: (), exec: String) -> Option<Label> {
            state.last_reply = Some(exec);
            None
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let step = Flaky::new(1, 1);
        let mut state = TurnState::new();
        step.run(&mut state).await;
        assert_eq!(state.last_reply.as_deref(), Some("ok on attempt 2"));
        assert_eq!(step.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn falls_back_after_exhausting_retries() {
        let step = Flaky::new(10, 2);
        let mut state = TurnState::new();
        step.run(&mut state).await;
        assert_eq!(step.calls.load(Ordering::SeqCst), 3);
        assert!(state.last_reply.unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn non_retryable_errors_skip_retries() {
        let mut step = Flaky::new(10, 5);
        step.error = StepError::MissingUserMessage;
        let mut state = TurnState::new();
        step.run(&mut state).await;
        assert_eq!(step.calls.load(Ordering::SeqCst), 1);
    }

    struct Hangs;

    #[async_trait]
    impl Step for Hangs {
        type Prep = ();
        type Exec = String;

        fn kind(&self) -> StepKind {
            StepKind::Summarize
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::new(1, Duration::from_millis(10)).with_timeout(Duration::from_secs(5))
        }

        fn prepare(&self, _state: &TurnState) {}

        async fn perform(&self, _prep: &()) -> Result<String, StepError> {
            std::future::pending().await
        }

        fn fallback(&self, _prep: &(), error: StepError) -> String {
            error.to_string()
        }

        fn finalize(&self, state: &mut TurnState, _prep: (), exec: String) -> Option<Label> {
            state.last_reply = Some(exec);
            Some(Label::Default)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempts_fall_back_without_partial_state() {
        let mut state = TurnState::new();
        let label = Hangs.run(&mut state).await;
        assert_eq!(label, Some(Label::Default));
        assert!(state.last_reply.unwrap().contains("timed out"));
    }

    #[test]
    fn policy_counts_first_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
        assert_eq!(RetryPolicy::default().attempts(), 2);
    }

    #[test]
    fn label_wire_names() {
        assert_eq!(Label::Retrieve.to_string(), "retrieve_memory");
        assert_eq!(Label::MemoryFilter.as_str(), "memory_filter");
        assert_eq!(StepKind::MemoryDispatch.to_string(), "memory_dispatch");
    }
}
