//! Loop guard for the retrieve sub-loop.
//!
//! A model that was already handed its memories may ask for them again.
//! Instead of cycling Agent → MemoryDispatch → Agent until the step cap
//! trips, the agent answers from the payload it already holds.

use crate::prompts::MEMORY_UNAVAILABLE;
use crate::state::TurnState;

/// Answer used when a retrieval already ran this turn and found nothing.
pub const EMPTY_RECALL_ANSWER: &str = "I tried to remember, but nothing came to mind.";

/// Answer used when the held payload is the store-unavailable placeholder.
pub const UNREACHABLE_RECALL_ANSWER: &str =
    "I tried to remember, but I could not reach my memories right now.";

/// Phrase a retrieved memory as a first-person answer.
///
/// A `label: content` payload keeps only the content.
pub fn synthesize_answer(payload: &str) -> String {
    match payload.split_once(": ") {
        Some((_, content)) => format!("According to my memory, {content}"),
        None => format!("I recall that {payload}"),
    }
}

/// The answer to substitute for a repeated retrieve command, if the guard applies.
///
/// Applies when memory for this turn is already present, or when a retrieval
/// already ran this turn and came back empty.
pub fn intercept(state: &TurnState) -> Option<String> {
    if state.memory_payload == MEMORY_UNAVAILABLE {
        Some(UNREACHABLE_RECALL_ANSWER.to_string())
    } else if !state.memory_payload.is_empty() {
        Some(synthesize_answer(&state.memory_payload))
    } else if state.retrieved_this_turn {
        Some(EMPTY_RECALL_ANSWER.to_string())
    } else {
        None
    }
}
