//! The turn engine of Anemone.
//!
//! A turn starts when a user message lands in a conversation and ends when
//! no step asks to go anywhere else. Three steps make up the graph:
//!
//! 1. **Agent** streams a reply from the backend, or asks for memories by
//!    answering `retrieve_memory`
//! 2. **Memory dispatch** retrieves for the latest user message, or persists
//!    the compacted conversation
//! 3. **Summarize** collapses the history into one system entry
//!
//! Every step follows the same prepare → perform → finalize contract
//! ([`Step`]), and the [`Flow`] kernel moves between them through a
//! `(step, label)` table with a hard cap on steps per turn.
//!
//! The [`ConversationRuntime`] is what hosts (gateway, terminal chat) talk to.

pub mod cleanup;
pub mod flow;
pub mod guard;
pub mod nodes;
pub mod prompts;
pub mod runtime;
pub mod state;
pub mod step;
pub mod stream_buffer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cleanup::{RETRIEVE_COMMAND, clean_response, is_retrieve_command};
pub use flow::{Flow, FlowError, FlowOutcome, FlowSettings, build_flow};
pub use nodes::{AgentStep, MemoryDispatchStep, SummarizeStep};
pub use runtime::{ConversationRuntime, ConversationSnapshot, RuntimeError, TurnOutcome};
pub use state::{MemoryAction, TurnState};
pub use step::{Label, Node, RetryPolicy, Step, StepError, StepKind};
pub use stream_buffer::StreamBuffer;
