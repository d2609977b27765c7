//! The three steps of a turn.

pub mod agent;
pub mod memory_dispatch;
pub mod summarize;

pub use agent::{AgentReply, AgentStep, schedule_label};
pub use memory_dispatch::{DispatchOutcome, MemoryDispatchStep};
pub use summarize::SummarizeStep;
