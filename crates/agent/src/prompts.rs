//! Fixed texts the steps put into history or in front of the backend.

/// Prefix of the single system entry left behind by summarization.
pub const SUMMARY_PREFIX: &str = "Summary of conversation so far: ";

/// Payload substituted when the memory store cannot be reached.
pub const MEMORY_UNAVAILABLE: &str =
    "Memory store unavailable: I could not reach my memories right now.";

/// The system note that hands retrieved memory to the agent.
pub fn memory_context(query: &str, payload: &str) -> String {
    format!(
        "You just retrieved your memories, now use this added context to reply to the user\n\n\
         RETRIEVED MEMORIES:\nRetrieved memory for query {query}:\n {payload}"
    )
}

pub fn summary_entry(summary: &str) -> String {
    format!("{SUMMARY_PREFIX}{summary}")
}
