//! Error types for the Anemone domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error enum; none of them is meant
//! to cross a turn boundary; the steps absorb them into degraded results.

use thiserror::Error;

/// The top-level error type for Anemone operations outside the turn engine.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// The user-legible text a step substitutes for a failed backend call.
    ///
    /// Degraded results are shown to the user as agent-authored text, so the
    /// wording avoids internal detail beyond a short cause.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Network(_) => "Error: Cannot connect to the language model backend. \
                 Please make sure it is running."
                .into(),
            Self::Timeout(_) => "Error: Timed out waiting for the language model backend. \
                 Is it running?"
                .into(),
            Self::StreamInterrupted(reason) => {
                format!("Error: The response stream was interrupted ({reason}).")
            }
            Self::ModelNotFound(model) => {
                format!("Error: The model '{model}' is not available on the backend.")
            }
            Self::RateLimited { retry_after_secs } => format!(
                "Error: The backend is rate limiting requests, try again in {retry_after_secs}s."
            ),
            Self::AuthenticationFailed(_) => {
                "Error: The backend rejected the configured credentials.".into()
            }
            Self::NotConfigured(what) => format!("Error: Backend not configured: {what}."),
            Self::ApiError { status_code, message } => {
                let short: String = message.chars().take(100).collect();
                format!("Error during LLM call (status {status_code}): {short}")
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Memory store unavailable: {0}")]
    Unavailable(String),
}
