//! # Anemone Core
//!
//! Domain types, collaborator traits, and error definitions for the Anemone
//! conversational agent. This crate has **no I/O of its own**; it defines
//! the contracts that the backend, memory store, and transport crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: the language-model backend (blocking and streaming chat)
//! - [`MemoryStore`]: the content-addressable similarity store
//! - [`TransportSink`]: the fire-and-forget notification sink
//!
//! The turn orchestration engine in `anemone-agent` only ever talks to these
//! traits, so every collaborator can be swapped for a scripted double in tests.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod sink;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result};
pub use memory::{MemoryEntry, MemoryStore};
pub use message::{ConversationId, Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use sink::{ChannelSink, SinkEvent, TransportSink, TurnStatus};
