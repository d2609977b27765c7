//! Scripted collaborators shared by the agent crate's tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anemone_core::error::{MemoryError, ProviderError};
use anemone_core::memory::MemoryStore;
use anemone_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use anemone_core::sink::{SinkEvent, TransportSink};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// What one streaming call does.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Deliver these fragments, then end normally
    Fragments(Vec<String>),
    /// Fail before any fragment is produced
    FailToStart(ProviderError),
    /// Deliver these fragments, then fail mid-stream
    FailAfter(Vec<String>, ProviderError),
    /// Deliver these fragments, then go silent with the stream still open
    StallAfter(Vec<String>),
    /// Never answer
    Hang,
}

impl StreamScript {
    pub fn reply(fragments: &[&str]) -> Self {
        Self::Fragments(fragments.iter().map(|f| f.to_string()).collect())
    }
}

/// A backend that plays back queued scripts and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    streams: Mutex<VecDeque<StreamScript>>,
    completions: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    stalled: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    /// Shorthand for a stream that delivers `fragments` and ends.
    pub fn with_reply(self, fragments: &[&str]) -> Self {
        self.with_stream(StreamScript::reply(fragments))
    }

    pub fn with_completion(self, result: Result<&str, ProviderError>) -> Self {
        self.completions
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string));
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stream_calls(&self) -> usize {
        self.requests().iter().filter(|r| r.stream).count()
    }

    pub fn completion_calls(&self) -> usize {
        self.requests().iter().filter(|r| !r.stream).count()
    }
}

#[async_trait]
impl Provider for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self.completions.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(ProviderResponse {
                content,
                usage: None,
                model,
            }),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::NotConfigured("no scripted completion left".into())),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.streams.lock().unwrap().pop_front();
        let (fragments, failure) = match next {
            Some(StreamScript::Fragments(fragments)) => (fragments, None),
            Some(StreamScript::FailAfter(fragments, e)) => (fragments, Some(e)),
            Some(StreamScript::FailToStart(e)) => return Err(e),
            Some(StreamScript::StallAfter(fragments)) => {
                let (tx, rx) = mpsc::channel(fragments.len() + 1);
                for fragment in fragments {
                    let _ = tx.try_send(Ok(StreamChunk::text(fragment)));
                }
                self.stalled.lock().unwrap().push(tx);
                return Ok(rx);
            }
            Some(StreamScript::Hang) => std::future::pending().await,
            None => return Err(ProviderError::NotConfigured("no scripted stream left".into())),
        };

        let (tx, rx) = mpsc::channel(fragments.len() + 2);
        for fragment in fragments {
            let _ = tx.try_send(Ok(StreamChunk::text(fragment)));
        }
        match failure {
            Some(e) => {
                let _ = tx.try_send(Err(e));
            }
            None => {
                let _ = tx.try_send(Ok(StreamChunk {
                    done: true,
                    ..StreamChunk::default()
                }));
            }
        }
        Ok(rx)
    }
}

/// A memory store with queued retrieval results.
#[derive(Default)]
pub struct ScriptedMemory {
    retrievals: Mutex<VecDeque<Result<String, MemoryError>>>,
    saves: Mutex<VecDeque<Result<(), MemoryError>>>,
    saved: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retrieval(self, result: Result<&str, MemoryError>) -> Self {
        self.retrievals
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string));
        self
    }

    pub fn failing_save(self, error: MemoryError) -> Self {
        self.saves.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryStore for ScriptedMemory {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn save(&self, text: &str) -> Result<String, MemoryError> {
        if let Some(Err(e)) = self.saves.lock().unwrap().pop_front() {
            return Err(e);
        }
        let mut saved = self.saved.lock().unwrap();
        saved.push(text.to_string());
        Ok(format!("mem-{}", saved.len()))
    }

    async fn retrieve(&self, query: &str) -> Result<String, MemoryError> {
        self.queries.lock().unwrap().push(query.to_string());
        let next = self.retrievals.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(String::new()))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.saved.lock().unwrap().len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.saved.lock().unwrap().clear();
        Ok(())
    }
}

/// A sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(SinkEvent::event_type).collect()
    }

    pub fn chunks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::StreamChunk { content } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn streamed_text(&self) -> String {
        self.chunks().concat()
    }
}

impl TransportSink for RecordingSink {
    fn emit(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}
