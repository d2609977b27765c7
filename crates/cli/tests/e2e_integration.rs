//! End-to-end tests for the Anemone turn engine.
//!
//! These drive whole conversations through `ConversationRuntime` with a
//! scripted backend and real memory stores, from user input to the reply,
//! the history left behind, and what ended up in memory.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anemone_agent::{ConversationRuntime, FlowSettings, RetryPolicy, build_flow};
use anemone_core::error::ProviderError;
use anemone_core::memory::MemoryStore;
use anemone_core::message::{ConversationId, Role};
use anemone_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use anemone_core::sink::{SinkEvent, TransportSink};
use anemone_memory::{FileStore, InMemoryStore};

// ── Scripted backend ─────────────────────────────────────────────────────

/// Streams scripted replies fragment by fragment and answers summaries from
/// a separate queue. Every request is recorded.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Vec<String>>>,
    summaries: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedBackend {
    fn reply(self, fragments: &[&str]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(fragments.iter().map(|f| f.to_string()).collect());
        self
    }

    fn summary(self, text: &str) -> Self {
        self.summaries.lock().unwrap().push_back(text.to_string());
        self
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedBackend {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let content = self
            .summaries
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("summary script exhausted".into()))?;
        Ok(ProviderResponse {
            content,
            usage: None,
            model: "scripted".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let fragments = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("reply script exhausted".into()))?;

        let (tx, rx) = tokio::sync::mpsc::channel(fragments.len() + 1);
        for fragment in fragments {
            tx.send(Ok(StreamChunk::text(fragment))).await.unwrap();
        }
        tx.send(Ok(StreamChunk {
            done: true,
            ..Default::default()
        }))
        .await
        .unwrap();
        Ok(rx)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    fn streamed_text(&self) -> String {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::StreamChunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    fn retrieved(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::MemoryRetrieved { query, memory } => Some((query.clone(), memory.clone())),
                _ => None,
            })
            .collect()
    }
}

impl TransportSink for RecordingSink {
    fn emit(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn runtime(backend: &Arc<ScriptedBackend>, memory: Arc<dyn MemoryStore>) -> ConversationRuntime {
    let settings = FlowSettings {
        retry: RetryPolicy::new(0, Duration::ZERO),
        ..FlowSettings::default()
    };
    ConversationRuntime::new(build_flow(&settings, backend.clone(), memory))
}

async fn seeded_store() -> Arc<dyn MemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    anemone_memory::seed(store.as_ref()).await.unwrap();
    store
}

// ── E2E: plain greeting ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_greeting_needs_no_memory() {
    let backend = Arc::new(ScriptedBackend::default().reply(&["Hel", "lo! How can I", " help you today?"]));
    let runtime = runtime(&backend, seeded_store().await);
    let sink = Arc::new(RecordingSink::default());
    let id = ConversationId::new();

    let outcome = runtime.submit(&id, "Hello", Some(sink.clone())).await.unwrap();

    assert_eq!(outcome.reply.as_deref(), Some("Hello! How can I help you today"));
    assert_eq!(outcome.loop_count, 1);
    assert_eq!(outcome.steps, 1, "no memory dispatch for a plain reply");
    assert_eq!(backend.requests().len(), 1);
    assert_eq!(sink.streamed_text(), "Hello! How can I help you today");
    assert!(sink.retrieved().is_empty());

    let snapshot = runtime.snapshot(&id).await.unwrap();
    let roles: Vec<Role> = snapshot.history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Agent]);
}

// ── E2E: retrieve sub-loop ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_function_question_uses_seeded_memory() {
    let backend = Arc::new(
        ScriptedBackend::default()
            .reply(&["retrieve", "_memory"])
            .reply(&["My primary function is to assist you,", " and to find the ultimate grilled cheese."]),
    );
    let runtime = runtime(&backend, seeded_store().await);
    let sink = Arc::new(RecordingSink::default());
    let id = ConversationId::new();

    let outcome = runtime
        .submit(&id, "What is your function?", Some(sink.clone()))
        .await
        .unwrap();

    assert_eq!(outcome.steps, 3, "agent, memory dispatch, agent");
    assert_eq!(outcome.loop_count, 1, "the command itself is not a response");
    assert_eq!(
        outcome.reply.as_deref(),
        Some("My primary function is to assist you, and to find the ultimate grilled cheese")
    );

    let retrieved = sink.retrieved();
    assert_eq!(retrieved.len(), 1);
    assert_eq!(retrieved[0].0, "What is your function?");
    assert!(retrieved[0].1.starts_with("Core Directive #1:"));

    // The second backend call carries the memory as a trailing system note.
    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let note = requests[1].messages.last().unwrap();
    assert_eq!(note.role, Role::System);
    assert!(note.content.contains("RETRIEVED MEMORIES:"));
    assert!(note.content.contains("Core Directive #1:"));

    // The command never reaches the user or the history.
    assert!(!sink.streamed_text().contains("retrieve_memory"));
    let snapshot = runtime.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.history.len(), 2);
    assert!(snapshot.history.iter().all(|m| !m.content.contains("retrieve_memory")));
}

#[tokio::test]
async fn e2e_repeated_command_is_answered_from_memory() {
    let backend = Arc::new(
        ScriptedBackend::default()
            .reply(&["retrieve_memory"])
            .reply(&["retrieve_memory"]),
    );
    let runtime = runtime(&backend, seeded_store().await);
    let sink = Arc::new(RecordingSink::default());
    let id = ConversationId::new();

    let outcome = runtime
        .submit(&id, "What is your function?", Some(sink.clone()))
        .await
        .unwrap();

    let reply = outcome.reply.unwrap();
    assert!(reply.starts_with("According to my memory, My primary function is to assist users."));
    assert_eq!(outcome.loop_count, 1);
    assert_eq!(outcome.steps, 3);
    assert_eq!(sink.streamed_text(), reply);
}

// ── E2E: scheduled summarize and persist ─────────────────────────────────

#[tokio::test]
async fn e2e_tenth_response_compacts_and_persists() {
    let mut backend = ScriptedBackend::default();
    for n in 1..=10 {
        backend = backend.reply(&[format!("Reply number {n}").as_str()]);
    }
    let backend = Arc::new(
        backend
            .summary("The user said hello five times.")
            .summary("The user kept counting to ten."),
    );
    let memory = Arc::new(InMemoryStore::new());
    let runtime = runtime(&backend, memory.clone());
    let id = ConversationId::new();

    for n in 1..=10u64 {
        let outcome = runtime.submit(&id, &format!("Message {n}"), None).await.unwrap();
        assert_eq!(outcome.loop_count, n);

        let snapshot = runtime.snapshot(&id).await.unwrap();
        match n {
            5 => {
                assert_eq!(outcome.steps, 2, "agent then summarize");
                assert_eq!(snapshot.history.len(), 1);
                assert_eq!(memory.count().await.unwrap(), 0, "summarizing alone persists nothing");
            }
            10 => {
                assert_eq!(outcome.steps, 3, "agent, summarize, memory dispatch");
            }
            _ => assert_eq!(outcome.steps, 1),
        }
    }

    let snapshot = runtime.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.history[0].role, Role::System);
    assert_eq!(
        snapshot.history[0].content,
        "Summary of conversation so far: The user kept counting to ten."
    );

    assert_eq!(memory.count().await.unwrap(), 1);
    let saved = memory.retrieve("counting to ten").await.unwrap();
    assert!(saved.contains("The user kept counting to ten."));
}

#[tokio::test]
async fn e2e_conversations_are_isolated() {
    let backend = Arc::new(ScriptedBackend::default().reply(&["Hi Ann"]).reply(&["Hi Bob"]));
    let runtime = runtime(&backend, Arc::new(InMemoryStore::new()));
    let ann = ConversationId::from("ann");
    let bob = ConversationId::from("bob");

    runtime.submit(&ann, "Hello, I am Ann", None).await.unwrap();
    runtime.submit(&bob, "Hello, I am Bob", None).await.unwrap();

    let ann_history = runtime.snapshot(&ann).await.unwrap().history;
    assert_eq!(ann_history.len(), 2);
    assert_eq!(ann_history[1].content, "Hi Ann");
    assert_eq!(runtime.snapshot(&bob).await.unwrap().loop_count, 1);

    runtime.clear(&ann, None).await;
    assert!(runtime.snapshot(&ann).await.unwrap().history.is_empty());
    assert_eq!(runtime.snapshot(&bob).await.unwrap().history.len(), 2);
}

// ── E2E: file-backed memory ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_file_store_seed_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = FileStore::default_path(dir.path());

    let store = FileStore::new(path.clone());
    let added = anemone_memory::seed(&store).await.unwrap();
    assert_eq!(added, anemone_memory::SEED_MEMORIES.len());

    let reopened = FileStore::new(path);
    assert_eq!(reopened.count().await.unwrap(), added);
    let found = reopened.retrieve("hello").await.unwrap();
    assert!(found.starts_with("User Greeting Protocol:"), "got {found:?}");
    assert!(reopened.retrieve("xylophone").await.unwrap().is_empty());
}

// ── E2E: gateway API (router only, no server) ────────────────────────────

#[tokio::test]
async fn e2e_gateway_chat_round_trip() {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let config = anemone_config::AppConfig::default();
    let backend = Arc::new(ScriptedBackend::default().reply(&["Have you seen my rubber ducky?"]));
    let state = Arc::new(anemone_gateway::GatewayState::new(
        &config,
        backend,
        seeded_store().await,
    ));
    let app = anemone_gateway::build_router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"message":"Hello","conversation_id":"e2e"}"#))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["conversation_id"], "e2e");
    assert_eq!(json["reply"], "Have you seen my rubber ducky");
    assert_eq!(json["loop_count"], 1);

    let req = Request::builder()
        .uri("/v1/conversations/e2e")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
}

// ── E2E: configuration ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_config_defaults_drive_the_flow() {
    let config = anemone_config::AppConfig::default();
    config.validate().unwrap();

    let settings = FlowSettings::from(&config);
    assert_eq!(settings.persist_every, 10);
    assert_eq!(settings.summarize_every, 5);
    assert_eq!(settings.max_steps, 10);
    assert_eq!(settings.model, config.default_model);
}
