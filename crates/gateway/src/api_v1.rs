//! HTTP API v1 over the conversation runtime.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                 Send a message, get the reply
//! - `POST   /v1/chat/stream`          Send a message, get the turn's events as SSE
//! - `GET    /v1/conversations/{id}`   History and counters of a conversation
//! - `DELETE /v1/conversations/{id}`   Forget a conversation
//!
//! A chat request without `conversation_id` is a one-off: its conversation
//! is forgotten as soon as the turn ends.

use std::convert::Infallible;
use std::sync::Arc;

use anemone_agent::{ConversationSnapshot, RuntimeError, TurnOutcome};
use anemone_core::message::ConversationId;
use anemone_core::sink::{ChannelSink, TransportSink};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::SharedState;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router() -> Router<SharedState> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route(
            "/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    fn conversation(&self) -> Option<ConversationId> {
        self.conversation_id.as_deref().map(ConversationId::from)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub reply: Option<String>,
    pub loop_count: u64,
    pub steps: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn runtime_error(e: RuntimeError) -> ApiError {
    match e {
        RuntimeError::EmptyMessage => api_error(StatusCode::BAD_REQUEST, e),
        RuntimeError::Flow(_) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Run a turn on its own task so it finishes even if the client goes away.
fn spawn_turn(
    state: SharedState,
    conversation: Option<ConversationId>,
    message: String,
    sink: Option<Arc<dyn TransportSink>>,
) -> JoinHandle<Result<TurnOutcome, RuntimeError>> {
    tokio::spawn(async move {
        let id = conversation.clone().unwrap_or_default();
        // Held until the one-off is forgotten, so a streaming client sees the
        // end of its stream only after that.
        let held = sink.clone();
        let result = state.runtime.submit(&id, &message, sink).await;
        if conversation.is_none() {
            state.runtime.remove(&id).await;
        }
        drop(held);
        if let Err(RuntimeError::Flow(e)) = &result {
            warn!(conversation = %id, error = %e, "Turn failed");
        }
        result
    })
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let conversation = payload.conversation();
    info!(conversation = ?conversation, message_len = payload.message.len(), "v1/chat request");

    let outcome = spawn_turn(state, conversation.clone(), payload.message, None)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("turn task failed: {e}")))?
        .map_err(runtime_error)?;

    Ok(Json(ChatResponse {
        conversation_id: conversation.map(|id| id.to_string()),
        reply: outcome.reply,
        loop_count: outcome.loop_count,
        steps: outcome.steps,
    }))
}

/// Runs the turn in the background and streams its sink events.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(runtime_error(RuntimeError::EmptyMessage));
    }

    let conversation = payload.conversation();
    info!(conversation = ?conversation, "v1/chat/stream SSE request");

    let (sink, rx) = ChannelSink::channel();
    spawn_turn(state, conversation, payload.message, Some(Arc::new(sink)));

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationSnapshot>, ApiError> {
    state
        .runtime
        .snapshot(&ConversationId::from(&id))
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("conversation '{id}' not found")))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.runtime.remove(&ConversationId::from(&id)).await {
        info!(conversation = %id, "Conversation removed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
