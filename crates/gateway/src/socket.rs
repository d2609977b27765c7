//! `GET /ws`: the chat page's WebSocket protocol.
//!
//! Client → server:
//! - `{"type":"user_message","message":"...","conversation_id":"..."?}`
//! - `{"type":"clear_conversation"}`
//!
//! Server → client: [`SinkEvent`] JSON frames, tagged by `type`.
//!
//! Each connection gets its own sink and, unless the client names one, its
//! own conversation, which is forgotten when the connection closes. Turns on
//! one connection run one at a time.

use std::sync::Arc;

use anemone_agent::RuntimeError;
use anemone_core::message::ConversationId;
use anemone_core::sink::{ChannelSink, SinkEvent, TransportSink, TurnStatus};
use axum::{
    extract::State,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::SharedState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    UserMessage {
        message: String,
        #[serde(default)]
        conversation_id: Option<String>,
    },
    ClearConversation {
        #[serde(default)]
        conversation_id: Option<String>,
    },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: SharedState) {
    let (outgoing, incoming) = socket.split();
    serve(incoming, outgoing, state).await;
}

async fn serve<I, O, E>(mut incoming: I, mut outgoing: O, state: SharedState)
where
    I: Stream<Item = Result<WsMessage, E>> + Unpin + Send,
    O: Sink<WsMessage> + Unpin + Send + 'static,
    E: Send,
{
    let (sink, mut events) = ChannelSink::channel();
    let sink: Arc<dyn TransportSink> = Arc::new(sink);

    let forward = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            if outgoing.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let own = ConversationId::new();
    let mut conversation = own.clone();
    info!(conversation = %conversation, "WebSocket connection established");
    sink.emit(SinkEvent::StateUpdate {
        loop_count: 0,
        memory_action: "none".into(),
    });

    while let Some(frame) = incoming.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::UserMessage {
                message,
                conversation_id,
            }) => {
                if let Some(id) = conversation_id {
                    conversation = ConversationId(id);
                }
                match state.runtime.submit(&conversation, &message, Some(sink.clone())).await {
                    Ok(_) => {}
                    Err(RuntimeError::EmptyMessage) => debug!("Ignoring blank message"),
                    // Already reported to the client as an error status.
                    Err(RuntimeError::Flow(_)) => {}
                }
            }
            Ok(ClientMessage::ClearConversation { conversation_id }) => {
                if let Some(id) = conversation_id {
                    conversation = ConversationId(id);
                }
                state.runtime.clear(&conversation, Some(sink.clone())).await;
            }
            Err(e) => sink.emit(SinkEvent::status(
                TurnStatus::Error,
                format!("Invalid message: {e}"),
            )),
        }
    }

    drop(sink);
    let _ = forward.await;
    state.runtime.remove(&own).await;
    info!(conversation = %conversation, "WebSocket connection closed");
}
