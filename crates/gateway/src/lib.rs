//! HTTP and WebSocket gateway for Anemone.
//!
//! Serves the embedded chat page, the WebSocket protocol the page speaks,
//! and a small REST surface over the same conversation runtime.
//!
//! Built on Axum.

pub mod api_v1;
pub mod frontend;
pub mod socket;

use std::sync::Arc;

use anemone_agent::ConversationRuntime;
use anemone_config::AppConfig;
use anemone_core::memory::MemoryStore;
use anemone_core::provider::Provider;
use axum::extract::DefaultBodyLimit;
use axum::{Router, extract::State, response::Json, routing::get};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub runtime: ConversationRuntime,
    pub provider: Arc<dyn Provider>,
    pub memory: Arc<dyn MemoryStore>,
    pub model: String,
}

impl GatewayState {
    pub fn new(config: &AppConfig, provider: Arc<dyn Provider>, memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            runtime: ConversationRuntime::from_config(config, provider.clone(), memory.clone()),
            provider,
            memory,
            model: config.default_model.clone(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: health, WebSocket, v1 API and the chat page.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(socket::ws_handler))
        .nest("/v1", api_v1::v1_router())
        .with_state(state)
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let providers = anemone_providers::build_from_config(&config);
    let provider = providers
        .default()
        .ok_or_else(|| format!("provider '{}' is not configured", providers.default_name()))?;
    let memory = anemone_memory::build_from_config(&config.memory).await?;

    info!(
        provider = provider.name(),
        model = %config.default_model,
        memory = memory.name(),
        "Gateway state ready"
    );
    let state = Arc::new(GatewayState::new(&config, provider, memory));
    let app = build_router(state);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    model: String,
    memory: String,
    conversations: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        model: state.model.clone(),
        memory: state.memory.name().to_string(),
        conversations: state.runtime.conversation_count().await,
    })
}
