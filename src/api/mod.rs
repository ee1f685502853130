//! HTTP surface: the chat endpoint and a health check.
//!
//! `POST /api/chat` adapts the history (rejecting malformed ones with 400
//! before anything streams), spawns the orchestrator for the turn and
//! returns its events rendered in the requested protocol. Dropping the
//! response body drops the event receiver, which cancels the turn.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent_core::{
    adapt, AgentError, ClientMessage, Orchestrator, OrchestratorTurn, StreamEvent,
};
use crate::config::OrchestratorConfig;
use crate::inference::CompletionProvider;
use crate::protocol::{ProtocolEncoder, StreamProtocol};
use crate::tools::ToolRegistry;

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn CompletionProvider>,
    registry: Arc<ToolRegistry>,
    orchestrator: Orchestrator,
    event_buffer: usize,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        registry: Arc<ToolRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        let orchestrator = Orchestrator::new(provider.clone(), registry.clone(), config);
        Self {
            provider,
            registry,
            orchestrator,
            event_buffer: config.event_buffer.max(1),
        }
    }
}

// ─── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ClientMessage>,
    /// Overrides the configured model for this turn.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub protocol: StreamProtocol,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn chat(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AgentError> {
    let request_id = Uuid::new_v4();
    let messages = adapt(&request.messages).inspect_err(|e| {
        tracing::warn!(%request_id, error = %e, "chat request rejected");
    })?;
    let model = request
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.provider.default_model().to_string());
    let protocol = query.protocol;

    tracing::info!(
        %request_id,
        model = %model,
        protocol = protocol.as_str(),
        message_count = messages.len(),
        "chat turn accepted"
    );

    let (tx, rx) = mpsc::channel(state.event_buffer);
    let orchestrator = state.orchestrator.clone();
    let span = tracing::info_span!("chat", %request_id);
    tokio::spawn(
        async move {
            let outcome = orchestrator
                .run(OrchestratorTurn::new(messages), &model, tx)
                .await;
            tracing::debug!(?outcome, "orchestrator task ended");
        }
        .instrument(span),
    );

    let mut response = Response::new(Body::from_stream(encode_events(rx, protocol, request_id)));
    *response.headers_mut() = protocol.response_headers();
    Ok(response)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.provider.default_model(),
        "tools": state.registry.tool_names(),
    }))
}

/// Render events as they arrive; logs the frame count when the turn ends.
fn encode_events(
    rx: mpsc::Receiver<StreamEvent>,
    protocol: StreamProtocol,
    request_id: Uuid,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let encoder = ProtocolEncoder::new(protocol);
    futures::stream::unfold(
        (ReceiverStream::new(rx), encoder),
        move |(mut events, mut encoder)| async move {
            while let Some(event) = events.next().await {
                if let Some(frame) = encoder.encode(&event) {
                    return Some((Ok(frame), (events, encoder)));
                }
            }
            tracing::info!(
                %request_id,
                protocol = encoder.protocol().as_str(),
                frames = encoder.frames_written(),
                "stream closed"
            );
            None
        },
    )
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum router. The provider and tools are injected.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .with_state(state)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
