// Copyright 2026 The Lemonade Stand Project
// SPDX-License-Identifier: Apache-2.0

// HTTP shell
//
// Responsibilities:
// - Health endpoint
// - Prometheus metrics endpoint
// - Chat endpoint streaming one turn as server-sent events
// - Chat turns run through an injected ChatService

use std::pin::Pin;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsAggregator;
use crate::stream::StreamUpdate;

// ---------------------------------------------------------------------------
// Trait: ChatService (dependency injection point)
// ---------------------------------------------------------------------------

/// Updates of one chat turn: partial texts, then exactly one outcome.
pub type TurnStream = Pin<Box<dyn Stream<Item = StreamUpdate> + Send>>;

/// Runs chat turns. Implementations must be Send + Sync so they can be
/// shared across request handlers via `Arc`.
pub trait ChatService: Send + Sync {
    fn chat(&self, message: &str) -> TurnStream;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// One SSE event sent to the chat client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Text appended since the previous chunk.
    Chunk { content: String },
    /// Replaces everything shown so far. Terminal.
    Error { content: String },
    /// The streamed chunks are the answer. Terminal.
    Done,
}

/// Errors returned before a turn starts.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("message must not be empty")]
    EmptyMessage,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            ApiError::EmptyMessage => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatService>,
    pub metrics: Arc<MetricsAggregator>,
    /// Longer messages are refused without reaching the chat service.
    pub max_message_chars: Option<usize>,
}

/// GET /health -> 200 {"status":"healthy"}
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// GET /metrics -> Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, axum::Error>> + Send>>;

/// POST /api/chat {"message": "..."} -> text/event-stream of `ChatEvent`s
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<KeepAliveStream<EventStream>>, ApiError> {
    let message = request.message;
    if message.trim().is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    let chars = message.chars().count();
    let events: Pin<Box<dyn Stream<Item = ChatEvent> + Send>> = match state.max_message_chars {
        Some(limit) if chars > limit => {
            tracing::warn!(message_chars = chars, limit, "message refused: too long");
            Box::pin(stream::iter([ChatEvent::Error {
                content: format!(
                    "Message is too long ({chars} characters). The limit is {limit} characters."
                ),
            }]))
        }
        _ => Box::pin(chat_events(state.chat.chat(&message))),
    };

    let sse = events.map(|event| Event::default().json_data(&event));
    Ok(Sse::new(Box::pin(sse) as EventStream).keep_alive(KeepAlive::default()))
}

/// Turn accumulated-text updates into chunk deltas plus one terminal event.
pub fn chat_events(turn: TurnStream) -> impl Stream<Item = ChatEvent> + Send {
    turn.scan(0usize, |sent, update| {
        let event = match update {
            StreamUpdate::Partial(text) => {
                let delta = text.get(*sent..).unwrap_or_default().to_string();
                *sent = text.len();
                ChatEvent::Chunk { content: delta }
            }
            StreamUpdate::Finished(outcome) => match outcome.terminal_fragment() {
                Some(content) => ChatEvent::Error { content },
                None => ChatEvent::Done,
            },
        };
        future::ready(Some(event))
    })
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. The chat service is injected; no hard-coded clients.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
