//! HTTP front door for the engine.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::agent::Engine;
use crate::memory::{Turn, TurnRole};
use crate::worker::WorkerKind;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Build the Axum router with chat REST routes.
pub fn chat_routes(engine: Arc<Engine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/chat", post(chat))
        .route(
            "/api/v1/chat/history/{session_id}",
            get(get_history).delete(clear_history),
        )
        .route("/api/v1/chat/stats", get(stats))
        .route("/api/v1/chat/sessions", get(sessions))
        .route("/api/v1/chat/sessions/{session_id}", get(session_detail))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "switchboard",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/v1/chat"
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "switchboard"
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
    pub timestamp: DateTime<Utc>,
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> impl IntoResponse {
    if req.message.trim().is_empty() {
        warn!("Rejected empty chat message");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "message must not be empty"})),
        )
            .into_response();
    }

    let turn = state.engine.submit_turn(req.session_id, &req.message).await;
    info!(session_id = %turn.session_id, outcome = ?turn.outcome, cycles = turn.cycles, "Chat turn finished");

    Json(ChatResponse {
        response: turn.reply,
        session_id: turn.session_id,
        advisory: turn.advisory,
        timestamp: Utc::now(),
    })
    .into_response()
}

// ── History ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: TurnRole,
    pub author: Option<WorkerKind>,
    pub content: String,
    pub ordinal: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<Turn> for HistoryMessage {
    fn from(turn: Turn) -> Self {
        Self {
            role: turn.role,
            author: turn.author,
            content: turn.content,
            ordinal: turn.ordinal,
            timestamp: turn.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
    pub message_count: usize,
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let messages: Vec<HistoryMessage> = state
        .engine
        .history(&session_id)
        .into_iter()
        .map(HistoryMessage::from)
        .collect();
    Json(HistoryResponse {
        message_count: messages.len(),
        session_id,
        messages,
    })
}

async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    state.engine.clear_history(&session_id);
    Json(serde_json::json!({
        "message": format!("Session {session_id} history cleared")
    }))
}

// ── Stats ───────────────────────────────────────────────────────────────

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.engine.stats();
    Json(serde_json::json!({
        "active_sessions": stats.session_count,
        "total_messages": stats.total_turn_count,
        "timestamp": Utc::now(),
    }))
}

async fn sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "active_sessions": state.engine.stats().session_count,
        "timestamp": Utc::now(),
    }))
}

async fn session_detail(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.session_info(&session_id) {
        Some(info) => Json(info).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("Session {session_id} not found")})),
        )
            .into_response(),
    }
}
