//! REST API for the transaction query engine
//!
//! Exposes `ask` over HTTP with per-session conversation history.
//! Sessions are keyed by UUID; a client may pass any string and gets a
//! stable UUID derived from it.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::QueryEngine;
use crate::error::EngineError;
use crate::session::SessionHistory;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub session_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

/// Each session's history sits behind its own mutex so concurrent
/// requests for the same session serialize instead of overwriting each
/// other, while requests for different sessions stay independent.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<QueryEngine>,
    pub sessions: Arc<RwLock<HashMap<uuid::Uuid, Arc<Mutex<SessionHistory>>>>>,
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn resolve_session_id(value: Option<&str>) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => uuid::Uuid::new_v4(),
    }
}

fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::ProviderTimeout(_) | EngineError::ProviderRateLimited(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Ask Endpoint
/// =============================

async fn ask_handler(
    State(state): State<ApiState>,
    Json(req): Json<AskRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let session_id = resolve_session_id(req.session_id.as_deref());
    info!(%session_id, "received question");

    // grab the session's own lock so a slow provider call holds up
    // only this session, never the whole map
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.entry(session_id).or_default().clone()
    };
    let mut history = session.lock().await;

    let outcome = state.engine.ask(&req.question, &mut history).await;
    drop(history);

    match outcome {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id.to_string(),
                "answer": outcome.answer,
                "intent_used": outcome.intent_used,
                "latency_ms": outcome.latency_ms,
                "degraded": outcome.degraded,
            }))),
        ),
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(engine: Arc<QueryEngine>) -> Router {
    let state = ApiState {
        engine,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/ask", post(ask_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    engine: Arc<QueryEngine>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
