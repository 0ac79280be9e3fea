use super::state::AppState;
use crate::error::VoiceError;
use crate::session::{SessionState, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub status: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<VoiceError>() {
        Some(VoiceError::AlreadyActive) => StatusCode::CONFLICT,
        Some(VoiceError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
        Some(VoiceError::DeviceUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Some(VoiceError::ConnectionFailed(_)) | Some(VoiceError::Transport(_)) => {
            StatusCode::BAD_GATEWAY
        }
        Some(VoiceError::DecodeFailed(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/session/start
/// Acquire devices and begin connecting; the response reports `connecting`
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Start requested over HTTP");

    match state.controller.start().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                status: stats.state,
                message: "Voice session started".to_string(),
                stats,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start voice session: {}", e);
            error_response(status_for(&e), format!("Failed to start session: {}", e))
        }
    }
}

/// POST /voice/session/stop
/// Stop the active session, if any
pub async fn stop_session(State(state): State<AppState>) -> Response {
    match state.controller.stop().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                status: stats.state,
                message: "Voice session stopped".to_string(),
                stats,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop voice session: {}", e);
            error_response(status_for(&e), format!("Failed to stop session: {}", e))
        }
    }
}

/// GET /voice/session/status
pub async fn get_session_status(State(state): State<AppState>) -> Response {
    match state.controller.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!("Failed to get stats: {}", e);
            error_response(status_for(&e), format!("Failed to get stats: {}", e))
        }
    }
}

/// GET /voice/session/transcript
pub async fn get_session_transcript(State(state): State<AppState>) -> Response {
    match state.controller.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                transcript: stats.transcript,
            }),
        )
            .into_response(),
        Err(e) => error_response(status_for(&e), format!("Failed to get transcript: {}", e)),
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
