use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionState;
use crate::error::{ErrorKind, VoiceError};

/// Snapshot of a voice session for rendering
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// Label of the current (or last) session, e.g. "voice-<uuid>"
    pub session_label: Option<String>,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Session duration in seconds
    pub duration_secs: f64,

    /// Captured frames handed to the transport
    pub frames_sent: u64,

    /// Synthesized audio chunks received
    pub chunks_received: u64,

    /// Output buffers scheduled and not yet finished
    pub active_buffers: usize,

    /// Running transcript of both directions
    pub transcript: String,

    /// The error that ended the last session, if any
    pub last_error: Option<ErrorReport>,
}

impl SessionStats {
    pub fn idle(last_error: Option<&VoiceError>) -> Self {
        Self {
            state: SessionState::Idle,
            session_label: None,
            started_at: None,
            duration_secs: 0.0,
            frames_sent: 0,
            chunks_received: 0,
            active_buffers: 0,
            transcript: String::new(),
            last_error: last_error.map(ErrorReport::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&VoiceError> for ErrorReport {
    fn from(err: &VoiceError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
