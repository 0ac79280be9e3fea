use serde::Serialize;

/// Failures that end (or refuse to begin) a voice session.
///
/// Every kind except `AlreadyActive` is terminal for the current session:
/// the manager tears down and returns to `Idle`. None are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Connection to live service failed: {0}")]
    ConnectionFailed(String),
    #[error("Failed to decode audio chunk: {0}")]
    DecodeFailed(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("A voice session is already active")]
    AlreadyActive,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            VoiceError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            VoiceError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            VoiceError::DecodeFailed(_) => ErrorKind::DecodeFailed,
            VoiceError::Transport(_) => ErrorKind::Transport,
            VoiceError::AlreadyActive => ErrorKind::AlreadyActive,
        }
    }
}

/// Serializable error tag reported in session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    ConnectionFailed,
    DecodeFailed,
    Transport,
    AlreadyActive,
}

pub type VoiceResult<T> = std::result::Result<T, VoiceError>;
