use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioFrame, BufferId};
use crate::error::VoiceError;
use crate::live::{LiveConnection, ServerContent};

/// Lifecycle of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection, no audio devices held
    Idle,
    /// Devices being acquired and transport handshake in progress
    Connecting,
    /// Connected; captured audio is streamed
    Listening,
    /// Synthesized audio is scheduled or playing
    Speaking,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Speaking => "speaking",
        };
        f.write_str(label)
    }
}

/// Identifies one session started by a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An open live connection handed from the handshake task to the manager
pub struct LiveHandle(pub Box<dyn LiveConnection>);

impl fmt::Debug for LiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LiveHandle")
    }
}

/// Everything that can happen to a session
///
/// Every event names the session it was produced for; the manager ignores
/// events addressed to a session that is no longer active.
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport handshake finished
    Connected {
        session: SessionId,
        result: Result<LiveHandle, VoiceError>,
    },
    /// A block of microphone audio is ready
    FrameCaptured { session: SessionId, frame: AudioFrame },
    /// Incremental transcription of either direction
    TranscriptFragment { session: SessionId, text: String },
    /// A base64 PCM16 chunk of synthesized audio
    ChunkReceived { session: SessionId, data: String },
    /// The user spoke over the assistant
    Interrupted { session: SessionId },
    /// An output buffer finished playing
    PlaybackEnded { session: SessionId, buffer: BufferId },
    /// The transport failed mid-session
    TransportError { session: SessionId, message: String },
    /// The remote side closed the connection
    Closed { session: SessionId },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Connected { session, .. }
            | SessionEvent::FrameCaptured { session, .. }
            | SessionEvent::TranscriptFragment { session, .. }
            | SessionEvent::ChunkReceived { session, .. }
            | SessionEvent::Interrupted { session }
            | SessionEvent::PlaybackEnded { session, .. }
            | SessionEvent::TransportError { session, .. }
            | SessionEvent::Closed { session } => *session,
        }
    }

    /// Split one server message into events, preserving the order in which
    /// they must be applied: transcripts, then audio, then interruption.
    pub fn from_server_content(session: SessionId, content: ServerContent) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for transcription in [&content.input_transcription, &content.output_transcription]
            .into_iter()
            .flatten()
        {
            if !transcription.text.is_empty() {
                events.push(SessionEvent::TranscriptFragment {
                    session,
                    text: transcription.text.clone(),
                });
            }
        }

        for blob in content.audio_chunks() {
            events.push(SessionEvent::ChunkReceived {
                session,
                data: blob.data.clone(),
            });
        }

        if content.interrupted {
            events.push(SessionEvent::Interrupted { session });
        }

        events
    }
}
