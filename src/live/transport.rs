use tokio::sync::mpsc;

use super::messages::{MediaBlob, ServerContent};
use crate::error::VoiceResult;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";
pub const DEFAULT_VOICE: &str = "Zephyr";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are CureLink Assistant. Help the user with health information, symptoms awareness, and finding nearby hospitals. Be concise, empathetic, and always add a medical disclaimer for diagnosis-related questions.";

/// Parameters of one live connection
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

/// Events pushed by an open connection
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Server content: transcription, audio and/or interruption
    Message(ServerContent),
    /// The connection failed; no further events follow
    Error(String),
    /// The remote side closed the connection
    Closed,
}

/// Opens connections to the live service
#[async_trait::async_trait]
pub trait LiveConnector: Send + Sync {
    /// Perform the handshake and return once the session is ready.
    ///
    /// After success, server events are delivered on `events` until the
    /// connection closes or is closed locally.
    async fn connect(
        &self,
        config: &LiveConfig,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> VoiceResult<Box<dyn LiveConnection>>;
}

/// An open, ready connection
pub trait LiveConnection: Send {
    /// Queue one media chunk for sending. Never waits on the network.
    fn send_realtime_input(&mut self, media: MediaBlob) -> VoiceResult<()>;

    /// Terminate the connection. Idempotent; emits no further events.
    fn close(&mut self);
}
