use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

use super::messages::{
    AudioTranscriptionConfig, ClientMessage, Content, GenerationConfig, MediaBlob,
    PrebuiltVoiceConfig, RealtimeInput, ResponseModality, ServerMessage, SetupMessage,
    SpeechConfig, TextPart, VoiceConfig,
};
use super::transport::{LiveConfig, LiveConnection, LiveConnector, LiveEvent};
use crate::error::{VoiceError, VoiceResult};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the setup message sent as the first frame of a connection
pub fn setup_message(config: &LiveConfig) -> ClientMessage {
    ClientMessage::Setup(SetupMessage {
        model: config.model.clone(),
        generation_config: GenerationConfig {
            response_modalities: vec![ResponseModality::Audio],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: config.voice.clone(),
                    },
                },
            },
        },
        system_instruction: Content {
            parts: vec![TextPart {
                text: config.system_instruction.clone(),
            }],
        },
        input_audio_transcription: AudioTranscriptionConfig::default(),
        output_audio_transcription: AudioTranscriptionConfig::default(),
    })
}

pub fn realtime_input_message(media: MediaBlob) -> ClientMessage {
    ClientMessage::RealtimeInput(RealtimeInput {
        media_chunks: vec![media],
    })
}

/// The service sends JSON in both text and binary frames
pub fn parse_server_message(msg: &WsMessage) -> Option<serde_json::Result<ServerMessage>> {
    match msg {
        WsMessage::Text(text) => Some(serde_json::from_str(text)),
        WsMessage::Binary(bytes) => Some(serde_json::from_slice(bytes)),
        _ => None,
    }
}

/// Connects to the Gemini Live websocket
pub struct GeminiLiveConnector {
    handshake_timeout: Duration,
}

impl GeminiLiveConnector {
    pub fn new() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for GeminiLiveConnector {
    fn default() -> Self {
        Self::new()
    }
}

enum Outbound {
    Text(String),
    Close,
}

#[async_trait::async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        config: &LiveConfig,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> VoiceResult<Box<dyn LiveConnection>> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| VoiceError::ConnectionFailed("no API key configured".to_string()))?;

        let url = format!("{}?key={}", config.endpoint, api_key);
        info!("Connecting to live service (model={})", config.model);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let setup = serde_json::to_string(&setup_message(config))
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()))?;
        sink.send(WsMessage::Text(setup))
            .await
            .map_err(|e| VoiceError::ConnectionFailed(e.to_string()))?;

        let handshake = async {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Close(frame)) => {
                        return Err(VoiceError::ConnectionFailed(format!(
                            "closed during setup: {:?}",
                            frame
                        )));
                    }
                    Ok(msg) => match parse_server_message(&msg) {
                        Some(Ok(server)) if server.setup_complete.is_some() => return Ok(()),
                        Some(Ok(server)) => warn!("Unexpected message during setup: {:?}", server),
                        Some(Err(e)) => warn!("Failed to parse setup response: {}", e),
                        None => {}
                    },
                    Err(e) => return Err(VoiceError::ConnectionFailed(e.to_string())),
                }
            }
            Err(VoiceError::ConnectionFailed(
                "connection ended during setup".to_string(),
            ))
        };

        tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                VoiceError::ConnectionFailed("timed out waiting for setupComplete".to_string())
            })??;

        info!("Live session setup complete");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let writer_events = events.clone();

        let writer = tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Text(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            error!("Error writing to live socket: {}", e);
                            let _ = writer_events.send(LiveEvent::Error(e.to_string()));
                            return;
                        }
                    }
                    Outbound::Close => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        let _ = sink.close().await;
                        debug!("Live socket writer closed");
                        return;
                    }
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Close(frame)) => {
                        info!("Live service closed the connection: {:?}", frame);
                        let _ = events.send(LiveEvent::Closed);
                        return;
                    }
                    Ok(msg) => match parse_server_message(&msg) {
                        Some(Ok(server)) => {
                            if server.go_away.is_some() {
                                warn!("Live service announced goAway");
                            }
                            if let Some(content) = server.server_content {
                                if events.send(LiveEvent::Message(content)).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => warn!("Failed to parse live message: {}", e),
                        None => {}
                    },
                    Err(e) => {
                        error!("Error reading from live socket: {}", e);
                        let _ = events.send(LiveEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            let _ = events.send(LiveEvent::Closed);
        });

        Ok(Box::new(GeminiLiveConnection {
            outbound: outbound_tx,
            reader,
            writer,
            closed: false,
        }))
    }
}

/// Handle to an open Gemini Live socket
pub struct GeminiLiveConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    closed: bool,
}

impl LiveConnection for GeminiLiveConnection {
    fn send_realtime_input(&mut self, media: MediaBlob) -> VoiceResult<()> {
        if self.closed || self.writer.is_finished() {
            return Err(VoiceError::Transport("connection is closed".to_string()));
        }

        let payload = serde_json::to_string(&realtime_input_message(media))
            .map_err(|e| VoiceError::Transport(e.to_string()))?;
        self.outbound
            .send(Outbound::Text(payload))
            .map_err(|_| VoiceError::Transport("socket writer stopped".to_string()))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.abort();
        let _ = self.outbound.send(Outbound::Close);
        info!("Live connection closed");
    }
}

impl Drop for GeminiLiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}
