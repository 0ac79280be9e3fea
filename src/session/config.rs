use crate::audio::{AudioBackendConfig, PlaybackConfig};
use crate::config::Config;
use crate::live::LiveConfig;

/// Configuration for a voice session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Microphone capture (16kHz mono blocks)
    pub capture: AudioBackendConfig,

    /// Speaker playback (24kHz mono)
    pub playback: PlaybackConfig,

    /// Live service connection parameters
    pub live: LiveConfig,

    /// Frames held while connecting; the oldest are dropped beyond this
    pub max_pending_frames: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture: AudioBackendConfig::default(),
            playback: PlaybackConfig::default(),
            live: LiveConfig::default(),
            max_pending_frames: 64,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            capture: AudioBackendConfig {
                sample_rate: config.audio.input_sample_rate,
                block_size: config.audio.block_size,
                channel_capacity: config.audio.max_pending_frames.max(1),
            },
            playback: PlaybackConfig {
                sample_rate: config.audio.output_sample_rate,
            },
            live: LiveConfig {
                endpoint: config.live.endpoint.clone(),
                api_key: config.live.api_key.clone(),
                model: config.live.model.clone(),
                voice: config.live.voice.clone(),
                system_instruction: config.live.system_instruction.clone(),
            },
            max_pending_frames: config.audio.max_pending_frames,
        }
    }
}
