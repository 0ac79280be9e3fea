use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::VoiceResult;

/// A fixed-size block of captured mono samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Mono f32 samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture order, starting at 0
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBackendConfig {
    /// Capture sample rate (the live service expects 16kHz input)
    pub sample_rate: u32,
    /// Samples per emitted frame
    pub block_size: usize,
    /// Frames buffered between the device and the session before dropping
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,   // 16kHz mono PCM for the live service
            block_size: 4096,     // ~256ms per frame
            channel_capacity: 64, // ~16s of audio
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - cpal microphone (all desktop platforms)
/// - WAV file (for scripted sessions and testing)
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Start capturing audio
    ///
    /// Acquires the device (prompting for microphone permission where the
    /// platform does so) and returns a channel receiver that yields frames.
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device. Idempotent.
    fn stop(&mut self);

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// 16-bit WAV file streamed in real time
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(source: &AudioSource, config: AudioBackendConfig) -> Box<dyn AudioBackend> {
        match source {
            AudioSource::Microphone => Box::new(super::device::MicrophoneBackend::new(config)),
            AudioSource::File(path) => {
                Box::new(super::file::WavFileBackend::new(path.clone(), config))
            }
        }
    }
}
