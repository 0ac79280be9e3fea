use std::path::PathBuf;

use super::backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource};
use super::device::SpeakerSink;
use super::file::WavPlaybackRecorder;
use super::playback::{PlaybackConfig, PlaybackSink};

/// Where synthesized audio is played
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackTarget {
    /// Default output device
    Speaker,
    /// Render to a WAV file written when the session ends
    WavFile(PathBuf),
}

/// Opens the two audio contexts a session needs: capture and playback
///
/// The contexts are separate because input and output run at different
/// fixed sample rates.
pub trait AudioDevices: Send + Sync {
    fn open_capture(&self, config: &AudioBackendConfig) -> Box<dyn AudioBackend>;

    fn open_playback(&self, config: &PlaybackConfig) -> Box<dyn PlaybackSink>;
}

/// Devices backed by real hardware or WAV files
#[derive(Debug, Clone)]
pub struct SystemAudioDevices {
    pub source: AudioSource,
    pub target: PlaybackTarget,
}

impl Default for SystemAudioDevices {
    fn default() -> Self {
        Self {
            source: AudioSource::Microphone,
            target: PlaybackTarget::Speaker,
        }
    }
}

impl AudioDevices for SystemAudioDevices {
    fn open_capture(&self, config: &AudioBackendConfig) -> Box<dyn AudioBackend> {
        AudioBackendFactory::create(&self.source, config.clone())
    }

    fn open_playback(&self, config: &PlaybackConfig) -> Box<dyn PlaybackSink> {
        match &self.target {
            PlaybackTarget::Speaker => Box::new(SpeakerSink::new(config.clone())),
            PlaybackTarget::WavFile(path) => {
                Box::new(WavPlaybackRecorder::new(path.clone(), config.clone()))
            }
        }
    }
}
