pub mod backend;
pub mod device;
pub mod devices;
pub mod file;
pub mod pcm;
pub mod playback;
pub mod resample;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use device::{MicrophoneBackend, SpeakerSink};
pub use devices::{AudioDevices, PlaybackTarget, SystemAudioDevices};
pub use file::{AudioFile, WavFileBackend, WavPlaybackRecorder};
pub use playback::{
    BufferId, MixTimeline, PlaybackBuffer, PlaybackConfig, PlaybackScheduler, PlaybackSink,
    ScheduledBuffer,
};
pub use resample::{downmix, StreamResampler, TimelineReader};
