pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioDevices, AudioFile, AudioFrame, AudioSource,
    PlaybackConfig, PlaybackSink, PlaybackTarget, SystemAudioDevices,
};
pub use config::Config;
pub use error::{ErrorKind, VoiceError, VoiceResult};
pub use http::{create_router, AppState};
pub use live::{GeminiLiveConnector, LiveConfig, LiveConnection, LiveConnector, LiveEvent};
pub use session::{
    SessionConfig, SessionEvent, SessionId, SessionState, SessionStats, VoiceController,
    VoiceSessionManager,
};
