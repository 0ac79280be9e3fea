//! Voice session management
//!
//! `VoiceSessionManager` owns one realtime conversation at a time:
//! - Microphone capture, buffered until the transport is ready
//! - The live service connection and its event stream
//! - Gapless scheduling of synthesized audio and barge-in handling
//! - Transcript collection and session statistics
//!
//! `VoiceController` runs a manager on its own task for the HTTP API.

mod config;
mod controller;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::VoiceController;
pub use session::VoiceSessionManager;
pub use state::{LiveHandle, SessionEvent, SessionId, SessionState};
pub use stats::{ErrorReport, SessionStats};
