//! HTTP API for controlling the voice session
//!
//! - POST /voice/session/start - Start a session
//! - POST /voice/session/stop - Stop the active session
//! - GET /voice/session/status - Current session statistics
//! - GET /voice/session/transcript - Accumulated transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
