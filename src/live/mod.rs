//! Transport to the hosted conversational service
//!
//! - `messages`: JSON wire types of the Live API
//! - `transport`: connector/connection traits the session manager depends on
//! - `client`: websocket implementation of those traits

pub mod client;
pub mod messages;
pub mod transport;

pub use client::{GeminiLiveConnection, GeminiLiveConnector};
pub use messages::{MediaBlob, ServerContent};
pub use transport::{LiveConfig, LiveConnection, LiveConnector, LiveEvent};
