use crate::session::VoiceController;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the task that owns the voice session
    pub controller: VoiceController,
}

impl AppState {
    pub fn new(controller: VoiceController) -> Self {
        Self { controller }
    }
}
