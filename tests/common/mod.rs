// Hardware-free fakes for driving a VoiceSessionManager in tests
//
// FakeDevices hands out a capture backend and a playback sink whose clock
// and completions are controlled by the test. FakeConnector opens
// connections that record what was sent and let the test push server events.

#![allow(dead_code)]

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use curelink_voice::audio::{
    pcm, AudioBackend, AudioBackendConfig, AudioDevices, AudioFrame, BufferId, PlaybackBuffer,
    PlaybackConfig, PlaybackSink,
};
use curelink_voice::error::{VoiceError, VoiceResult};
use curelink_voice::live::messages::{ModelTurn, ServerPart, Transcription};
use curelink_voice::live::{
    LiveConfig, LiveConnection, LiveConnector, LiveEvent, MediaBlob, ServerContent,
};
use curelink_voice::session::{SessionConfig, SessionState, VoiceSessionManager};
use tokio::sync::mpsc;

// ============================================================================
// Audio devices
// ============================================================================

/// Shared handle; clones observe the same devices
#[derive(Clone, Default)]
pub struct FakeDevices(Arc<DeviceLog>);

impl Deref for FakeDevices {
    type Target = DeviceLog;

    fn deref(&self) -> &DeviceLog {
        &self.0
    }
}

#[derive(Default)]
pub struct DeviceLog {
    pub deny_microphone: AtomicBool,
    pub captures_opened: AtomicUsize,
    pub captures_held: AtomicIsize,
    pub sinks_opened: AtomicUsize,
    pub sinks_held: AtomicIsize,
    /// Output clock in seconds, set by the test
    pub clock: Mutex<f64>,
    /// (id, start_at, duration) of every scheduled buffer
    pub scheduled: Mutex<Vec<(BufferId, f64, f64)>>,
    pub stopped: Mutex<Vec<BufferId>>,
    frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    completions: Mutex<Option<mpsc::UnboundedSender<BufferId>>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying_microphone() -> Self {
        let devices = Self::default();
        devices.deny_microphone.store(true, Ordering::SeqCst);
        devices
    }
}

impl DeviceLog {
    pub fn set_clock(&self, secs: f64) {
        *self.clock.lock().unwrap() = secs;
    }

    /// Devices acquired and not yet released
    pub fn held(&self) -> isize {
        self.captures_held.load(Ordering::SeqCst) + self.sinks_held.load(Ordering::SeqCst)
    }

    pub fn scheduled(&self) -> Vec<(BufferId, f64, f64)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<BufferId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Push a captured block as the microphone would
    pub async fn capture(&self, samples: Vec<f32>, sequence: u64) {
        let tx = self.frames.lock().unwrap().clone();
        if let Some(tx) = tx {
            let frame = AudioFrame {
                samples,
                sample_rate: 16000,
                sequence,
                timestamp_ms: sequence * 256,
            };
            let _ = tx.send(frame).await;
        }
    }

    /// Report a buffer as finished playing
    pub fn complete(&self, id: BufferId) {
        if let Some(tx) = self.completions.lock().unwrap().as_ref() {
            let _ = tx.send(id);
        }
    }
}

impl AudioDevices for FakeDevices {
    fn open_capture(&self, _config: &AudioBackendConfig) -> Box<dyn AudioBackend> {
        self.captures_opened.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeCapture {
            devices: self.clone(),
            capturing: false,
        })
    }

    fn open_playback(&self, _config: &PlaybackConfig) -> Box<dyn PlaybackSink> {
        self.sinks_opened.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeSink {
            devices: self.clone(),
            open: false,
        })
    }
}

pub struct FakeCapture {
    devices: FakeDevices,
    capturing: bool,
}

#[async_trait::async_trait]
impl AudioBackend for FakeCapture {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.devices.deny_microphone.load(Ordering::SeqCst) {
            return Err(VoiceError::PermissionDenied("denied by user".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        *self.devices.frames.lock().unwrap() = Some(tx);
        self.devices.captures_held.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;
        Ok(rx)
    }

    fn stop(&mut self) {
        if self.capturing {
            self.capturing = false;
            self.devices.frames.lock().unwrap().take();
            self.devices.captures_held.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "Fake microphone"
    }
}

pub struct FakeSink {
    devices: FakeDevices,
    open: bool,
}

#[async_trait::async_trait]
impl PlaybackSink for FakeSink {
    async fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<BufferId>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.devices.completions.lock().unwrap() = Some(tx);
        self.devices.sinks_held.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(rx)
    }

    fn current_time(&self) -> f64 {
        *self.devices.clock.lock().unwrap()
    }

    fn schedule(&mut self, id: BufferId, buffer: PlaybackBuffer, start_at: f64) -> VoiceResult<()> {
        self.devices
            .scheduled
            .lock()
            .unwrap()
            .push((id, start_at, buffer.duration()));
        Ok(())
    }

    fn stop(&mut self, id: BufferId) {
        self.devices.stopped.lock().unwrap().push(id);
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.devices.completions.lock().unwrap().take();
            self.devices.sinks_held.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &str {
        "Fake speaker"
    }
}

// ============================================================================
// Live service
// ============================================================================

#[derive(Clone, Default)]
pub struct FakeConnector(Arc<LiveLog>);

impl Deref for FakeConnector {
    type Target = LiveLog;

    fn deref(&self) -> &LiveLog {
        &self.0
    }
}

#[derive(Default)]
pub struct LiveLog {
    pub connects: AtomicUsize,
    pub fail_connect: Mutex<Option<VoiceError>>,
    pub fail_sends: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<MediaBlob>>>,
    events: Mutex<Option<mpsc::UnboundedSender<LiveEvent>>>,
    closed: Arc<AtomicUsize>,
    /// Server messages delivered during the handshake itself
    greeting: Mutex<Vec<ServerContent>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: VoiceError) -> Self {
        let connector = Self::default();
        *connector.fail_connect.lock().unwrap() = Some(err);
        connector
    }

    /// Connections emit `content` before the handshake returns
    pub fn greeting(content: ServerContent) -> Self {
        let connector = Self::default();
        connector.greeting.lock().unwrap().push(content);
        connector
    }
}

impl LiveLog {
    pub fn sent(&self) -> Vec<MediaBlob> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closed_connections(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Deliver a server message on the most recent connection
    pub fn push(&self, content: ServerContent) {
        self.push_event(LiveEvent::Message(content));
    }

    pub fn push_event(&self, event: LiveEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

#[async_trait::async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(
        &self,
        _config: &LiveConfig,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> VoiceResult<Box<dyn LiveConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_connect.lock().unwrap().clone() {
            return Err(err);
        }
        let greeting = std::mem::take(&mut *self.greeting.lock().unwrap());
        for content in greeting {
            let _ = events.send(LiveEvent::Message(content));
        }
        *self.events.lock().unwrap() = Some(events);
        // Let any other task observe the greeting before the handshake completes
        tokio::task::yield_now().await;
        Ok(Box::new(FakeConnection {
            sent: Arc::clone(&self.sent),
            closed: Arc::clone(&self.closed),
            fail_sends: Arc::clone(&self.fail_sends),
            is_closed: false,
        }))
    }
}

pub struct FakeConnection {
    sent: Arc<Mutex<Vec<MediaBlob>>>,
    closed: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
    is_closed: bool,
}

impl LiveConnection for FakeConnection {
    fn send_realtime_input(&mut self, media: MediaBlob) -> VoiceResult<()> {
        if self.is_closed || self.fail_sends.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport("socket closed".to_string()));
        }
        self.sent.lock().unwrap().push(media);
        Ok(())
    }

    fn close(&mut self) {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn manager(devices: &FakeDevices, live: &FakeConnector) -> VoiceSessionManager {
    VoiceSessionManager::new(
        SessionConfig::default(),
        Arc::new(devices.clone()),
        Arc::new(live.clone()),
    )
}

/// Dispatch events until `done` holds or no event arrives for a while
pub async fn pump_until(
    manager: &mut VoiceSessionManager,
    mut done: impl FnMut(&VoiceSessionManager) -> bool,
) -> bool {
    while !done(manager) {
        match tokio::time::timeout(Duration::from_secs(1), manager.next_event()).await {
            Ok(Some(event)) => manager.dispatch(event),
            _ => return false,
        }
    }
    true
}

/// Dispatch everything that arrives within a short window
pub async fn settle(manager: &mut VoiceSessionManager) {
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(50), manager.next_event()).await
    {
        manager.dispatch(event);
    }
}

/// Start a session and wait until it is listening
pub async fn connected_manager(
    devices: &FakeDevices,
    live: &FakeConnector,
) -> VoiceSessionManager {
    let mut manager = manager(devices, live);
    manager.start().await.unwrap();
    assert!(pump_until(&mut manager, |m| m.state() == SessionState::Listening).await);
    manager
}

/// Base64 PCM16 chunk of silence lasting `secs` at the 24kHz output rate
pub fn audio_chunk(secs: f64) -> String {
    let samples = vec![0.0f32; (secs * 24000.0).round() as usize];
    pcm::encode_frame(&samples, 24000).data
}

pub fn audio_content(chunks: &[String]) -> ServerContent {
    ServerContent {
        model_turn: Some(ModelTurn {
            parts: chunks
                .iter()
                .map(|data| ServerPart {
                    inline_data: Some(MediaBlob {
                        mime_type: "audio/pcm;rate=24000".to_string(),
                        data: data.clone(),
                    }),
                })
                .collect(),
        }),
        ..Default::default()
    }
}

pub fn transcript_content(input: Option<&str>, output: Option<&str>) -> ServerContent {
    ServerContent {
        input_transcription: input.map(|text| Transcription {
            text: text.to_string(),
        }),
        output_transcription: output.map(|text| Transcription {
            text: text.to_string(),
        }),
        ..Default::default()
    }
}

pub fn interrupted_content() -> ServerContent {
    ServerContent {
        interrupted: true,
        ..Default::default()
    }
}
