use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{LiveHandle, SessionEvent, SessionId, SessionState};
use super::stats::{ErrorReport, SessionStats};
use crate::audio::{
    pcm, AudioBackend, AudioDevices, AudioFrame, BufferId, PlaybackScheduler, PlaybackSink,
};
use crate::error::{VoiceError, VoiceResult};
use crate::live::{LiveConnection, LiveConnector, LiveEvent, MediaBlob};

/// One active realtime connection and everything it holds
struct Session {
    id: SessionId,
    label: String,
    state: SessionState,
    started_at: DateTime<Utc>,
    capture: Option<Box<dyn AudioBackend>>,
    playback: Option<Box<dyn PlaybackSink>>,
    connection: Option<Box<dyn LiveConnection>>,
    scheduler: PlaybackScheduler,
    /// Frames captured before the transport was ready
    pending_frames: VecDeque<MediaBlob>,
    /// Server events held back until the handshake result is dispatched
    live_events: Option<mpsc::UnboundedReceiver<LiveEvent>>,
    transcript: String,
    frames_sent: u64,
    chunks_received: u64,
    /// Forwarding and handshake tasks, aborted on teardown
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    fn new(id: SessionId, label: String) -> Self {
        Self {
            id,
            label,
            state: SessionState::Connecting,
            started_at: Utc::now(),
            capture: None,
            playback: None,
            connection: None,
            scheduler: PlaybackScheduler::new(),
            pending_frames: VecDeque::new(),
            live_events: None,
            transcript: String::new(),
            frames_sent: 0,
            chunks_received: 0,
            tasks: Vec::new(),
        }
    }

    fn send(&mut self, media: MediaBlob) -> VoiceResult<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| VoiceError::Transport("not connected".to_string()))?;
        connection.send_realtime_input(media)?;
        self.frames_sent += 1;
        Ok(())
    }

    fn append_transcript(&mut self, text: &str) {
        if !self.transcript.is_empty() {
            self.transcript.push(' ');
        }
        self.transcript.push_str(text);
    }

    fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            state: self.state,
            session_label: Some(self.label.clone()),
            started_at: Some(self.started_at),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent,
            chunks_received: self.chunks_received,
            active_buffers: self.scheduler.active_count(),
            transcript: self.transcript.clone(),
            last_error: None,
        }
    }
}

/// Owns the lifecycle of at most one voice session at a time
///
/// All session state is mutated by `dispatch`, called from a single task.
/// Device threads, the websocket reader and the handshake only forward
/// `SessionEvent`s into the manager's channel.
pub struct VoiceSessionManager {
    config: SessionConfig,
    devices: Arc<dyn AudioDevices>,
    connector: Arc<dyn LiveConnector>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    next_session: u64,
    session: Option<Session>,
    last_error: Option<VoiceError>,
    last_stats: Option<SessionStats>,
}

impl VoiceSessionManager {
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn AudioDevices>,
        connector: Arc<dyn LiveConnector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);

        Self {
            config,
            devices,
            connector,
            events_tx,
            events_rx,
            state_tx,
            next_session: 0,
            session: None,
            last_error: None,
            last_stats: None,
        }
    }

    /// Start a new session.
    ///
    /// Acquires the microphone and the output device, then begins the
    /// transport handshake in the background; the session stays
    /// `Connecting` until the resulting `Connected` event is dispatched.
    /// Fails with `AlreadyActive` if a session exists; the caller must stop
    /// it first.
    pub async fn start(&mut self) -> VoiceResult<SessionId> {
        if let Some(session) = &self.session {
            warn!("Session {} already active ({})", session.id, session.state);
            return Err(VoiceError::AlreadyActive);
        }

        self.next_session += 1;
        let id = SessionId(self.next_session);
        let label = format!("voice-{}", uuid::Uuid::new_v4());
        info!("Starting voice session {} ({})", id, label);

        self.last_error = None;
        self.last_stats = None;
        self.session = Some(Session::new(id, label));
        self.publish_state();

        if let Err(e) = self.acquire_devices(id).await {
            self.fail(e.clone());
            return Err(e);
        }

        self.spawn_handshake(id);
        Ok(id)
    }

    /// Tear the session down from any state. Idempotent.
    pub fn stop(&mut self) -> SessionStats {
        if self.session.is_some() {
            info!("Stopping voice session");
            self.teardown();
        } else {
            debug!("Stop requested with no active session");
        }
        self.stats()
    }

    /// Wait for the next event addressed to this manager
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Dispatch events until the session returns to `Idle`
    pub async fn run_until_idle(&mut self) {
        while self.state() != SessionState::Idle {
            match self.next_event().await {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
    }

    /// Apply one event to the active session
    pub fn dispatch(&mut self, event: SessionEvent) {
        let active = self.session.as_ref().map(|s| s.id);
        if active != Some(event.session()) {
            debug!("Ignoring event for inactive session {}", event.session());
            if let SessionEvent::Connected {
                result: Ok(LiveHandle(mut connection)),
                ..
            } = event
            {
                connection.close();
            }
            return;
        }

        match event {
            SessionEvent::Connected { result, .. } => match result {
                Ok(LiveHandle(connection)) => self.on_connected(connection),
                Err(e) => self.fail(e),
            },
            SessionEvent::FrameCaptured { frame, .. } => self.on_frame(frame),
            SessionEvent::TranscriptFragment { text, .. } => self.on_transcript(&text),
            SessionEvent::ChunkReceived { data, .. } => self.on_chunk(&data),
            SessionEvent::Interrupted { .. } => self.on_interrupted(),
            SessionEvent::PlaybackEnded { buffer, .. } => self.on_playback_ended(buffer),
            SessionEvent::TransportError { message, .. } => {
                self.fail(VoiceError::Transport(message))
            }
            SessionEvent::Closed { .. } => {
                info!("Live service closed the session");
                self.teardown();
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Running transcript of the active session, or of the last one
    pub fn transcript(&self) -> String {
        match &self.session {
            Some(session) => session.transcript.clone(),
            None => self
                .last_stats
                .as_ref()
                .map(|s| s.transcript.clone())
                .unwrap_or_default(),
        }
    }

    pub fn active_buffers(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.scheduler.active_count())
            .unwrap_or(0)
    }

    pub fn next_playback_time(&self) -> f64 {
        self.session
            .as_ref()
            .map(|s| s.scheduler.next_playback_time())
            .unwrap_or(0.0)
    }

    /// The error that ended the most recent session
    pub fn last_error(&self) -> Option<&VoiceError> {
        self.last_error.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        match &self.session {
            Some(session) => session.stats(),
            None => self
                .last_stats
                .clone()
                .unwrap_or_else(|| SessionStats::idle(self.last_error.as_ref())),
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    async fn acquire_devices(&mut self, id: SessionId) -> VoiceResult<()> {
        let mut capture = self.devices.open_capture(&self.config.capture);
        let frames = match capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                capture.stop();
                return Err(e);
            }
        };

        let mut playback = self.devices.open_playback(&self.config.playback);
        let completions = match playback.start().await {
            Ok(completions) => completions,
            Err(e) => {
                capture.stop();
                playback.close();
                return Err(e);
            }
        };

        info!(
            "Audio devices acquired: {} capture, {} playback",
            capture.name(),
            playback.name()
        );

        let tasks = [
            forward_frames(id, frames, self.events_tx.clone()),
            forward_completions(id, completions, self.events_tx.clone()),
        ];

        if let Some(session) = self.session.as_mut() {
            session.capture = Some(capture);
            session.playback = Some(playback);
            session.tasks.extend(tasks);
        }
        Ok(())
    }

    fn spawn_handshake(&mut self, id: SessionId) {
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let connector = Arc::clone(&self.connector);
        let live_config = self.config.live.clone();
        let events = self.events_tx.clone();

        let handshake = tokio::spawn(async move {
            let result = connector.connect(&live_config, live_tx).await.map(LiveHandle);
            let _ = events.send(SessionEvent::Connected {
                session: id,
                result,
            });
        });

        if let Some(session) = self.session.as_mut() {
            session.live_events = Some(live_rx);
            session.tasks.push(handshake);
        }
    }

    fn on_connected(&mut self, connection: Box<dyn LiveConnection>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.connection = Some(connection);
        session.state = SessionState::Listening;

        // Server events only start flowing once the session is Listening
        if let Some(live) = session.live_events.take() {
            session
                .tasks
                .push(forward_live(session.id, live, self.events_tx.clone()));
        }

        let pending = std::mem::take(&mut session.pending_frames);
        info!(
            "Session {} connected, flushing {} buffered frames",
            session.id,
            pending.len()
        );

        let mut flushed = Ok(());
        for media in pending {
            if let Err(e) = session.send(media) {
                flushed = Err(e);
                break;
            }
        }

        self.publish_state();
        if let Err(e) = flushed {
            self.fail(e);
        }
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        let max_pending = self.config.max_pending_frames;
        let input_rate = self.config.capture.sample_rate;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let media = pcm::encode_frame(&frame.samples, input_rate);

        match session.state {
            SessionState::Connecting => {
                if session.pending_frames.len() >= max_pending {
                    session.pending_frames.pop_front();
                    warn!("Dropping oldest buffered frame while connecting");
                }
                session.pending_frames.push_back(media);
            }
            SessionState::Listening | SessionState::Speaking => {
                if let Err(e) = session.send(media) {
                    self.fail(e);
                }
            }
            SessionState::Idle => {}
        }
    }

    fn on_transcript(&mut self, text: &str) {
        if let Some(session) = self.session.as_mut() {
            debug!("Transcript fragment: {}", text);
            session.append_transcript(text);
        }
    }

    fn on_chunk(&mut self, data: &str) {
        let buffer = match pcm::decode_chunk(data, self.config.playback.sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state == SessionState::Connecting {
            warn!("Audio chunk received before the session was ready, dropping");
            return;
        }
        let Some(playback) = session.playback.as_mut() else {
            return;
        };

        let placed = session
            .scheduler
            .schedule(buffer.duration(), playback.current_time());
        let scheduled = playback.schedule(placed.id, buffer, placed.start_at);
        session.chunks_received += 1;

        if let Err(e) = scheduled {
            self.fail(e);
            return;
        }

        debug!(
            "Scheduled buffer {:?} at {:.3}s-{:.3}s ({} active)",
            placed.id,
            placed.start_at,
            placed.end_at,
            session.scheduler.active_count()
        );

        if session.state == SessionState::Listening {
            session.state = SessionState::Speaking;
            self.publish_state();
        }
    }

    fn on_interrupted(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let stopped = session.scheduler.interrupt();
        if let Some(playback) = session.playback.as_mut() {
            for id in &stopped {
                playback.stop(*id);
            }
        }
        info!(
            "Session {} interrupted, stopped {} buffers",
            session.id,
            stopped.len()
        );

        if session.state == SessionState::Speaking {
            session.state = SessionState::Listening;
            self.publish_state();
        }
    }

    fn on_playback_ended(&mut self, buffer: BufferId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.scheduler.finish(buffer) && session.state == SessionState::Speaking {
            debug!("Playback drained, back to listening");
            session.state = SessionState::Listening;
            self.publish_state();
        }
    }

    fn fail(&mut self, err: VoiceError) {
        error!("Voice session failed: {}", err);
        self.last_error = Some(err);
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        for task in session.tasks.drain(..) {
            task.abort();
        }
        if let Some(mut connection) = session.connection.take() {
            connection.close();
        }
        if let Some(mut capture) = session.capture.take() {
            capture.stop();
        }
        let stopped = session.scheduler.interrupt();
        if let Some(mut playback) = session.playback.take() {
            for id in stopped {
                playback.stop(id);
            }
            playback.close();
        }
        session.pending_frames.clear();
        session.state = SessionState::Idle;

        let mut stats = session.stats();
        stats.last_error = self.last_error.as_ref().map(ErrorReport::from);
        info!(
            "Voice session {} ended after {:.1}s ({} frames sent, {} chunks received)",
            session.id, stats.duration_secs, stats.frames_sent, stats.chunks_received
        );

        self.last_stats = Some(stats);
        self.publish_state();
    }

    fn publish_state(&self) {
        let state = self.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

impl Drop for VoiceSessionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn forward_frames(
    session: SessionId,
    mut frames: mpsc::Receiver<AudioFrame>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if events
                .send(SessionEvent::FrameCaptured { session, frame })
                .is_err()
            {
                return;
            }
        }
        debug!("Capture stream for session {} ended", session);
    })
}

fn forward_completions(
    session: SessionId,
    mut completions: mpsc::UnboundedReceiver<BufferId>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(buffer) = completions.recv().await {
            if events
                .send(SessionEvent::PlaybackEnded { session, buffer })
                .is_err()
            {
                return;
            }
        }
    })
}

fn forward_live(
    session: SessionId,
    mut live: mpsc::UnboundedReceiver<LiveEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = live.recv().await {
            let mapped = match event {
                LiveEvent::Message(content) => SessionEvent::from_server_content(session, content),
                LiveEvent::Error(message) => vec![SessionEvent::TransportError { session, message }],
                LiveEvent::Closed => vec![SessionEvent::Closed { session }],
            };
            for event in mapped {
                if events.send(event).is_err() {
                    return;
                }
            }
        }
    })
}
