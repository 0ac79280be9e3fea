use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use super::session::VoiceSessionManager;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::error::VoiceResult;

const COMMAND_CAPACITY: usize = 16;

enum Command {
    Start(oneshot::Sender<VoiceResult<SessionStats>>),
    Stop(oneshot::Sender<SessionStats>),
    Stats(oneshot::Sender<SessionStats>),
}

/// Cloneable handle to a manager running on its own task
///
/// The task owns the `VoiceSessionManager` and interleaves control
/// commands with session events, so every mutation happens in one place.
#[derive(Clone)]
pub struct VoiceController {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl VoiceController {
    /// Move the manager onto a background task. The task exits, tearing
    /// down any active session, once every handle is dropped.
    pub fn spawn(manager: VoiceSessionManager) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let state = manager.subscribe();
        tokio::spawn(run(manager, commands_rx));

        Self {
            commands: commands_tx,
            state,
        }
    }

    /// Start a session; resolves once devices are held and the handshake
    /// is underway
    pub async fn start(&self) -> Result<SessionStats> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Start(tx)).await?;
        let stats = rx.await.context("voice controller dropped the request")??;
        Ok(stats)
    }

    pub async fn stop(&self) -> Result<SessionStats> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop(tx)).await?;
        rx.await.context("voice controller dropped the request")
    }

    pub async fn stats(&self) -> Result<SessionStats> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx)).await?;
        rx.await.context("voice controller dropped the request")
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("voice controller is not running"))
    }
}

async fn run(mut manager: VoiceSessionManager, mut commands: mpsc::Receiver<Command>) {
    info!("Voice controller started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start(reply)) => {
                    let result = manager.start().await.map(|_| manager.stats());
                    let _ = reply.send(result);
                }
                Some(Command::Stop(reply)) => {
                    let _ = reply.send(manager.stop());
                }
                Some(Command::Stats(reply)) => {
                    let _ = reply.send(manager.stats());
                }
                None => break,
            },
            Some(event) = manager.next_event() => {
                debug!("Dispatching {:?}", event.session());
                manager.dispatch(event);
            }
        }
    }

    manager.stop();
    info!("Voice controller stopped");
}
