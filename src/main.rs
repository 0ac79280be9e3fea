use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curelink_voice::{
    create_router, AppState, AudioSource, Config, GeminiLiveConnector, PlaybackTarget,
    SessionConfig, SessionState, SystemAudioDevices, VoiceController, VoiceSessionManager,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "curelink-voice", version, about = "CureLink realtime voice assistant")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, global = true, default_value = "config/curelink-voice")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hold one voice conversation in the terminal
    Talk {
        /// Read microphone audio from a 16-bit mono WAV file instead
        #[arg(long)]
        input_wav: Option<PathBuf>,

        /// Write the assistant's audio to a WAV file instead of the speaker
        #[arg(long)]
        output_wav: Option<PathBuf>,
    },
    /// Run the HTTP control API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Talk {
            input_wav,
            output_wav,
        } => talk(&cfg, input_wav, output_wav).await,
        Command::Serve => serve(&cfg).await,
    }
}

async fn talk(cfg: &Config, input_wav: Option<PathBuf>, output_wav: Option<PathBuf>) -> Result<()> {
    let devices = SystemAudioDevices {
        source: input_wav
            .map(AudioSource::File)
            .unwrap_or(AudioSource::Microphone),
        target: output_wav
            .map(PlaybackTarget::WavFile)
            .unwrap_or(PlaybackTarget::Speaker),
    };
    let mut manager = VoiceSessionManager::new(
        SessionConfig::from(cfg),
        Arc::new(devices),
        Arc::new(GeminiLiveConnector::new()),
    );

    manager
        .start()
        .await
        .context("Failed to start voice session")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut state = manager.state();
    let mut printed = 0;
    println!("[{}] press Ctrl-C to hang up", state);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Hanging up");
                break;
            }
            event = manager.next_event() => match event {
                Some(event) => manager.dispatch(event),
                None => break,
            },
        }

        let current = manager.state();
        if current != state {
            println!("[{}]", current);
            state = current;
        }

        let transcript = manager.transcript();
        if transcript.len() > printed {
            println!("{}", transcript[printed..].trim());
            printed = transcript.len();
        }

        if current == SessionState::Idle {
            break;
        }
    }

    let stats = manager.stop();
    if let Some(err) = &stats.last_error {
        anyhow::bail!("Session ended with error: {}", err.message);
    }

    println!(
        "Session ended after {:.1}s ({} frames sent, {} chunks received)",
        stats.duration_secs, stats.frames_sent, stats.chunks_received
    );
    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    let manager = VoiceSessionManager::new(
        SessionConfig::from(cfg),
        Arc::new(SystemAudioDevices::default()),
        Arc::new(GeminiLiveConnector::new()),
    );
    let controller = VoiceController::spawn(manager);
    let app = create_router(AppState::new(controller));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
