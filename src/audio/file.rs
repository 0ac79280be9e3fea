use anyhow::{Context, Result};
use hound::WavReader;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::pcm;
use super::playback::{BufferId, MixTimeline, PlaybackBuffer, PlaybackConfig, PlaybackSink};
use crate::error::{VoiceError, VoiceResult};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Average interleaved channels down to mono f32 samples
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| pcm::i16_to_f32(s)).sum();
                sum / channels as f32
            })
            .collect()
    }
}

/// Streams a WAV file as if it were a microphone, paced in real time
pub struct WavFileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            return Err(VoiceError::DeviceUnavailable(
                "file source already capturing".to_string(),
            ));
        }

        if self.config.block_size == 0 || self.config.sample_rate == 0 {
            return Err(VoiceError::DeviceUnavailable(format!(
                "invalid capture format: {} samples/frame at {}Hz",
                self.config.block_size, self.config.sample_rate
            )));
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;

        if audio.sample_rate != self.config.sample_rate {
            return Err(VoiceError::DeviceUnavailable(format!(
                "{} is {}Hz, capture expects {}Hz",
                audio.path, audio.sample_rate, self.config.sample_rate
            )));
        }

        let samples = audio.to_mono_f32();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let block_size = self.config.block_size;
        let sample_rate = self.config.sample_rate;
        let path = audio.path.clone();

        let task = tokio::spawn(async move {
            let block_duration = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);
            let mut ticker = tokio::time::interval(block_duration);

            for (sequence, block) in samples.chunks(block_size).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate,
                    sequence: sequence as u64,
                    timestamp_ms: (sequence * block_size) as u64 * 1000 / sample_rate as u64,
                };
                if tx.send(frame).await.is_err() {
                    debug!("Capture receiver dropped, stopping file playback");
                    return;
                }
            }

            info!("Reached end of capture file {}", path);
        });

        self.task = Some(task);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped: {}", self.path.display());
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for WavFileBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

const RECORDER_TICK: Duration = Duration::from_millis(20);

type PlaybackWriter = hound::WavWriter<BufWriter<File>>;

/// Virtual output device that renders scheduled audio to a WAV file
///
/// The clock advances in real time and every rendered block, silence
/// included, is streamed to disk as it is produced.
pub struct WavPlaybackRecorder {
    path: PathBuf,
    config: PlaybackConfig,
    timeline: Arc<Mutex<MixTimeline>>,
    writer: Arc<Mutex<Option<PlaybackWriter>>>,
    ticker: Option<JoinHandle<()>>,
}

impl WavPlaybackRecorder {
    pub fn new(path: PathBuf, config: PlaybackConfig) -> Self {
        let timeline = Arc::new(Mutex::new(MixTimeline::new(config.sample_rate)));
        Self {
            path,
            config,
            timeline,
            writer: Arc::new(Mutex::new(None)),
            ticker: None,
        }
    }

    fn with_timeline<R>(&self, f: impl FnOnce(&mut MixTimeline) -> R) -> R {
        let mut timeline = self
            .timeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut timeline)
    }

    fn create_writer(&self) -> Result<PlaybackWriter> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        hound::WavWriter::create(&self.path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", self.path))
    }

    fn finalize(&self) -> Result<Option<u32>> {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(writer) = writer else {
            return Ok(None);
        };
        let count = writer.len();
        writer.finalize().context("Failed to finalize WAV file")?;
        Ok(Some(count))
    }
}

fn write_block(writer: &Mutex<Option<PlaybackWriter>>, block: &[f32]) {
    let mut guard = writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let Some(wav) = guard.as_mut() else {
        return;
    };
    for &sample in block {
        if let Err(e) = wav.write_sample(pcm::f32_to_i16(sample)) {
            error!("Failed to write playback sample, recording stopped: {}", e);
            *guard = None;
            return;
        }
    }
}

#[async_trait::async_trait]
impl PlaybackSink for WavPlaybackRecorder {
    async fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<BufferId>> {
        if self.ticker.is_some() {
            return Err(VoiceError::DeviceUnavailable(
                "recorder already open".to_string(),
            ));
        }

        let wav = self
            .create_writer()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;
        *self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(wav);

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let timeline = Arc::clone(&self.timeline);
        let writer = Arc::clone(&self.writer);
        let sample_rate = self.config.sample_rate as f64;

        let ticker = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = tokio::time::interval(RECORDER_TICK);
            let mut block = Vec::new();

            loop {
                interval.tick().await;

                let finished = {
                    let mut timeline = timeline
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    let target = (started.elapsed().as_secs_f64() * sample_rate) as u64;
                    let due = target.saturating_sub(timeline.position());
                    block.resize(due as usize, 0.0);
                    timeline.render(&mut block)
                };

                write_block(&writer, &block);

                for id in finished {
                    if done_tx.send(id).is_err() {
                        return;
                    }
                }
            }
        });

        info!("Recording playback to {}", self.path.display());
        self.ticker = Some(ticker);
        Ok(done_rx)
    }

    fn current_time(&self) -> f64 {
        self.with_timeline(|t| t.current_time())
    }

    fn schedule(&mut self, id: BufferId, buffer: PlaybackBuffer, start_at: f64) -> VoiceResult<()> {
        if self.ticker.is_none() {
            return Err(VoiceError::DeviceUnavailable("recorder is closed".to_string()));
        }
        if buffer.sample_rate != self.config.sample_rate {
            warn!(
                "Buffer rate {}Hz differs from recorder rate {}Hz",
                buffer.sample_rate, self.config.sample_rate
            );
        }
        self.with_timeline(|t| t.schedule(id, buffer, start_at));
        Ok(())
    }

    fn stop(&mut self, id: BufferId) {
        self.with_timeline(|t| t.stop(id));
    }

    fn close(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };
        ticker.abort();
        self.with_timeline(|t| t.clear());

        match self.finalize() {
            Ok(Some(count)) => info!(
                "Wrote {} playback samples to {}",
                count,
                self.path.display()
            ),
            Ok(None) => warn!("Playback recording {} ended early", self.path.display()),
            Err(e) => error!("Failed to write playback recording: {:#}", e),
        }
    }

    fn name(&self) -> &str {
        "WAV recorder"
    }
}

impl Drop for WavPlaybackRecorder {
    fn drop(&mut self) {
        self.close();
    }
}
