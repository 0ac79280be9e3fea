// Hardware audio through cpal
//
// cpal streams are not Send on every platform, so each stream lives on its own
// thread for the duration of the session. The session only ever sees channel
// endpoints: captured frames come in, completed buffer ids come out.
//
// Devices are opened at their default config. Capture is downmixed and
// resampled to the session input rate; playback is resampled from the 24kHz
// timeline and copied to every output channel.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::playback::{BufferId, MixTimeline, PlaybackBuffer, PlaybackConfig, PlaybackSink};
use super::resample::{downmix, StreamResampler, TimelineReader};
use crate::error::{VoiceError, VoiceResult};

/// Keeps a stream thread alive until stopped
struct StreamThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    fn shutdown(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Audio stream thread panicked");
            }
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> VoiceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable
        | cpal::BuildStreamError::StreamConfigNotSupported => {
            VoiceError::DeviceUnavailable(err.to_string())
        }
        other => VoiceError::PermissionDenied(other.to_string()),
    }
}

/// Device samples fed to the capture resampler per step
const CAPTURE_CHUNK: usize = 1024;

/// Mono session-rate samples cut into fixed frames
struct CaptureBlocks {
    resampler: StreamResampler,
    resampled: Vec<f32>,
    block: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
    sequence: u64,
    started: Instant,
    frame_tx: mpsc::Sender<AudioFrame>,
}

impl CaptureBlocks {
    fn push(&mut self, mono: &[f32]) {
        self.resampled.clear();
        self.resampler.process(mono, &mut self.resampled);

        for &sample in &self.resampled {
            self.block.push(sample);
            if self.block.len() < self.block_size {
                continue;
            }
            let frame = AudioFrame {
                samples: std::mem::replace(&mut self.block, Vec::with_capacity(self.block_size)),
                sample_rate: self.sample_rate,
                sequence: self.sequence,
                timestamp_ms: self.started.elapsed().as_millis() as u64,
            };
            if self.frame_tx.try_send(frame).is_err() {
                warn!("Capture channel full, dropping frame {}", self.sequence);
            }
            self.sequence += 1;
        }
    }
}

fn open_microphone(
    sample_rate: u32,
    block_size: usize,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> VoiceResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no default input device".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
    let config: cpal::StreamConfig = supported.config();
    debug!(
        "Input device at {}Hz, {} channel(s), {:?}",
        config.sample_rate.0,
        config.channels,
        supported.sample_format()
    );

    let blocks = CaptureBlocks {
        resampler: StreamResampler::new(config.sample_rate.0, sample_rate, CAPTURE_CHUNK)?,
        resampled: Vec::new(),
        block: Vec::with_capacity(block_size),
        block_size,
        sample_rate,
        sequence: 0,
        started: Instant::now(),
        frame_tx,
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, blocks),
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, blocks),
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, blocks),
        other => {
            return Err(VoiceError::DeviceUnavailable(format!(
                "unsupported input sample format {:?}",
                other
            )))
        }
    };
    stream.map_err(map_build_error)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut blocks: CaptureBlocks,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut converted: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|&s| f32::from_sample(s)));
            blocks.push(&downmix(&converted, channels));
        },
        |err| error!("Microphone stream error: {}", err),
        None,
    )
}

fn open_speaker(
    timeline: Arc<Mutex<MixTimeline>>,
    done_tx: mpsc::UnboundedSender<BufferId>,
) -> VoiceResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no default output device".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
    let config: cpal::StreamConfig = supported.config();
    debug!(
        "Output device at {}Hz, {} channel(s), {:?}",
        config.sample_rate.0,
        config.channels,
        supported.sample_format()
    );

    let reader = TimelineReader::new(timeline, config.sample_rate.0)?;
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, reader, done_tx),
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, reader, done_tx),
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, reader, done_tx),
        other => {
            return Err(VoiceError::DeviceUnavailable(format!(
                "unsupported output sample format {:?}",
                other
            )))
        }
    };
    stream.map_err(map_build_error)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reader: TimelineReader,
    done_tx: mpsc::UnboundedSender<BufferId>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            mono.resize(data.len() / channels, 0.0);
            let finished = reader.read(&mut mono);
            for (frame, &sample) in data.chunks_mut(channels).zip(&mono) {
                frame.fill(T::from_sample(sample));
            }
            for id in finished {
                let _ = done_tx.send(id);
            }
        },
        |err| error!("Speaker stream error: {}", err),
        None,
    )
}

/// Default microphone captured as mono f32 blocks
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stream: Option<StreamThread>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            return Err(VoiceError::DeviceUnavailable(
                "microphone already capturing".to_string(),
            ));
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel::<VoiceResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let sample_rate = self.config.sample_rate;
        let block_size = self.config.block_size;

        let handle = std::thread::Builder::new()
            .name("curelink-mic".to_string())
            .spawn(move || {
                let stream = match open_microphone(sample_rate, block_size, frame_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(VoiceError::PermissionDenied(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Blocks until stop() or the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Microphone stream released");
            })
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        let thread = StreamThread {
            stop_tx,
            handle: Some(handle),
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Microphone capture started ({}Hz, {} samples/frame)", sample_rate, block_size);
                self.stream = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                thread.shutdown();
                Err(e)
            }
            Err(_) => {
                thread.shutdown();
                Err(VoiceError::DeviceUnavailable(
                    "microphone thread exited during startup".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(thread) = self.stream.take() {
            info!("Stopping microphone capture");
            thread.shutdown();
        }
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Default output device playing a mono timeline
pub struct SpeakerSink {
    config: PlaybackConfig,
    timeline: Arc<Mutex<MixTimeline>>,
    stream: Option<StreamThread>,
}

impl SpeakerSink {
    pub fn new(config: PlaybackConfig) -> Self {
        let timeline = Arc::new(Mutex::new(MixTimeline::new(config.sample_rate)));
        Self {
            config,
            timeline,
            stream: None,
        }
    }

    fn with_timeline<R>(&self, f: impl FnOnce(&mut MixTimeline) -> R) -> R {
        let mut timeline = self
            .timeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut timeline)
    }
}

#[async_trait::async_trait]
impl PlaybackSink for SpeakerSink {
    async fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<BufferId>> {
        if self.stream.is_some() {
            return Err(VoiceError::DeviceUnavailable(
                "speaker already open".to_string(),
            ));
        }

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<VoiceResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let timeline = Arc::clone(&self.timeline);
        let sample_rate = self.config.sample_rate;

        let handle = std::thread::Builder::new()
            .name("curelink-speaker".to_string())
            .spawn(move || {
                let stream = match open_speaker(timeline, done_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Speaker stream released");
            })
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

        let thread = StreamThread {
            stop_tx,
            handle: Some(handle),
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("Speaker playback started ({}Hz)", sample_rate);
                self.stream = Some(thread);
                Ok(done_rx)
            }
            Ok(Err(e)) => {
                thread.shutdown();
                Err(e)
            }
            Err(_) => {
                thread.shutdown();
                Err(VoiceError::DeviceUnavailable(
                    "speaker thread exited during startup".to_string(),
                ))
            }
        }
    }

    fn current_time(&self) -> f64 {
        self.with_timeline(|t| t.current_time())
    }

    fn schedule(&mut self, id: BufferId, buffer: PlaybackBuffer, start_at: f64) -> VoiceResult<()> {
        if self.stream.is_none() {
            return Err(VoiceError::DeviceUnavailable("speaker is closed".to_string()));
        }
        self.with_timeline(|t| t.schedule(id, buffer, start_at));
        Ok(())
    }

    fn stop(&mut self, id: BufferId) {
        self.with_timeline(|t| t.stop(id));
    }

    fn close(&mut self) {
        self.with_timeline(|t| t.clear());
        if let Some(thread) = self.stream.take() {
            info!("Closing speaker playback");
            thread.shutdown();
        }
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        self.close();
    }
}
