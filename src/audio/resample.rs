// Sample rate conversion between the hardware and the session clocks
//
// Devices run at whatever rate and channel count they default to. The session
// always sends 16kHz mono upstream and mixes replies on a 24kHz mono timeline,
// so both directions pass through a `StreamResampler`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

use super::playback::{BufferId, MixTimeline};
use crate::error::{VoiceError, VoiceResult};

/// Timeline samples rendered per resampler pass (20ms at 24kHz)
const TIMELINE_CHUNK: usize = 480;

/// Average interleaved frames down to mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Mono resampler for audio that arrives in arbitrary slice lengths.
///
/// Input is held back until a full chunk is available. Equal rates pass
/// straight through.
pub struct StreamResampler {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    chunk_size: usize,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> VoiceResult<Self> {
        if from_rate == 0 || to_rate == 0 || chunk_size == 0 {
            return Err(VoiceError::DeviceUnavailable(format!(
                "cannot resample {}Hz to {}Hz in chunks of {}",
                from_rate, to_rate, chunk_size
            )));
        }

        let resampler = if from_rate == to_rate {
            None
        } else {
            let ratio = to_rate as f64 / from_rate as f64;
            let resampler =
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                    .map_err(|e| VoiceError::DeviceUnavailable(format!("resampler: {}", e)))?;
            Some(resampler)
        };

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(chunk_size),
            chunk_size,
        })
    }

    /// Input samples consumed per conversion step
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Convert `input`, appending whatever output is ready to `out`
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(input);
            return;
        };

        self.pending.extend_from_slice(input);
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.chunk_size {
            let chunk = &self.pending[consumed..consumed + self.chunk_size];
            match resampler.process(&[chunk], None) {
                Ok(channels) => {
                    if let Some(mono) = channels.first() {
                        out.extend_from_slice(mono);
                    }
                }
                Err(e) => warn!("Resampling failed: {}", e),
            }
            consumed += self.chunk_size;
        }
        self.pending.drain(..consumed);
    }
}

/// Pulls mono audio off a shared `MixTimeline` at a device's rate.
///
/// The timeline keeps its own clock, so scheduling and `current_time` stay in
/// timeline seconds whatever the hardware runs at.
pub struct TimelineReader {
    timeline: Arc<Mutex<MixTimeline>>,
    resampler: StreamResampler,
    block: Vec<f32>,
    resampled: Vec<f32>,
    ready: VecDeque<f32>,
}

impl TimelineReader {
    pub fn new(timeline: Arc<Mutex<MixTimeline>>, device_rate: u32) -> VoiceResult<Self> {
        let timeline_rate = timeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sample_rate();
        let resampler = StreamResampler::new(timeline_rate, device_rate, TIMELINE_CHUNK)?;
        Ok(Self {
            timeline,
            resampler,
            block: vec![0.0; TIMELINE_CHUNK],
            resampled: Vec::new(),
            ready: VecDeque::new(),
        })
    }

    /// Fill `out` with device-rate samples.
    ///
    /// Returns the buffers that finished on the timeline while rendering.
    pub fn read(&mut self, out: &mut [f32]) -> Vec<BufferId> {
        let mut finished = Vec::new();

        while self.ready.len() < out.len() {
            {
                let mut timeline = self
                    .timeline
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                finished.extend(timeline.render(&mut self.block));
            }
            self.resampled.clear();
            self.resampler.process(&self.block, &mut self.resampled);
            if self.resampled.is_empty() {
                break;
            }
            self.ready.extend(self.resampled.iter().copied());
        }

        let available = self.ready.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(self.ready.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0.0);
        finished
    }
}
