// Output playback: gapless scheduling of streamed audio chunks
//
// The scheduler decides *when* each chunk starts; a `PlaybackSink` (speaker or
// WAV recorder) owns the buffers until they finish and reports completions.
// `MixTimeline` is the sample-accurate timeline both sinks render from.

use std::collections::BTreeSet;

use tokio::sync::mpsc;

use crate::error::VoiceResult;

/// Identifies one scheduled output buffer within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

/// A decoded chunk of synthesized audio
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    /// Mono f32 samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Configuration for a playback sink
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Output sample rate (the live service synthesizes 24kHz audio)
    pub sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { sample_rate: 24000 }
    }
}

/// Audio output context supporting scheduled playback
#[async_trait::async_trait]
pub trait PlaybackSink: Send {
    /// Acquire the output device.
    ///
    /// Returns a receiver of buffers that finished playing naturally. Buffers
    /// removed with `stop` are never reported.
    async fn start(&mut self) -> VoiceResult<mpsc::UnboundedReceiver<BufferId>>;

    /// Current position of the output clock in seconds
    fn current_time(&self) -> f64;

    /// Schedule `buffer` to begin at `start_at` on the output clock
    fn schedule(&mut self, id: BufferId, buffer: PlaybackBuffer, start_at: f64) -> VoiceResult<()>;

    /// Stop a buffer immediately
    fn stop(&mut self, id: BufferId);

    /// Release the output device. Idempotent.
    fn close(&mut self);

    fn name(&self) -> &str;
}

/// Placement of one buffer on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    pub id: BufferId,
    pub start_at: f64,
    pub end_at: f64,
}

/// Gapless playback cursor plus the set of unfinished buffers
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_playback_time: f64,
    active: BTreeSet<BufferId>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a buffer of `duration` seconds arriving at clock time `now`.
    ///
    /// Starts where the previous buffer ends, or at `now` if that is later.
    pub fn schedule(&mut self, duration: f64, now: f64) -> ScheduledBuffer {
        let start_at = self.next_playback_time.max(now);
        let end_at = start_at + duration;
        self.next_playback_time = end_at;

        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.active.insert(id);

        ScheduledBuffer {
            id,
            start_at,
            end_at,
        }
    }

    /// Mark a buffer as finished.
    ///
    /// Returns true only when this removal emptied the active set.
    pub fn finish(&mut self, id: BufferId) -> bool {
        self.active.remove(&id) && self.active.is_empty()
    }

    /// Drop every active buffer and reset the cursor to 0.
    ///
    /// Returns the ids that the sink must stop.
    pub fn interrupt(&mut self) -> Vec<BufferId> {
        let stopped = std::mem::take(&mut self.active).into_iter().collect();
        self.next_playback_time = 0.0;
        stopped
    }

    pub fn next_playback_time(&self) -> f64 {
        self.next_playback_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: BufferId) -> bool {
        self.active.contains(&id)
    }
}

struct Voice {
    id: BufferId,
    start: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Sample-accurate mono mixing timeline driven by an output clock
pub struct MixTimeline {
    sample_rate: u32,
    position: u64,
    voices: Vec<Voice>,
}

impl MixTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            position: 0,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples rendered so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Seconds rendered so far
    pub fn current_time(&self) -> f64 {
        self.position as f64 / self.sample_rate as f64
    }

    /// Add a buffer starting at `start_at` seconds (clamped to the playhead)
    pub fn schedule(&mut self, id: BufferId, buffer: PlaybackBuffer, start_at: f64) {
        let start = ((start_at.max(0.0) * self.sample_rate as f64).round() as u64).max(self.position);
        self.voices.push(Voice {
            id,
            start,
            samples: buffer.samples,
        });
    }

    /// Remove a buffer without reporting it as finished
    pub fn stop(&mut self, id: BufferId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Mix the next `out.len()` samples and advance the playhead.
    ///
    /// Returns the buffers that finished within this block.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<BufferId> {
        out.fill(0.0);
        let block_start = self.position;
        let block_end = block_start + out.len() as u64;

        for voice in &self.voices {
            let from = voice.start.max(block_start);
            let to = voice.end().min(block_end);
            for t in from..to {
                let sample = voice.samples[(t - voice.start) as usize];
                let slot = &mut out[(t - block_start) as usize];
                *slot = (*slot + sample).clamp(-1.0, 1.0);
            }
        }

        self.position = block_end;

        let mut finished = Vec::new();
        self.voices.retain(|v| {
            if v.end() <= block_end {
                finished.push(v.id);
                false
            } else {
                true
            }
        });
        finished
    }
}
