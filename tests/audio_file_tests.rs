// Integration tests for the WAV capture source and playback recorder
//
// WAV inputs are generated into a temporary directory with hound.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use curelink_voice::audio::{
    AudioBackend, AudioBackendConfig, AudioFile, BufferId, PlaybackBuffer, PlaybackConfig,
    PlaybackSink, WavFileBackend, WavPlaybackRecorder,
};
use curelink_voice::error::VoiceError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tempfile::TempDir;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("input.wav");
    write_wav(&path, 16000, 1, &vec![1000; 8000])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert_eq!(audio.duration_seconds, 0.5);
    assert!(audio.path.ends_with("input.wav"));
    Ok(())
}

#[test]
fn test_stereo_file_is_averaged_to_mono() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_wav(&path, 16000, 2, &[16384, 0, -16384, -16384])?;

    let mono = AudioFile::open(&path)?.to_mono_f32();

    assert_eq!(mono, vec![0.25, -0.5]);
    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    assert!(AudioFile::open("/nonexistent/path/to/audio.wav").is_err());
}

#[test]
fn test_float_wav_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("float.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    writer.write_sample(0.5f32)?;
    writer.finalize()?;

    assert!(AudioFile::open(&path).is_err());
    Ok(())
}

#[tokio::test]
async fn test_file_backend_streams_fixed_blocks() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("speech.wav");
    let samples: Vec<i16> = (0..1000).map(|i| (i % 100) as i16 * 100).collect();
    write_wav(&path, 16000, 1, &samples)?;

    let config = AudioBackendConfig {
        sample_rate: 16000,
        block_size: 160,
        channel_capacity: 16,
    };
    let mut backend = WavFileBackend::new(path, config);
    let mut frames = backend.start().await?;
    assert!(backend.is_capturing());

    let mut received = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), frames.recv()).await {
        received.push(frame);
    }

    assert_eq!(received.len(), 7, "1000 samples in blocks of 160");
    assert!(received[..6].iter().all(|f| f.samples.len() == 160));
    assert_eq!(received[6].samples.len(), 40);
    assert!(received.iter().enumerate().all(|(i, f)| f.sequence == i as u64));
    assert_eq!(received[1].timestamp_ms, 10);

    backend.stop();
    assert!(!backend.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_file_backend_rejects_wrong_sample_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cd.wav");
    write_wav(&path, 44100, 1, &[0; 441])?;

    let mut backend = WavFileBackend::new(path, AudioBackendConfig::default());
    let err = backend.start().await.unwrap_err();

    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_playback_recorder_reports_completion_and_writes_wav() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("reply.wav");
    let config = PlaybackConfig { sample_rate: 24000 };

    let mut recorder = WavPlaybackRecorder::new(path.clone(), config);
    let mut completions = recorder.start().await?;

    let buffer = PlaybackBuffer {
        samples: vec![0.5; 2400],
        sample_rate: 24000,
    };
    let start_at = recorder.current_time();
    recorder.schedule(BufferId(3), buffer, start_at)?;

    let finished = tokio::time::timeout(Duration::from_secs(2), completions.recv()).await?;
    assert_eq!(finished, Some(BufferId(3)));
    assert!(recorder.current_time() >= 0.1);

    recorder.close();
    recorder.close();

    let reader = WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 24000);
    let written: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert!(written.len() >= 2400);
    assert_eq!(written.iter().filter(|&&s| s == 16384).count(), 2400);
    Ok(())
}

#[tokio::test]
async fn test_stopped_buffer_never_completes() -> Result<()> {
    let dir = TempDir::new()?;
    let mut recorder = WavPlaybackRecorder::new(dir.path().join("cut.wav"), PlaybackConfig::default());
    let mut completions = recorder.start().await?;

    let buffer = PlaybackBuffer {
        samples: vec![0.5; 4800],
        sample_rate: 24000,
    };
    recorder.schedule(BufferId(0), buffer, 0.0)?;
    recorder.stop(BufferId(0));

    let result = tokio::time::timeout(Duration::from_millis(300), completions.recv()).await;
    assert!(result.is_err(), "Stopped buffers are not reported as finished");

    recorder.close();
    assert!(recorder
        .schedule(
            BufferId(1),
            PlaybackBuffer {
                samples: vec![0.0; 10],
                sample_rate: 24000
            },
            0.0
        )
        .is_err());
    Ok(())
}

#[tokio::test]
async fn test_file_backend_rejects_zero_block_size() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("speech.wav");
    write_wav(&path, 16000, 1, &[0; 160])?;

    let config = AudioBackendConfig {
        block_size: 0,
        ..AudioBackendConfig::default()
    };
    let mut backend = WavFileBackend::new(path, config);
    let err = backend.start().await.unwrap_err();

    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
    assert!(!backend.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_recorder_streams_to_disk_before_close() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("live.wav");

    let mut recorder = WavPlaybackRecorder::new(path.clone(), PlaybackConfig::default());
    let mut completions = recorder.start().await?;
    assert!(path.exists(), "The file is created when the sink opens");

    let buffer = PlaybackBuffer {
        samples: vec![0.25; 7200],
        sample_rate: 24000,
    };
    recorder.schedule(BufferId(0), buffer, 0.0)?;
    let finished = tokio::time::timeout(Duration::from_secs(2), completions.recv()).await?;
    assert_eq!(finished, Some(BufferId(0)));

    // 0.3s of 16-bit audio has outgrown the write buffer
    let on_disk = std::fs::metadata(&path)?.len();
    assert!(on_disk > 8000, "only {} bytes on disk", on_disk);

    recorder.close();
    let reader = WavReader::open(&path)?;
    assert!(reader.len() >= 7200);
    Ok(())
}

#[tokio::test]
async fn test_recorder_unwritable_path_is_unavailable() {
    let mut recorder = WavPlaybackRecorder::new(
        "/nonexistent/dir/reply.wav".into(),
        PlaybackConfig::default(),
    );

    let err = recorder.start().await.unwrap_err();

    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
    assert!(recorder
        .schedule(
            BufferId(0),
            PlaybackBuffer {
                samples: vec![0.0; 10],
                sample_rate: 24000
            },
            0.0
        )
        .is_err());
}
