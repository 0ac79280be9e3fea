//! PCM16 little-endian codec for the live service's base64 audio payloads.

use base64::Engine;

use super::playback::PlaybackBuffer;
use crate::error::{VoiceError, VoiceResult};
use crate::live::MediaBlob;

/// MIME type declaring raw PCM16 mono at `sample_rate`
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Convert one float sample in [-1.0, 1.0] to a signed 16-bit sample.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encode a captured block as a base64 PCM16 blob.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> MediaBlob {
    let pcm_bytes: Vec<u8> = samples
        .iter()
        .flat_map(|&s| f32_to_i16(s).to_le_bytes())
        .collect();

    MediaBlob {
        mime_type: pcm_mime_type(sample_rate),
        data: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
    }
}

/// Decode a base64 PCM16 chunk into a playable buffer.
///
/// Malformed base64, an odd byte count, or an empty payload are rejected.
pub fn decode_chunk(data: &str, sample_rate: u32) -> VoiceResult<PlaybackBuffer> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| VoiceError::DecodeFailed(format!("invalid base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(VoiceError::DecodeFailed("empty audio chunk".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::DecodeFailed(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect();

    Ok(PlaybackBuffer {
        samples,
        sample_rate,
    })
}
