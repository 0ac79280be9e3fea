// Tests for the PCM16/base64 codec used on the live socket

use base64::Engine;
use curelink_voice::audio::pcm::{decode_chunk, encode_frame, f32_to_i16, i16_to_f32, pcm_mime_type};
use curelink_voice::error::VoiceError;

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[test]
fn test_mime_type_declares_rate() {
    assert_eq!(pcm_mime_type(16000), "audio/pcm;rate=16000");
    assert_eq!(pcm_mime_type(24000), "audio/pcm;rate=24000");
}

#[test]
fn test_f32_to_i16_scales_and_clamps() {
    assert_eq!(f32_to_i16(0.0), 0);
    assert_eq!(f32_to_i16(0.5), 16384);
    assert_eq!(f32_to_i16(-1.0), i16::MIN);
    assert_eq!(f32_to_i16(1.0), i16::MAX, "Full scale clamps to the maximum");
    assert_eq!(f32_to_i16(3.0), i16::MAX);
    assert_eq!(f32_to_i16(-3.0), i16::MIN);
}

#[test]
fn test_i16_to_f32_divides_by_full_scale() {
    assert_eq!(i16_to_f32(0), 0.0);
    assert_eq!(i16_to_f32(16384), 0.5);
    assert_eq!(i16_to_f32(i16::MIN), -1.0);
}

#[test]
fn test_encode_frame_is_little_endian_pcm16() {
    let blob = encode_frame(&[0.5, -0.5, 1.0], 16000);

    assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
    // 16384 = 0x4000, -16384 = 0xC000, 32767 = 0x7FFF
    assert_eq!(blob.data, b64(&[0x00, 0x40, 0x00, 0xC0, 0xFF, 0x7F]));
}

#[test]
fn test_decode_chunk_produces_samples_at_output_rate() {
    let data = b64(&[0x00, 0x40, 0x00, 0xC0]);

    let buffer = decode_chunk(&data, 24000).unwrap();

    assert_eq!(buffer.samples, vec![0.5, -0.5]);
    assert_eq!(buffer.sample_rate, 24000);
}

#[test]
fn test_decoded_duration_matches_sample_count() {
    let data = b64(&vec![0u8; 24000 * 2]);

    let buffer = decode_chunk(&data, 24000).unwrap();

    assert_eq!(buffer.duration(), 1.0);
}

#[test]
fn test_decode_rejects_invalid_base64() {
    let err = decode_chunk("%%% not base64 %%%", 24000).unwrap_err();
    assert!(matches!(err, VoiceError::DecodeFailed(_)));
}

#[test]
fn test_decode_rejects_odd_length_payload() {
    let err = decode_chunk(&b64(&[1, 2, 3]), 24000).unwrap_err();
    assert!(matches!(err, VoiceError::DecodeFailed(_)));
}

#[test]
fn test_decode_rejects_empty_payload() {
    let err = decode_chunk("", 24000).unwrap_err();
    assert!(matches!(err, VoiceError::DecodeFailed(_)));
}
