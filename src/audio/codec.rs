//! PCM16 little-endian and base64 transforms for the wire

use crate::{ReadalongError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Float samples to PCM16 LE bytes
///
/// Samples are clamped to [-1, 1]. The negative half scales by 32768 and the
/// positive half by 32767 so both ends of the i16 range are reachable.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
        let value = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// PCM16 LE bytes to float samples; a trailing odd byte is dropped
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| ReadalongError::ProtocolError(format!("Invalid base64 audio: {}", e)))
}

/// Microphone frame to the text carried by `input_audio_buffer.append`
pub fn encode_frame(samples: &[f32]) -> String {
    encode_base64(&encode_pcm16(samples))
}

/// Text of an audio delta to float samples
pub fn decode_frame(text: &str) -> Result<Vec<f32>> {
    Ok(decode_pcm16(&decode_base64(text)?))
}
