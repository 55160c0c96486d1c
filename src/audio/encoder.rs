//! # PCM Encoding
//!
//! Converts floating-point capture samples to 16-bit signed PCM and back,
//! and handles the little-endian byte layout used on the wire. Everything
//! the transport carries in either direction passes through this module.
//!
//! ## Conversion Rules:
//! - **Encode**: clamp to [-1.0, 1.0], scale negatives by 32768 and
//!   non-negatives by 32767, truncate toward zero
//! - **Decode**: divide by 32768 to return to the float range
//! - **Bytes**: 16-bit little-endian, two bytes per sample, no header

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Encode floating-point samples as 16-bit signed PCM.
///
/// Out-of-range input is clamped silently; analog capture routinely clips
/// and that is not an error. The scaling is asymmetric so that the full
/// signed range is used exactly: -1.0 maps to -32768 and 1.0 maps to 32767.
pub fn encode_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// Convert 16-bit PCM samples to floats in [-1.0, 1.0) for rendering.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Serialize samples as little-endian bytes for a binary transport frame.
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Writing to a Vec cannot fail
        bytes.write_i16::<LittleEndian>(sample).expect("write to Vec");
    }
    bytes
}

/// Parse little-endian PCM16 bytes back into samples.
///
/// ## Error Handling:
/// An odd byte count means a truncated sample and is rejected rather than
/// silently dropping the trailing byte.
pub fn from_le_bytes(data: &[u8]) -> Result<Vec<i16>, String> {
    if data.len() % 2 != 0 {
        return Err("PCM16 data length must be even".to_string());
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    Ok(samples)
}
