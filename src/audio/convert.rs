//! Conversion of little-endian wire samples to `f32`

use crate::protocol::SampleEncoding;

/// Append the samples in `bytes` to `out` as normalized `f32`
///
/// Trailing bytes that do not form a whole sample are ignored. Packed
/// encodings produce nothing.
pub fn extend_f32(encoding: SampleEncoding, bytes: &[u8], out: &mut Vec<f32>) {
    let Some(width) = encoding.bytes_per_sample() else {
        return;
    };
    out.reserve(bytes.len() / width);

    let samples = bytes.chunks_exact(width);
    match encoding {
        SampleEncoding::U8 => out.extend(samples.map(|s| (s[0] as f32 - 128.0) / 128.0)),
        SampleEncoding::I16 => out.extend(
            samples.map(|s| i16::from_le_bytes([s[0], s[1]]) as f32 / 32_768.0),
        ),
        SampleEncoding::I24 => out.extend(samples.map(|s| {
            // Place the 24 bits in the top of an i32 to sign-extend
            let v = i32::from_le_bytes([0, s[0], s[1], s[2]]) >> 8;
            v as f32 / 8_388_608.0
        })),
        SampleEncoding::I32 => out.extend(
            samples.map(|s| i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0),
        ),
        SampleEncoding::F32 => {
            out.extend(samples.map(|s| f32::from_le_bytes([s[0], s[1], s[2], s[3]])))
        }
        SampleEncoding::F64 => out.extend(samples.map(|s| {
            f64::from_le_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]]) as f32
        })),
        SampleEncoding::Bits12 | SampleEncoding::Bits10 => {}
    }
}
