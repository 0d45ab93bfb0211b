//! G.711 mu-law codec
//!
//! Decode uses a 256-entry table built per ITU-T G.711 section 4.4.1.
//! Encode finds the segment by scanning for the highest set bit of the
//! biased magnitude; a log2-based shortcut flips signs for a large share
//! of inputs and must not be used here.

use once_cell::sync::Lazy;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Segment base values from the G.711 decode recursion.
const EXP_LUT: [i32; 8] = [0, 132, 396, 924, 1980, 4092, 8316, 16764];

/// Full 256-entry mu-law byte to linear sample table.
static DECODE_TABLE: Lazy<[i16; 256]> = Lazy::new(|| {
    let mut table = [0i16; 256];
    for (byte, slot) in table.iter_mut().enumerate() {
        let u = !(byte as u8);
        let exponent = ((u >> 4) & 0x07) as usize;
        let mantissa = (u & 0x0F) as i32;
        let magnitude = EXP_LUT[exponent] + (mantissa << (exponent + 3));
        *slot = if u & 0x80 != 0 {
            -magnitude as i16
        } else {
            magnitude as i16
        };
    }
    table
});

/// Decode a single mu-law byte to a linear PCM16 sample.
#[inline]
pub fn ulaw_byte_to_linear(byte: u8) -> i16 {
    DECODE_TABLE[byte as usize]
}

/// Encode a linear PCM16 sample to a mu-law byte.
#[inline]
pub fn linear_to_ulaw_byte(sample: i16) -> u8 {
    let mut s = sample as i32;
    let sign: u8 = if s < 0 {
        s = -s;
        0x80
    } else {
        0
    };
    if s > CLIP {
        s = CLIP;
    }
    s += BIAS;

    // Scan down from bit 14 for the segment of the biased magnitude.
    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (s & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((s >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode 8 kHz mu-law bytes to PCM16 at 16 kHz.
///
/// Upsampling emits each decoded sample followed by the arithmetic mean
/// of it and its successor; the final sample is duplicated. Output is
/// little-endian and exactly four times the input length in bytes.
pub fn ulaw_to_pcm16_16k(ulaw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ulaw.len() * 4);
    for (i, &byte) in ulaw.iter().enumerate() {
        let current = ulaw_byte_to_linear(byte);
        let next = match ulaw.get(i + 1) {
            Some(&b) => ulaw_byte_to_linear(b),
            None => current,
        };
        let mid = ((current as i32 + next as i32) / 2) as i16;
        out.extend_from_slice(&current.to_le_bytes());
        out.extend_from_slice(&mid.to_le_bytes());
    }
    out
}

/// Encode little-endian PCM16 at 8 kHz to mu-law bytes.
///
/// The GPU service resamples synthesis output to 8 kHz before streaming,
/// so this function never decimates. An odd trailing byte is dropped.
pub fn pcm16_8k_to_ulaw(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(2)
        .map(|c| linear_to_ulaw_byte(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_table_extremes() {
        // 0x7F is negative zero, 0xFF is positive zero.
        assert_eq!(ulaw_byte_to_linear(0xFF), 0);
        assert_eq!(ulaw_byte_to_linear(0x7F), 0);
        // 0x00 is full-scale negative, 0x80 full-scale positive.
        assert_eq!(ulaw_byte_to_linear(0x00), -32124);
        assert_eq!(ulaw_byte_to_linear(0x80), 32124);
    }

    #[test]
    fn test_roundtrip_preserves_sign() {
        for &s in &[32635i16, 16000, 5000, 1000, 100, -100, -1000, -5000, -16000, -32635] {
            let decoded = ulaw_byte_to_linear(linear_to_ulaw_byte(s));
            assert_eq!(
                decoded.signum(),
                s.signum(),
                "sign flipped for {s}: decoded {decoded}"
            );
        }
    }

    #[test]
    fn test_roundtrip_quantization_error() {
        // At amplitude 5000 (the typical speech level on a phone line)
        // the worst-case error is one half quantization step, about 2.3%.
        for &s in &[5000i16, -5000, 5100, -4900] {
            let decoded = ulaw_byte_to_linear(linear_to_ulaw_byte(s)) as f64;
            let err = (decoded - s as f64).abs() / (s as f64).abs();
            assert!(err <= 0.0233, "error {err} too large for {s}");
        }
        // Across the full range the absolute error stays within the
        // widest segment step.
        for s in (-32635i16..=32635).step_by(97) {
            let decoded = ulaw_byte_to_linear(linear_to_ulaw_byte(s)) as i32;
            assert!((decoded - s as i32).abs() <= 1024, "sample {s} decoded {decoded}");
        }
    }

    #[test]
    fn test_upsample_doubles_length() {
        let ulaw = [0xFFu8; 160];
        let pcm = ulaw_to_pcm16_16k(&ulaw);
        assert_eq!(pcm.len(), 160 * 2 * 2);
    }

    #[test]
    fn test_upsample_interpolates_midpoints() {
        // Two known-decodable bytes; the second output sample must be the
        // mean of the neighbors and the final one a duplicate.
        let a = ulaw_byte_to_linear(0x9A);
        let b = ulaw_byte_to_linear(0xA4);
        let pcm = ulaw_to_pcm16_16k(&[0x9A, 0xA4]);
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(samples, vec![a, ((a as i32 + b as i32) / 2) as i16, b, b]);
    }

    #[test]
    fn test_encode_no_decimation() {
        let pcm: Vec<u8> = (0..320i16).flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(pcm16_8k_to_ulaw(&pcm).len(), 320);
    }
}
