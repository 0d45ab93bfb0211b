//! Audio conversions for the telephony path
//!
//! Pure, stateless conversions over byte buffers:
//! - G.711 mu-law decode (8 kHz) to PCM16 at 16 kHz for the GPU service
//! - PCM16 at 8 kHz to mu-law for the provider stream
//! - WAV framing for inference requests
//! - silence detection for batch gating

pub mod mulaw;
pub mod wav;

pub use mulaw::{pcm16_8k_to_ulaw, ulaw_to_pcm16_16k};
pub use wav::{pcm16_to_wav_base64, wav_base64_to_pcm16};

/// Peak threshold below which a buffer counts as silence.
///
/// Telephony lines carry a constant low-level noise floor; 20 is above
/// that floor and well below the quietest intelligible speech.
const SILENCE_THRESHOLD: i16 = 20;

/// True iff every 16-bit sample in the buffer is at or below the silence
/// threshold in absolute value.
///
/// Expects little-endian PCM16. An odd trailing byte is ignored.
pub fn is_silence(buf: &[u8]) -> bool {
    buf.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .all(|s| s.unsigned_abs() <= SILENCE_THRESHOLD as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_silence_detection() {
        assert!(is_silence(&pcm(&[0, 5, -20, 20, 19])));
        assert!(!is_silence(&pcm(&[0, 5, -21])));
        assert!(!is_silence(&pcm(&[5000; 160])));
    }

    #[test]
    fn test_empty_buffer_is_silent() {
        assert!(is_silence(&[]));
    }

    #[test]
    fn test_extreme_negative_sample() {
        assert!(!is_silence(&pcm(&[i16::MIN])));
    }
}
