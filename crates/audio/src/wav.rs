//! WAV framing for inference requests
//!
//! The GPU service accepts and returns base64 WAV. Parsing walks the RIFF
//! chunk list instead of assuming the data chunk sits at offset 44; senders
//! in the wild insert LIST and fact chunks before it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

const HEADER_LEN: usize = 44;

/// Wrap little-endian PCM16 in a canonical 44-byte mono WAV header and
/// base64-encode the result.
pub fn pcm16_to_wav_base64(pcm: &[u8], sample_rate: u32) -> String {
    let mut wav = Vec::with_capacity(HEADER_LEN + pcm.len());
    let byte_rate = sample_rate * 2;

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    wav.extend_from_slice(pcm);

    BASE64.encode(wav)
}

/// Extract PCM16 from base64 WAV.
///
/// If RIFF magic is present, the chunk list is walked (respecting even-byte
/// padding) to find `data`. A malformed chunk list falls back to offset 44,
/// which keeps a wide range of sloppy senders working. Anything without the
/// magic is returned as raw bytes. Invalid base64 yields an empty buffer.
pub fn wav_base64_to_pcm16(encoded: &str) -> Vec<u8> {
    let bytes = match BASE64.decode(encoded.trim()) {
        Ok(b) => b,
        Err(_) => return Vec::new(),
    };

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return bytes;
    }

    match find_data_chunk(&bytes) {
        Some(range) => bytes[range].to_vec(),
        None if bytes.len() > HEADER_LEN => bytes[HEADER_LEN..].to_vec(),
        None => Vec::new(),
    }
}

fn find_data_chunk(bytes: &[u8]) -> Option<std::ops::Range<usize>> {
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let body = pos + 8;
        if id == b"data" {
            let end = (body + size).min(bytes.len());
            return Some(body..end);
        }
        // Chunk bodies are padded to an even length.
        pos = body + size + (size & 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let pcm: Vec<u8> = (0..320i16).flat_map(|s| s.to_le_bytes()).collect();
        let encoded = pcm16_to_wav_base64(&pcm, 16000);
        assert_eq!(wav_base64_to_pcm16(&encoded), pcm);
    }

    #[test]
    fn test_header_fields() {
        let encoded = pcm16_to_wav_base64(&[0u8; 4], 8000);
        let wav = BASE64.decode(encoded).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 8000);
        // byte rate = rate * channels * 2
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 16000);
        assert_eq!(wav.len(), 48);
    }

    #[test]
    fn test_data_chunk_after_list_chunk() {
        // RIFF file with an odd-sized LIST chunk before data; the walker
        // must respect the pad byte.
        let pcm = [1u8, 0, 2, 0];
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&3u32.to_le_bytes());
        wav.extend_from_slice(&[b'x', b'y', b'z', 0]); // body + pad
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        wav.extend_from_slice(&pcm);

        assert_eq!(wav_base64_to_pcm16(&BASE64.encode(&wav)), pcm);
    }

    #[test]
    fn test_malformed_wav_falls_back_to_offset_44() {
        // RIFF magic but a garbage chunk list longer than a header.
        let mut wav = vec![0u8; 50];
        wav[0..4].copy_from_slice(b"RIFF");
        wav[8..12].copy_from_slice(b"WAVE");
        wav[12..16].copy_from_slice(b"junk");
        wav[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        let out = wav_base64_to_pcm16(&BASE64.encode(&wav));
        assert_eq!(out, &wav[44..]);
    }

    #[test]
    fn test_raw_bytes_pass_through() {
        let raw = [9u8, 8, 7, 6];
        assert_eq!(wav_base64_to_pcm16(&BASE64.encode(raw)), raw);
    }
}
