//! Telephony frame assembly
//!
//! The provider takes exactly 20 ms frames: 160 mu-law bytes, which is 320
//! bytes of 8 kHz PCM16. TTS chunks arrive in arbitrary sizes, so complete
//! frames are peeled off the head of a chunk list. Concatenating the whole
//! stream into one growing buffer per chunk is quadratic in stream length
//! and visibly stalls long responses.

use std::collections::VecDeque;

use bytes::Bytes;

/// PCM16 bytes per 20 ms frame at 8 kHz.
pub const FRAME_PCM_BYTES: usize = 320;

/// Reassembles streamed PCM16 into fixed 320-byte frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    chunks: VecDeque<Bytes>,
    buffered: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Pop one complete frame, allocating exactly the frame itself.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buffered < FRAME_PCM_BYTES {
            return None;
        }
        let mut frame = Vec::with_capacity(FRAME_PCM_BYTES);
        while frame.len() < FRAME_PCM_BYTES {
            let mut head = self.chunks.pop_front().expect("buffered bytes imply chunks");
            let need = FRAME_PCM_BYTES - frame.len();
            if head.len() > need {
                frame.extend_from_slice(&head.split_to(need));
                self.chunks.push_front(head);
            } else {
                frame.extend_from_slice(&head);
            }
        }
        self.buffered -= FRAME_PCM_BYTES;
        Some(frame)
    }

    /// Drain whatever is left (less than one frame) at stream end.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        let mut rest = Vec::with_capacity(self.buffered);
        for chunk in self.chunks.drain(..) {
            rest.extend_from_slice(&chunk);
        }
        self.buffered = 0;
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_frame_until_enough_bytes() {
        let mut buffer = FrameBuffer::new();
        buffer.push(Bytes::from(vec![0u8; 319]));
        assert!(buffer.next_frame().is_none());
        buffer.push(Bytes::from(vec![1u8; 1]));
        let frame = buffer.next_frame().unwrap();
        assert_eq!(frame.len(), FRAME_PCM_BYTES);
        assert_eq!(frame[319], 1);
    }

    #[test]
    fn test_large_chunk_yields_multiple_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.push(Bytes::from(vec![7u8; FRAME_PCM_BYTES * 3 + 10]));
        assert!(buffer.next_frame().is_some());
        assert!(buffer.next_frame().is_some());
        assert!(buffer.next_frame().is_some());
        assert!(buffer.next_frame().is_none());
        assert_eq!(buffer.take_remainder().len(), 10);
    }

    #[test]
    fn test_frames_preserve_byte_order_across_chunks() {
        let mut buffer = FrameBuffer::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(FRAME_PCM_BYTES * 2).collect();
        // Feed in ragged pieces.
        for piece in data.chunks(77) {
            buffer.push(Bytes::copy_from_slice(piece));
        }
        let mut out = Vec::new();
        while let Some(frame) = buffer.next_frame() {
            out.extend_from_slice(&frame);
        }
        out.extend_from_slice(&buffer.take_remainder());
        assert_eq!(out, data);
    }

    #[test]
    fn test_remainder_empty_after_exact_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.push(Bytes::from(vec![3u8; FRAME_PCM_BYTES]));
        buffer.next_frame().unwrap();
        assert!(buffer.take_remainder().is_empty());
    }
}
