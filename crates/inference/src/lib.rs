//! GPU inference service client
//!
//! Typed HTTP client for the remote VAD, smart-turn, STT and streaming TTS
//! endpoints. Every endpoint carries its own timeout; VAD sits on the hot
//! audio path and has to fail fast, while STT may legitimately take many
//! seconds on a long utterance. A single shared timeout would either stall
//! turn detection or kill valid transcriptions.

mod client;
mod types;

pub use client::{InferenceClient, InferenceConfig};
pub use types::{GpuHealth, Transcription, TurnCheck, VadEvent, VadReply};

use thiserror::Error;

/// Inference client errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
