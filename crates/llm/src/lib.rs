//! Realtime LLM session client
//!
//! One long-lived WebSocket per call. The session is configured once after
//! the handshake (text modality only; this system does its own TTS), then
//! exchanges conversation items and streamed response events with the
//! pipeline over an mpsc channel.
//!
//! The remote may interleave argument deltas for several tool calls inside
//! a single response, so in-progress arguments are accumulated in a map
//! keyed by `call_id`. A single pending slot would drop all but the last
//! call and leave the model waiting forever for the missing outputs.

mod client;
mod events;
mod protocol;

pub use client::{RealtimeConfig, RealtimeSession, SessionSetup};
pub use events::LlmEvent;

use thiserror::Error;

/// LLM session errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("socket closed")]
    Closed,
}
