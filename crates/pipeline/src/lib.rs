//! Real-time call pipeline
//!
//! The heart of the orchestrator. Per call it ingests 20 ms telephony
//! frames, batches them for VAD, runs the turn-taking state machine
//! (pre-roll, interrupts, smart-turn confirmation, minimum-speech gating),
//! feeds confirmed turns to the LLM, streams sentence-chunked synthesis
//! back over the provider socket and funnels every terminal path through
//! one idempotent cleanup routine.
//!
//! Errors are absorbed here: a failed VAD call costs one batch, a failed
//! STT call costs one turn, a failed TTS stream truncates one sentence.
//! Nothing per-call propagates to the process root.

mod driver;
mod framing;
mod messages;
mod sentence;
mod speech;
mod summarize;
mod turn;

pub use driver::{CallPipeline, PipelineConfig};
pub use messages::PipelineMsg;
pub use summarize::SummarizerConfig;
