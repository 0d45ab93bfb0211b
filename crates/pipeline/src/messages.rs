//! Per-call inbox
//!
//! Every call runs one pipeline task with a single mpsc inbox; all
//! handlers are serialized by that task, so the turn state needs no
//! internal locking beyond what concurrent observers (speaker, timers)
//! read. Spawned I/O reports back here instead of mutating state directly.

use voicebridge_core::EndReason;
use voicebridge_inference::{Transcription, TurnCheck, VadReply};
use voicebridge_llm::{LlmError, LlmEvent, RealtimeSession};
use voicebridge_telephony::StreamEvent;
use voicebridge_tools::ToolOutcome;

/// One message on the per-call inbox.
pub enum PipelineMsg {
    /// LLM connect finished (or failed) during call setup.
    Init(Result<RealtimeSession, LlmError>),
    /// Frame from the telephony WebSocket.
    Stream(StreamEvent),
    /// Event from the LLM session.
    Llm(LlmEvent),
    /// VAD reply for a batch; `None` means the request failed and the
    /// batch is dropped.
    VadResult {
        batch: Vec<u8>,
        reply: Option<VadReply>,
    },
    /// Parallel smart-turn + STT finished for a flushed turn.
    TurnResult {
        audio: Vec<u8>,
        check: Option<TurnCheck>,
        stt: Option<Transcription>,
    },
    /// Standalone transcription finished (force-flush or STT retry).
    SttResult { text: Option<String> },
    /// A tool invocation finished.
    ToolResult {
        call_id: String,
        outcome: ToolOutcome,
    },
    /// Out-of-band summarization finished.
    SummaryResult { summary: Option<String> },
    /// A synthesis task ended without sending audio; no mark will echo.
    SynthesisIdle,
    /// The silence hangup timer fired.
    SilenceTimeout,
    /// The max-call-duration timer fired.
    MaxDuration,
    /// Ask the pipeline to wind the call down.
    EndCall(EndReason),
}
