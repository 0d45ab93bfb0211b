//! Events surfaced to the pipeline

use serde_json::Value;

/// What the LLM session reports back to the call pipeline.
#[derive(Debug, Clone)]
pub enum LlmEvent {
    /// One streamed output token.
    TextDelta(String),
    /// The full text of the finished output item.
    TextDone(String),
    /// A response started; carries the response identifier.
    ResponseCreated(String),
    /// The response finished; carries the raw response object.
    ResponseDone(Value),
    /// Argument streaming for one tool call completed.
    FunctionCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    /// A conversation item was created remotely (summarization bookkeeping).
    ItemCreated { id: String, role: String },
    /// Protocol or transport error; the message it concerns was dropped.
    Error(String),
    /// The socket closed; no further events follow.
    Closed,
}
