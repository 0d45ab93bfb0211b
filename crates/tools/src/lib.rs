//! Tool engine
//!
//! Builds the tool list the LLM sees from the per-call assistant
//! configuration and dispatches invocations. Built-in tools steer the call
//! (hangup, transfers, language switch, voicemail); custom tools are
//! generic HTTP requests whose responses can feed per-call variables.
//!
//! Failures surface as `{success:false}` replies to the model, never as
//! orchestrator errors: a bad tool call must not take the call down.

mod custom;
mod engine;
mod schema;

pub use engine::{ToolEngine, ToolEvent, ToolOutcome};
pub use schema::build_tool_definitions;
