//! Core types for the voice orchestrator
//!
//! This crate provides the per-call session state, the process-wide call
//! registry, the assistant configuration snapshot and transcript types.
//! Everything here is shared by the pipeline and the adapter crates.

pub mod assistant;
pub mod registry;
pub mod session;
pub mod transcript;

pub use assistant::{
    AssistantConfig, CustomToolConfig, ParamSpec, QueryParamSpec, ResponseAssignment,
    TransferAgentRule, TransferNumberRule, TransferType, TwilioCredentials,
};
pub use registry::CallRegistry;
pub use session::{CallSession, CallStatus, EndReason};
pub use transcript::{SpeakerRole, TranscriptEntry};
