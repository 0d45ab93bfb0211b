//! Wire types for the GPU service

use serde::Deserialize;

/// Per-batch VAD classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadEvent {
    SpeechStart,
    Silence,
    SpeechEnd,
}

/// Reply from `/vad/detect`. The server keeps per-session state keyed by
/// `session_id`, so replies reflect the whole utterance, not one batch.
#[derive(Debug, Clone, Deserialize)]
pub struct VadReply {
    pub event: VadEvent,
    pub probability: f32,
}

/// Reply from `/turn/check`: has the speaker truly finished?
#[derive(Debug, Clone, Deserialize)]
pub struct TurnCheck {
    pub complete: bool,
    pub confidence: f32,
}

/// Reply from `/stt/transcribe`.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub processing_time_ms: u64,
}

/// Reply from `/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct GpuHealth {
    pub status: String,
    #[serde(default)]
    pub models_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vad_reply_parses_snake_case_events() {
        let reply: VadReply =
            serde_json::from_str(r#"{"event":"speech_start","probability":0.92}"#).unwrap();
        assert_eq!(reply.event, VadEvent::SpeechStart);
        assert!((reply.probability - 0.92).abs() < f32::EPSILON);

        let reply: VadReply =
            serde_json::from_str(r#"{"event":"speech_end","probability":0.1,"frames":12}"#)
                .unwrap();
        assert_eq!(reply.event, VadEvent::SpeechEnd);
    }

    #[test]
    fn test_transcription_defaults() {
        let t: Transcription = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(t.text, "hello");
        assert_eq!(t.language, None);
        assert_eq!(t.processing_time_ms, 0);
    }
}
