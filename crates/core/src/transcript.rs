//! Running call transcript

use serde::{Deserialize, Serialize};

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Assistant,
    System,
}

/// One line of the running transcript.
///
/// Field names match the completion payload the configuration service
/// expects, so the transcript serializes directly into the terminal report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: SpeakerRole,
    pub message: String,
    pub time_in_call_secs: f64,
}

impl TranscriptEntry {
    pub fn new(role: SpeakerRole, message: impl Into<String>, time_in_call_secs: f64) -> Self {
        Self {
            role,
            message: message.into(),
            time_in_call_secs,
        }
    }

    /// Number of whitespace-separated words in this entry.
    pub fn word_count(&self) -> usize {
        self.message.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_for_completion_payload() {
        let entry = TranscriptEntry::new(SpeakerRole::User, "what are your hours", 12.5);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["message"], "what are your hours");
        assert_eq!(json["time_in_call_secs"], 12.5);
    }

    #[test]
    fn test_word_count() {
        let entry = TranscriptEntry::new(SpeakerRole::Assistant, "We are open 9 to 5.", 3.0);
        assert_eq!(entry.word_count(), 6);
    }
}
