//! Context summarization
//!
//! Long calls blow past the realtime session's useful context. When the
//! running transcript passes the word threshold, an out-of-band chat
//! completion condenses it; the summary is injected as a system item and
//! the original items are deleted remotely.

use serde_json::{json, Value};

use voicebridge_core::{SpeakerRole, TranscriptEntry};

/// Transcript size that triggers a summarization pass.
pub const SUMMARIZE_THRESHOLD_WORDS: usize = 1_500;

/// Settings for the out-of-band chat completion endpoint.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Render the transcript for the summarizer prompt.
pub fn render_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|entry| {
            let speaker = match entry.role {
                SpeakerRole::User => "Caller",
                SpeakerRole::Assistant => "Assistant",
                SpeakerRole::System => "System",
            };
            format!("{speaker}: {}", entry.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produce a 2-4 sentence summary of the conversation so far. Returns
/// `None` on any failure; the caller keeps the full context in that case.
pub async fn summarize(
    http: &reqwest::Client,
    config: &SummarizerConfig,
    transcript: &[TranscriptEntry],
) -> Option<String> {
    let rendered = render_transcript(transcript);
    let body = json!({
        "model": config.model,
        "messages": [
            {
                "role": "system",
                "content": "Summarize this phone conversation in 2-4 sentences. \
                            Keep every fact the assistant still needs: names, numbers, \
                            requests, decisions and anything promised to the caller.",
            },
            { "role": "user", "content": rendered },
        ],
        "max_tokens": 200,
    });

    let response = http
        .post(&config.url)
        .bearer_auth(&config.api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| tracing::warn!("Summarization request failed: {e}"))
        .ok()?;

    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), "Summarization returned an error");
        return None;
    }

    let value: Value = response
        .json()
        .await
        .map_err(|e| tracing::warn!("Summarization response unreadable: {e}"))
        .ok()?;
    let summary = value["choices"][0]["message"]["content"].as_str()?.trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_transcript_labels_speakers() {
        let transcript = vec![
            TranscriptEntry::new(SpeakerRole::User, "what are your hours", 1.0),
            TranscriptEntry::new(SpeakerRole::Assistant, "We are open 9 to 5.", 2.5),
        ];
        let rendered = render_transcript(&transcript);
        assert_eq!(rendered, "Caller: what are your hours\nAssistant: We are open 9 to 5.");
    }
}
