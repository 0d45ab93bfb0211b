//! GPU service HTTP client

use std::time::Duration;

use serde_json::json;

use crate::types::{GpuHealth, Transcription, TurnCheck, VadReply};
use crate::InferenceError;

const API_KEY_HEADER: &str = "X-API-Key";

/// Connection settings for the GPU service.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub vad_timeout: Duration,
    pub turn_timeout: Duration,
    pub stt_timeout: Duration,
    pub tts_connect_timeout: Duration,
    pub control_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            api_key: String::new(),
            vad_timeout: Duration::from_secs(2),
            turn_timeout: Duration::from_secs(5),
            stt_timeout: Duration::from_secs(20),
            tts_connect_timeout: Duration::from_secs(15),
            control_timeout: Duration::from_secs(5),
        }
    }
}

/// Process-global, stateless client. One underlying `reqwest::Client` per
/// timeout class; the TTS client carries only a connect timeout because the
/// body is an open-ended stream whose liveness the consumer enforces
/// per chunk.
#[derive(Clone)]
pub struct InferenceClient {
    config: InferenceConfig,
    vad: reqwest::Client,
    turn: reqwest::Client,
    stt: reqwest::Client,
    tts: reqwest::Client,
    control: reqwest::Client,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let build = |timeout: Option<Duration>, connect: Duration| {
            let mut builder = reqwest::Client::builder().connect_timeout(connect);
            if let Some(t) = timeout {
                builder = builder.timeout(t);
            }
            builder.build()
        };
        Ok(Self {
            vad: build(Some(config.vad_timeout), config.vad_timeout)?,
            turn: build(Some(config.turn_timeout), config.turn_timeout)?,
            stt: build(Some(config.stt_timeout), Duration::from_secs(5))?,
            tts: build(None, config.tts_connect_timeout)?,
            control: build(Some(config.control_timeout), config.control_timeout)?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Classify one 200 ms batch. Server-side state is keyed by
    /// `session_id`; the caller must serialize requests per session.
    pub async fn detect_vad(
        &self,
        wav_b64: &str,
        session_id: &str,
    ) -> Result<VadReply, InferenceError> {
        let response = self
            .vad
            .post(self.url("/vad/detect"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&json!({
                "audio": wav_b64,
                "sample_rate": 16000,
                "session_id": session_id,
            }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Ask whether a captured utterance is a finished turn.
    pub async fn check_turn(&self, wav_b64: &str) -> Result<TurnCheck, InferenceError> {
        let response = self
            .turn
            .post(self.url("/turn/check"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&json!({ "audio": wav_b64 }))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn transcribe(
        &self,
        wav_b64: &str,
        language: &str,
    ) -> Result<Transcription, InferenceError> {
        let response = self
            .stt
            .post(self.url("/stt/transcribe"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&json!({
                "audio": wav_b64,
                "language": language,
                "sample_rate": 16000,
            }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Open a streaming synthesis request. The returned response yields
    /// raw 8 kHz PCM16 chunks; callers own the per-chunk idle timeout and
    /// drop the response to abort the stream.
    pub async fn synthesize_stream(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
    ) -> Result<reqwest::Response, InferenceError> {
        let mut body = json!({
            "text": text,
            "language": language,
            "streaming": true,
        });
        if let Some(voice) = voice {
            body["voice"] = json!(voice);
        }
        let response = self
            .tts
            .post(self.url("/tts/synthesize"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Clear server-side VAD state for a session. Best effort; a failed
    /// reset only means the next call with the same id starts dirty.
    pub async fn reset_vad(&self, session_id: &str) -> Result<(), InferenceError> {
        let response = self
            .control
            .post(self.url(&format!("/vad/reset?session_id={session_id}")))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub async fn health(&self) -> Result<GpuHealth, InferenceError> {
        let response = self
            .control
            .get(self.url("/health"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, InferenceError> {
        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts_match_endpoint_classes() {
        let config = InferenceConfig::default();
        assert_eq!(config.vad_timeout, Duration::from_secs(2));
        assert_eq!(config.turn_timeout, Duration::from_secs(5));
        assert_eq!(config.stt_timeout, Duration::from_secs(20));
        assert_eq!(config.tts_connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_url_join_handles_trailing_slash() {
        let client = InferenceClient::new(InferenceConfig {
            base_url: "http://gpu:8001/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url("/vad/detect"), "http://gpu:8001/vad/detect");
    }
}
