//! Configuration service client
//!
//! The orchestrator keeps no call state of its own; per-call configuration
//! comes from this internal service at call setup and the terminal report
//! goes back to it at teardown. Requests carry a shared secret header;
//! this is the only authorization on internal calls.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use voicebridge_core::{AssistantConfig, TranscriptEntry};

const SECRET_HEADER: &str = "X-Internal-Secret";

/// Platform client errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Reply to the incoming-call notification. A missing `assistant_id`
/// means nobody answers this number; the adapter responds with the fixed
/// error TwiML and never creates a session.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingCallReply {
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
}

/// Reply to the transfer-agent lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferAgentReply {
    pub twiml_url: String,
}

/// Terminal report posted once per call from the cleanup routine.
#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub call_sid: String,
    pub assistant_id: String,
    pub organization_id: String,
    pub end_reason: String,
    pub duration_seconds: f64,
    pub transcript: Vec<TranscriptEntry>,
    pub dynamic_variables: std::collections::HashMap<String, String>,
}

/// Process-global, stateless client.
#[derive(Clone)]
pub struct PlatformClient {
    base_url: String,
    secret: String,
    client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            secret: secret.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Announce an incoming call and learn which assistant answers it.
    pub async fn notify_incoming(
        &self,
        call_sid: &str,
        from: &str,
        to: &str,
    ) -> Result<IncomingCallReply, PlatformError> {
        let response = self
            .client
            .post(self.url("/calls/incoming"))
            .header(SECRET_HEADER, &self.secret)
            .json(&json!({
                "call_sid": call_sid,
                "from": from,
                "to": to,
            }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch the full assistant configuration for a call.
    pub async fn fetch_config(&self, call_sid: &str) -> Result<AssistantConfig, PlatformError> {
        let response = self
            .client
            .get(self.url(&format!("/calls/{call_sid}/config")))
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Post the terminal completion payload. Best effort from cleanup; a
    /// failure here is logged by the caller and the call still tears down.
    pub async fn complete_call(&self, report: &CompletionReport) -> Result<(), PlatformError> {
        let response = self
            .client
            .post(self.url(&format!("/calls/{}/complete", report.call_sid)))
            .header(SECRET_HEADER, &self.secret)
            .json(&json!({
                "call_sid": report.call_sid,
                "assistant_id": report.assistant_id,
                "organization_id": report.organization_id,
                "status": "done",
                "end_reason": report.end_reason,
                "duration_seconds": report.duration_seconds,
                "transcript": report.transcript,
                "dynamic_variables": report.dynamic_variables,
            }))
            .send()
            .await?;
        Self::check(response).await
    }

    /// Mirror a provider status callback to the platform.
    pub async fn forward_status(
        &self,
        call_sid: &str,
        call_status: &str,
        duration: Option<u64>,
    ) -> Result<(), PlatformError> {
        let mut body = json!({
            "call_sid": call_sid,
            "call_status": call_status,
        });
        if let Some(duration) = duration {
            body["call_duration"] = json!(duration);
        }
        let response = self
            .client
            .post(self.url("/calls/status"))
            .header(SECRET_HEADER, &self.secret)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Resolve the webhook URL for a transfer-to-agent target.
    pub async fn transfer_agent_url(
        &self,
        call_sid: &str,
        agent_id: &str,
    ) -> Result<TransferAgentReply, PlatformError> {
        let response = self
            .client
            .get(self.url(&format!(
                "/calls/{call_sid}/transfer-agent?agent_id={agent_id}"
            )))
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PlatformError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<(), PlatformError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_reply_without_assistant() {
        let reply: IncomingCallReply = serde_json::from_str(r#"{}"#).unwrap();
        assert!(reply.assistant_id.is_none());
    }

    #[test]
    fn test_incoming_reply_full() {
        let reply: IncomingCallReply = serde_json::from_str(
            r#"{"assistant_id":"asst_1","organization_id":"org_9","twilio_auth_token":"tok"}"#,
        )
        .unwrap();
        assert_eq!(reply.assistant_id.as_deref(), Some("asst_1"));
        assert_eq!(reply.twilio_auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_url_join() {
        let client = PlatformClient::new("http://laravel:8080/", "s3cret");
        assert_eq!(client.url("/calls/incoming"), "http://laravel:8080/calls/incoming");
    }
}
