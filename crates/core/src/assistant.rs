//! Per-call assistant configuration
//!
//! Snapshot of everything the configuration service returns for a call.
//! The session keeps one immutable copy; only the active language and
//! voice change after setup (via the language-switch tool).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_language() -> String {
    "en".to_string()
}

/// Full assistant configuration fetched once per call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub first_message: Option<String>,
    #[serde(default)]
    pub voicemail_message: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub voice: Option<String>,
    /// Language code to voice identifier; a missing entry means the GPU
    /// service picks its default voice for that language.
    #[serde(default)]
    pub language_voices: HashMap<String, String>,
    #[serde(default)]
    pub silence_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub max_duration_seconds: Option<u64>,

    #[serde(default)]
    pub enable_end_call: bool,
    #[serde(default)]
    pub enable_transfer_to_number: bool,
    #[serde(default)]
    pub enable_transfer_to_agent: bool,
    #[serde(default)]
    pub enable_custom_tools: bool,
    #[serde(default)]
    pub enable_language_detection: bool,
    #[serde(default)]
    pub voicemail_detection: bool,
    #[serde(default)]
    pub enable_filler_phrases: bool,
    #[serde(default)]
    pub filler_phrases: Vec<String>,
    #[serde(default)]
    pub context_summarization: bool,

    #[serde(default)]
    pub transfer_numbers: Vec<TransferNumberRule>,
    #[serde(default)]
    pub transfer_agents: Vec<TransferAgentRule>,
    #[serde(default)]
    pub custom_tools: Vec<CustomToolConfig>,

    #[serde(default)]
    pub twilio_account_sid: String,
    #[serde(default)]
    pub twilio_auth_token: String,
}

impl AssistantConfig {
    /// Voice for a language, consulting the per-language map first.
    pub fn voice_for_language(&self, language: &str) -> Option<String> {
        self.language_voices
            .get(language)
            .cloned()
            .or_else(|| self.voice.clone())
    }
}

/// How a call is handed to a human number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Conference,
    SipRefer,
}

impl Default for TransferType {
    fn default() -> Self {
        TransferType::Conference
    }
}

/// One allowed destination for the number-transfer tool.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferNumberRule {
    pub phone_number: String,
    /// Natural-language condition shown to the model.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub transfer_type: TransferType,
    #[serde(default)]
    pub transfer_message: Option<String>,
    #[serde(default)]
    pub enable_client_message: bool,
}

/// One allowed destination for the agent-transfer tool.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferAgentRule {
    pub agent_id: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub delay_seconds: Option<u64>,
    #[serde(default)]
    pub transfer_message: Option<String>,
    #[serde(default)]
    pub play_first_message: bool,
}

/// Declared parameter for a custom tool's URL path.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// Declared query parameter; a constant `value` bypasses the model.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryParamSpec {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Mapping from a dot-notation path in the tool response to a named
/// per-call variable.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseAssignment {
    pub json_path: String,
    pub variable_name: String,
}

/// Generic HTTP tool the assistant may call.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path_params: Vec<ParamSpec>,
    #[serde(default)]
    pub query_params: Vec<QueryParamSpec>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_tool_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub response_variables: Vec<ResponseAssignment>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_tool_timeout() -> u64 {
    10
}

/// Telephony credentials owned per account.
#[derive(Debug, Clone, Default)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_deserializes() {
        let config: AssistantConfig =
            serde_json::from_str(r#"{"system_prompt": "be helpful"}"#).unwrap();
        assert_eq!(config.language, "en");
        assert!(!config.enable_end_call);
        assert!(config.transfer_numbers.is_empty());
    }

    #[test]
    fn test_voice_lookup_prefers_language_map() {
        let config: AssistantConfig = serde_json::from_str(
            r#"{
                "system_prompt": "x",
                "voice": "alloy",
                "language_voices": {"de": "vicki"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.voice_for_language("de").as_deref(), Some("vicki"));
        assert_eq!(config.voice_for_language("en").as_deref(), Some("alloy"));
    }

    #[test]
    fn test_transfer_rule_defaults() {
        let rule: TransferNumberRule =
            serde_json::from_str(r#"{"phone_number": "+15551234567"}"#).unwrap();
        assert_eq!(rule.transfer_type, TransferType::Conference);
        assert!(!rule.enable_client_message);
    }

    #[test]
    fn test_custom_tool_defaults() {
        let tool: CustomToolConfig = serde_json::from_str(
            r#"{"name": "check_hours", "url": "https://api.example.com/hours/{location}"}"#,
        )
        .unwrap();
        assert_eq!(tool.method, "GET");
        assert_eq!(tool.timeout_seconds, 10);
    }
}
