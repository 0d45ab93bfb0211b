//! Tool dispatch

use std::sync::Arc;

use serde_json::{json, Value};

use voicebridge_core::{CallSession, TransferType};

use crate::custom;

/// Session-level action a tool invocation triggers. The pipeline executes
/// these out-of-band; the tool reply goes back to the LLM either way.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    EndCallRequested {
        reason: String,
    },
    TransferToNumber {
        phone_number: String,
        transfer_type: TransferType,
        /// Spoken before the handoff when `enable_client_message` is set.
        /// Forwarded from the matched rule; dropping it silently loses the
        /// pre-transfer message.
        transfer_message: Option<String>,
        enable_client_message: bool,
    },
    TransferToAgent {
        agent_id: String,
        delay_seconds: Option<u64>,
        transfer_message: Option<String>,
        play_first_message: bool,
    },
    LanguageSwitched {
        language: String,
    },
    VoicemailDetected,
}

/// Result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Payload for `send_function_result`.
    pub reply: Value,
    /// Call-control action for the pipeline, if any.
    pub event: Option<ToolEvent>,
}

impl ToolOutcome {
    fn reply_only(reply: Value) -> Self {
        Self { reply, event: None }
    }
}

/// Dispatches built-in and custom tools for one call.
#[derive(Clone)]
pub struct ToolEngine {
    http: reqwest::Client,
}

impl Default for ToolEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolEngine {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Execute a tool call. Unknown names and bad arguments produce an
    /// error reply for the model rather than an orchestrator error; the
    /// model can recover, the call must not die.
    pub async fn dispatch(&self, session: &Arc<CallSession>, name: &str, args: &Value) -> ToolOutcome {
        match name {
            "end_call" => self.end_call(args),
            "transfer_to_number" => self.transfer_to_number(session, args),
            "transfer_to_agent" => self.transfer_to_agent(session, args),
            "switch_language" => self.switch_language(session, args),
            "voicemail_detected" => ToolOutcome {
                reply: json!({ "success": true }),
                event: Some(ToolEvent::VoicemailDetected),
            },
            custom_name => self.custom_tool(session, custom_name, args).await,
        }
    }

    fn end_call(&self, args: &Value) -> ToolOutcome {
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("completed")
            .to_string();
        ToolOutcome {
            reply: json!({ "success": true }),
            event: Some(ToolEvent::EndCallRequested { reason }),
        }
    }

    fn transfer_to_number(&self, session: &Arc<CallSession>, args: &Value) -> ToolOutcome {
        let Some(number) = args.get("phone_number").and_then(Value::as_str) else {
            return ToolOutcome::reply_only(
                json!({ "success": false, "error": "phone_number is required" }),
            );
        };
        let Some(rule) = session
            .config
            .transfer_numbers
            .iter()
            .find(|r| r.phone_number == number)
        else {
            return ToolOutcome::reply_only(json!({
                "success": false,
                "error": format!("{number} is not an allowed transfer destination"),
            }));
        };
        ToolOutcome {
            reply: json!({ "success": true, "transferring_to": number }),
            event: Some(ToolEvent::TransferToNumber {
                phone_number: rule.phone_number.clone(),
                transfer_type: rule.transfer_type,
                transfer_message: rule.transfer_message.clone(),
                enable_client_message: rule.enable_client_message,
            }),
        }
    }

    fn transfer_to_agent(&self, session: &Arc<CallSession>, args: &Value) -> ToolOutcome {
        let Some(agent_id) = args.get("agent_id").and_then(Value::as_str) else {
            return ToolOutcome::reply_only(
                json!({ "success": false, "error": "agent_id is required" }),
            );
        };
        let Some(rule) = session
            .config
            .transfer_agents
            .iter()
            .find(|r| r.agent_id == agent_id)
        else {
            return ToolOutcome::reply_only(json!({
                "success": false,
                "error": format!("{agent_id} is not an allowed transfer target"),
            }));
        };
        ToolOutcome {
            reply: json!({ "success": true, "transferring_to": agent_id }),
            event: Some(ToolEvent::TransferToAgent {
                agent_id: rule.agent_id.clone(),
                delay_seconds: rule.delay_seconds,
                transfer_message: rule.transfer_message.clone(),
                play_first_message: rule.play_first_message,
            }),
        }
    }

    fn switch_language(&self, session: &Arc<CallSession>, args: &Value) -> ToolOutcome {
        let Some(language) = args.get("language").and_then(Value::as_str) else {
            return ToolOutcome::reply_only(
                json!({ "success": false, "error": "language is required" }),
            );
        };
        session.switch_language(language);
        ToolOutcome {
            reply: json!({ "success": true, "language": language }),
            event: Some(ToolEvent::LanguageSwitched {
                language: language.to_string(),
            }),
        }
    }

    async fn custom_tool(
        &self,
        session: &Arc<CallSession>,
        name: &str,
        args: &Value,
    ) -> ToolOutcome {
        let Some(config) = session
            .config
            .custom_tools
            .iter()
            .find(|t| t.name == name)
            .cloned()
        else {
            tracing::warn!(tool = %name, "Model invoked unknown tool");
            return ToolOutcome::reply_only(
                json!({ "success": false, "error": format!("unknown tool {name}") }),
            );
        };

        let (reply, extracted) = custom::execute(&self.http, &config, args).await;
        for (variable, value) in extracted {
            session.set_variable(variable, value);
        }
        ToolOutcome::reply_only(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_core::AssistantConfig;

    fn session(config_json: &str) -> Arc<CallSession> {
        let config: AssistantConfig = serde_json::from_str(config_json).unwrap();
        Arc::new(CallSession::new("CA1", "+1", "asst", "org", config))
    }

    #[tokio::test]
    async fn test_end_call_emits_event() {
        let engine = ToolEngine::new();
        let s = session(r#"{"system_prompt":"x","enable_end_call":true}"#);
        let outcome = engine
            .dispatch(&s, "end_call", &json!({ "reason": "user_requested" }))
            .await;
        assert_eq!(outcome.reply["success"], true);
        assert!(matches!(
            outcome.event,
            Some(ToolEvent::EndCallRequested { reason }) if reason == "user_requested"
        ));
    }

    #[tokio::test]
    async fn test_transfer_forwards_rule_message() {
        let engine = ToolEngine::new();
        let s = session(
            r#"{
                "system_prompt": "x",
                "enable_transfer_to_number": true,
                "transfer_numbers": [{
                    "phone_number": "+15551230000",
                    "transfer_type": "sip_refer",
                    "transfer_message": "Connecting you now.",
                    "enable_client_message": true
                }]
            }"#,
        );
        let outcome = engine
            .dispatch(
                &s,
                "transfer_to_number",
                &json!({ "phone_number": "+15551230000" }),
            )
            .await;
        match outcome.event {
            Some(ToolEvent::TransferToNumber {
                transfer_type,
                transfer_message,
                enable_client_message,
                ..
            }) => {
                assert_eq!(transfer_type, TransferType::SipRefer);
                assert_eq!(transfer_message.as_deref(), Some("Connecting you now."));
                assert!(enable_client_message);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_to_unlisted_number_rejected() {
        let engine = ToolEngine::new();
        let s = session(r#"{"system_prompt":"x","enable_transfer_to_number":true}"#);
        let outcome = engine
            .dispatch(
                &s,
                "transfer_to_number",
                &json!({ "phone_number": "+19995550000" }),
            )
            .await;
        assert_eq!(outcome.reply["success"], false);
        assert!(outcome.event.is_none());
    }

    #[tokio::test]
    async fn test_switch_language_updates_session() {
        let engine = ToolEngine::new();
        let s = session(
            r#"{"system_prompt":"x","enable_language_detection":true,"language_voices":{"de":"vicki"}}"#,
        );
        let outcome = engine
            .dispatch(&s, "switch_language", &json!({ "language": "de" }))
            .await;
        assert_eq!(outcome.reply["success"], true);
        assert_eq!(s.active_language(), "de");
        assert_eq!(s.active_voice().as_deref(), Some("vicki"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_soft_error() {
        let engine = ToolEngine::new();
        let s = session(r#"{"system_prompt":"x"}"#);
        let outcome = engine.dispatch(&s, "does_not_exist", &json!({})).await;
        assert_eq!(outcome.reply["success"], false);
        assert!(outcome.event.is_none());
    }
}
