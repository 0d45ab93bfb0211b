//! Tool descriptor builder
//!
//! Produces the realtime-API function schemas for one call. Each built-in
//! is gated by its own flag; custom tools expose the parameters the model
//! must supply (path params plus non-constant query params).

use serde_json::{json, Value};

use voicebridge_core::AssistantConfig;

/// Build the complete tool list for a call's session configuration.
pub fn build_tool_definitions(config: &AssistantConfig) -> Vec<Value> {
    let mut tools = Vec::new();

    if config.enable_end_call {
        tools.push(json!({
            "type": "function",
            "name": "end_call",
            "description": "End the call. Use when the conversation is finished, the caller asks to hang up, or the caller has stopped responding.",
            "parameters": {
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "enum": ["completed", "user_requested", "no_response"],
                    }
                },
                "required": ["reason"],
            }
        }));
    }

    if config.enable_transfer_to_number && !config.transfer_numbers.is_empty() {
        let numbers: Vec<&str> = config
            .transfer_numbers
            .iter()
            .map(|r| r.phone_number.as_str())
            .collect();
        let conditions = config
            .transfer_numbers
            .iter()
            .filter_map(|r| {
                r.condition
                    .as_ref()
                    .map(|c| format!("{}: {}", r.phone_number, c))
            })
            .collect::<Vec<_>>()
            .join("; ");
        let mut description =
            "Transfer the caller to a human phone number from the allowed list.".to_string();
        if !conditions.is_empty() {
            description.push(' ');
            description.push_str(&conditions);
        }
        tools.push(json!({
            "type": "function",
            "name": "transfer_to_number",
            "description": description,
            "parameters": {
                "type": "object",
                "properties": {
                    "phone_number": { "type": "string", "enum": numbers },
                    "condition": { "type": "string", "description": "Why the transfer is happening." }
                },
                "required": ["phone_number"],
            }
        }));
    }

    if config.enable_transfer_to_agent && !config.transfer_agents.is_empty() {
        let agents: Vec<&str> = config
            .transfer_agents
            .iter()
            .map(|r| r.agent_id.as_str())
            .collect();
        tools.push(json!({
            "type": "function",
            "name": "transfer_to_agent",
            "description": "Transfer the caller to another assistant from the allowed list.",
            "parameters": {
                "type": "object",
                "properties": {
                    "agent_id": { "type": "string", "enum": agents },
                    "condition": { "type": "string", "description": "Why the transfer is happening." }
                },
                "required": ["agent_id"],
            }
        }));
    }

    if config.enable_language_detection {
        tools.push(json!({
            "type": "function",
            "name": "switch_language",
            "description": "Switch the conversation language when the caller speaks a different language.",
            "parameters": {
                "type": "object",
                "properties": {
                    "language": { "type": "string", "description": "ISO 639-1 language code, e.g. 'de'." }
                },
                "required": ["language"],
            }
        }));
    }

    if config.voicemail_detection {
        tools.push(json!({
            "type": "function",
            "name": "voicemail_detected",
            "description": "Call this when the audio is an answering machine or voicemail greeting rather than a live person. Afterwards end the call.",
            "parameters": { "type": "object", "properties": {} }
        }));
    }

    if config.enable_custom_tools {
        for tool in &config.custom_tools {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for param in &tool.path_params {
                properties.insert(
                    param.name.clone(),
                    json!({
                        "type": param.param_type,
                        "description": param.description.clone().unwrap_or_default(),
                    }),
                );
                required.push(param.name.clone());
            }
            for param in &tool.query_params {
                // Constant-valued params are filled in server side.
                if param.value.is_some() {
                    continue;
                }
                properties.insert(
                    param.name.clone(),
                    json!({
                        "type": param.param_type,
                        "description": param.description.clone().unwrap_or_default(),
                    }),
                );
            }
            tools.push(json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }));
        }
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> AssistantConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_no_flags_no_tools() {
        let tools = build_tool_definitions(&config(r#"{"system_prompt":"x"}"#));
        assert!(tools.is_empty());
    }

    #[test]
    fn test_end_call_gated_by_flag() {
        let tools =
            build_tool_definitions(&config(r#"{"system_prompt":"x","enable_end_call":true}"#));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "end_call");
        assert_eq!(
            tools[0]["parameters"]["properties"]["reason"]["enum"],
            serde_json::json!(["completed", "user_requested", "no_response"])
        );
    }

    #[test]
    fn test_transfer_numbers_enumerated() {
        let tools = build_tool_definitions(&config(
            r#"{
                "system_prompt": "x",
                "enable_transfer_to_number": true,
                "transfer_numbers": [
                    {"phone_number": "+15551230000", "condition": "billing questions"},
                    {"phone_number": "+15551231111"}
                ]
            }"#,
        ));
        assert_eq!(tools[0]["name"], "transfer_to_number");
        let numbers = &tools[0]["parameters"]["properties"]["phone_number"]["enum"];
        assert_eq!(numbers[0], "+15551230000");
        assert_eq!(numbers[1], "+15551231111");
        assert!(tools[0]["description"]
            .as_str()
            .unwrap()
            .contains("billing questions"));
    }

    #[test]
    fn test_custom_tool_skips_constant_query_params() {
        let tools = build_tool_definitions(&config(
            r#"{
                "system_prompt": "x",
                "enable_custom_tools": true,
                "custom_tools": [{
                    "name": "check_hours",
                    "url": "https://api.example.com/locations/{location}/hours",
                    "path_params": [{"name": "location"}],
                    "query_params": [
                        {"name": "format", "value": "short"},
                        {"name": "day"}
                    ]
                }]
            }"#,
        ));
        let props = &tools[0]["parameters"]["properties"];
        assert!(props.get("location").is_some());
        assert!(props.get("day").is_some());
        assert!(props.get("format").is_none());
        assert_eq!(tools[0]["parameters"]["required"], serde_json::json!(["location"]));
    }

    #[test]
    fn test_voicemail_tool_present_when_detection_enabled() {
        let tools = build_tool_definitions(&config(
            r#"{"system_prompt":"x","voicemail_detection":true}"#,
        ));
        assert_eq!(tools[0]["name"], "voicemail_detected");
    }
}
