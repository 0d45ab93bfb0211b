//! Realtime event parsing
//!
//! Translates raw JSON frames from the remote into `LlmEvent`s. The parser
//! owns the per-response tool-call accumulators; everything else is
//! stateless dispatch on the event `type`.

use std::collections::HashMap;

use serde_json::Value;

use crate::events::LlmEvent;

/// A tool call whose arguments are still streaming.
#[derive(Debug, Default)]
struct PendingToolCall {
    name: String,
    arguments: String,
}

/// Stateful parser for inbound realtime frames.
#[derive(Debug, Default)]
pub struct EventParser {
    /// Keyed by `call_id`; argument deltas for parallel calls interleave.
    pending_calls: HashMap<String, PendingToolCall>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one text frame. Malformed JSON yields an `Error` event and the
    /// frame is dropped; unknown event types yield nothing.
    pub fn parse(&mut self, raw: &str) -> Vec<LlmEvent> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return vec![LlmEvent::Error(format!("malformed frame: {e}"))],
        };
        let event_type = value.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "response.created" => {
                let id = str_at(&value, &["response", "id"]);
                vec![LlmEvent::ResponseCreated(id)]
            }
            "response.text.delta" => {
                let delta = value.get("delta").and_then(Value::as_str).unwrap_or("");
                vec![LlmEvent::TextDelta(delta.to_string())]
            }
            "response.text.done" => {
                let text = value.get("text").and_then(Value::as_str).unwrap_or("");
                vec![LlmEvent::TextDone(text.to_string())]
            }
            "response.output_item.added" => {
                self.register_function_item(value.get("item"));
                Vec::new()
            }
            "conversation.item.created" => {
                let item = value.get("item");
                self.register_function_item(item);
                let id = item
                    .and_then(|i| i.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                if id.is_empty() {
                    return Vec::new();
                }
                let role = item
                    .and_then(|i| i.get("role"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                vec![LlmEvent::ItemCreated { id, role }]
            }
            "response.function_call_arguments.delta" => {
                let call_id = str_at(&value, &["call_id"]);
                let delta = value.get("delta").and_then(Value::as_str).unwrap_or("");
                self.pending_calls
                    .entry(call_id)
                    .or_default()
                    .arguments
                    .push_str(delta);
                Vec::new()
            }
            "response.function_call_arguments.done" => {
                let call_id = str_at(&value, &["call_id"]);
                let pending = self.pending_calls.remove(&call_id).unwrap_or_default();
                // The done event carries the full argument string; fall back
                // to the accumulated deltas when it is absent.
                let raw_args = value
                    .get("arguments")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(pending.arguments);
                let arguments =
                    serde_json::from_str(&raw_args).unwrap_or(Value::Object(Default::default()));
                let name = if pending.name.is_empty() {
                    str_at(&value, &["name"])
                } else {
                    pending.name
                };
                vec![LlmEvent::FunctionCall {
                    call_id,
                    name,
                    arguments,
                }]
            }
            "response.done" => {
                let response = value.get("response").cloned().unwrap_or(Value::Null);
                vec![LlmEvent::ResponseDone(response)]
            }
            "error" => {
                let message = value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                vec![LlmEvent::Error(message)]
            }
            _ => Vec::new(),
        }
    }

    fn register_function_item(&mut self, item: Option<&Value>) {
        let Some(item) = item else { return };
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return;
        }
        let Some(call_id) = item.get("call_id").and_then(Value::as_str) else {
            return;
        };
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        self.pending_calls
            .entry(call_id.to_string())
            .or_default()
            .name = name;
    }
}

fn str_at(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    current.as_str().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(parser: &mut EventParser, json: &str) -> Vec<LlmEvent> {
        parser.parse(json)
    }

    #[test]
    fn test_text_delta_and_done() {
        let mut parser = EventParser::new();
        let events = frame(
            &mut parser,
            r#"{"type":"response.text.delta","delta":"We are"}"#,
        );
        assert!(matches!(&events[0], LlmEvent::TextDelta(t) if t == "We are"));

        let events = frame(
            &mut parser,
            r#"{"type":"response.text.done","text":"We are open 9 to 5."}"#,
        );
        assert!(matches!(&events[0], LlmEvent::TextDone(t) if t == "We are open 9 to 5."));
    }

    #[test]
    fn test_parallel_tool_calls_keyed_by_call_id() {
        let mut parser = EventParser::new();
        // Two calls announced, argument deltas interleaved.
        frame(&mut parser, r#"{"type":"response.output_item.added","item":{"type":"function_call","call_id":"call_a","name":"check_hours"}}"#);
        frame(&mut parser, r#"{"type":"response.output_item.added","item":{"type":"function_call","call_id":"call_b","name":"get_address"}}"#);
        frame(&mut parser, r#"{"type":"response.function_call_arguments.delta","call_id":"call_a","delta":"{\"day\":"}"#);
        frame(&mut parser, r#"{"type":"response.function_call_arguments.delta","call_id":"call_b","delta":"{\"city\":"}"#);
        frame(&mut parser, r#"{"type":"response.function_call_arguments.delta","call_id":"call_a","delta":"\"friday\"}"}"#);
        frame(&mut parser, r#"{"type":"response.function_call_arguments.delta","call_id":"call_b","delta":"\"austin\"}"}"#);

        let done_b = frame(
            &mut parser,
            r#"{"type":"response.function_call_arguments.done","call_id":"call_b"}"#,
        );
        let done_a = frame(
            &mut parser,
            r#"{"type":"response.function_call_arguments.done","call_id":"call_a"}"#,
        );

        // Exactly one FunctionCall each, in arguments-completion order.
        match &done_b[0] {
            LlmEvent::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                assert_eq!(call_id, "call_b");
                assert_eq!(name, "get_address");
                assert_eq!(arguments["city"], "austin");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &done_a[0] {
            LlmEvent::FunctionCall {
                call_id, arguments, ..
            } => {
                assert_eq!(call_id, "call_a");
                assert_eq!(arguments["day"], "friday");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_done_event_arguments_take_precedence() {
        let mut parser = EventParser::new();
        frame(&mut parser, r#"{"type":"conversation.item.created","item":{"id":"item_1","type":"function_call","call_id":"call_x","name":"end_call"}}"#);
        let events = frame(
            &mut parser,
            r#"{"type":"response.function_call_arguments.done","call_id":"call_x","arguments":"{\"reason\":\"completed\"}"}"#,
        );
        match &events[0] {
            LlmEvent::FunctionCall {
                name, arguments, ..
            } => {
                assert_eq!(name, "end_call");
                assert_eq!(arguments["reason"], "completed");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_item_created_reported_for_bookkeeping() {
        let mut parser = EventParser::new();
        let events = frame(
            &mut parser,
            r#"{"type":"conversation.item.created","item":{"id":"item_9","role":"assistant","type":"message"}}"#,
        );
        assert!(
            matches!(&events[0], LlmEvent::ItemCreated { id, role } if id == "item_9" && role == "assistant")
        );
    }

    #[test]
    fn test_malformed_frame_is_dropped_with_error() {
        let mut parser = EventParser::new();
        let events = frame(&mut parser, "not json at all");
        assert!(matches!(&events[0], LlmEvent::Error(_)));
        // Parser still works afterwards.
        let events = frame(&mut parser, r#"{"type":"response.created","response":{"id":"resp_1"}}"#);
        assert!(matches!(&events[0], LlmEvent::ResponseCreated(id) if id == "resp_1"));
    }

    #[test]
    fn test_unknown_event_types_ignored() {
        let mut parser = EventParser::new();
        assert!(frame(&mut parser, r#"{"type":"rate_limits.updated"}"#).is_empty());
        assert!(frame(&mut parser, r#"{"type":"session.updated"}"#).is_empty());
    }
}
