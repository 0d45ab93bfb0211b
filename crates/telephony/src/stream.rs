//! Media stream protocol
//!
//! Text frames on the per-call audio WebSocket, each a JSON event. Inbound
//! media payloads are base64 20 ms mu-law at 8 kHz; outbound frames must be
//! exactly 20 ms as well or the provider drops them.

use serde::Deserialize;

/// Inbound event from the provider's media stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Sent once right after the WebSocket opens.
    Connected,
    /// Stream metadata; arrives before any media.
    Start { start: StartMeta },
    /// One 20 ms audio frame.
    Media { media: MediaPayload },
    /// The provider tore the stream down.
    Stop,
    /// Echo of a mark we emitted, meaning all audio before it has played.
    Mark { mark: MarkMeta },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded mu-law bytes.
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkMeta {
    pub name: String,
}

/// Outbound frame builders. These produce the exact JSON text the provider
/// expects; the caller owns ordering through its writer task.
pub mod outbound {
    use serde_json::json;

    /// One 20 ms frame of base64 mu-law audio.
    pub fn media(stream_sid: &str, payload_b64: &str) -> String {
        json!({
            "event": "media",
            "streamSid": stream_sid,
            "media": { "payload": payload_b64 },
        })
        .to_string()
    }

    /// Named synchronization beacon; the provider echoes it back once all
    /// preceding audio has played to the caller.
    pub fn mark(stream_sid: &str, name: &str) -> String {
        json!({
            "event": "mark",
            "streamSid": stream_sid,
            "mark": { "name": name },
        })
        .to_string()
    }

    /// Flush any audio the provider has buffered but not yet played.
    pub fn clear(stream_sid: &str) -> String {
        json!({
            "event": "clear",
            "streamSid": stream_sid,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_event() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZx","callSid":"CA1","tracks":["inbound"]}}"#,
        )
        .unwrap();
        match event {
            StreamEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZx");
                assert_eq!(start.call_sid.as_deref(), Some("CA1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_event() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"event":"media","media":{"track":"inbound","chunk":"2","payload":"//8A"}}"#,
        )
        .unwrap();
        assert!(matches!(event, StreamEvent::Media { media } if media.payload == "//8A"));
    }

    #[test]
    fn test_parse_stop_and_mark() {
        let stop: StreamEvent =
            serde_json::from_str(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#).unwrap();
        assert!(matches!(stop, StreamEvent::Stop));

        let mark: StreamEvent =
            serde_json::from_str(r#"{"event":"mark","mark":{"name":"ai_speech_end"}}"#).unwrap();
        assert!(matches!(mark, StreamEvent::Mark { mark } if mark.name == "ai_speech_end"));
    }

    #[test]
    fn test_outbound_media_shape() {
        let frame: serde_json::Value =
            serde_json::from_str(&outbound::media("MZx", "AAAA")).unwrap();
        assert_eq!(frame["event"], "media");
        assert_eq!(frame["streamSid"], "MZx");
        assert_eq!(frame["media"]["payload"], "AAAA");
    }

    #[test]
    fn test_outbound_clear_shape() {
        let frame: serde_json::Value = serde_json::from_str(&outbound::clear("MZx")).unwrap();
        assert_eq!(frame["event"], "clear");
        assert_eq!(frame["streamSid"], "MZx");
    }
}
