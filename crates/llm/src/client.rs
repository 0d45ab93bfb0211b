//! Realtime session transport
//!
//! Owns the WebSocket: a writer task serializes every outbound frame, a
//! reader task parses inbound frames into `LlmEvent`s, and a keepalive task
//! pings every 25 seconds. The remote drops idle sockets after roughly a
//! minute and a quiet call can easily go longer without application
//! traffic.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::events::LlmEvent;
use crate::protocol::EventParser;
use crate::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Connection settings for the realtime endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_response_tokens: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime".to_string(),
            api_key: String::new(),
            model: "gpt-4o-realtime-preview".to_string(),
            temperature: 0.8,
            // Smaller defaults truncate realistic service responses.
            max_response_tokens: 4096,
        }
    }
}

/// Everything sent in the session-configuration message.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub instructions: String,
    pub tools: Vec<Value>,
}

struct Inner {
    outbound: mpsc::UnboundedSender<Message>,
    active_response: Mutex<Option<String>>,
    temperature: f32,
    max_response_tokens: u32,
}

/// Handle to one live realtime session. Cheap to clone; all clones share
/// the same socket.
#[derive(Clone)]
pub struct RealtimeSession {
    inner: Arc<Inner>,
}

impl RealtimeSession {
    /// Open the socket and start the reader, writer and keepalive tasks.
    ///
    /// `connect_async` resolves exactly once, so wrapping it in a timeout
    /// gives a single settlement point; there is no open/error/close race
    /// to guard against here.
    pub async fn connect(
        config: RealtimeConfig,
        events: mpsc::UnboundedSender<LlmEvent>,
    ) -> Result<Self, LlmError> {
        let url = format!("{}?model={}", config.url, config.model);
        let mut request = url
            .into_client_request()
            .map_err(|e| LlmError::Connect(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            format!("Bearer {}", config.api_key)
                .parse()
                .map_err(|_| LlmError::Connect("invalid api key header".to_string()))?,
        );
        headers.insert(
            "OpenAI-Beta",
            "realtime=v1"
                .parse()
                .map_err(|_| LlmError::Connect("invalid beta header".to_string()))?,
        );

        let (socket, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| LlmError::ConnectTimeout)?
            .map_err(|e| LlmError::Connect(e.to_string()))?;

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let inner = Arc::new(Inner {
            outbound: outbound.clone(),
            active_response: Mutex::new(None),
            temperature: config.temperature,
            max_response_tokens: config.max_response_tokens,
        });

        // Writer: single owner of the sink, serializes all sends. Exits on
        // the Close frame it sends itself; that drops the receiver, which
        // in turn stops the keepalive task.
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::warn!("LLM socket send failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Keepalive ping. Stops once the writer side is gone.
        let ping_tx = outbound.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if ping_tx.send(Message::Ping(Vec::new())).is_err() {
                    break;
                }
            }
        });

        // Reader: parses frames, tracks the in-flight response id.
        let reader_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut parser = EventParser::new();
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        for event in parser.parse(&text) {
                            match &event {
                                LlmEvent::ResponseCreated(id) => {
                                    *reader_inner.active_response.lock() = Some(id.clone());
                                }
                                LlmEvent::ResponseDone(_) => {
                                    *reader_inner.active_response.lock() = None;
                                }
                                _ => {}
                            }
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {} // pings are answered by the protocol layer
                    Err(e) => {
                        let _ = events.send(LlmEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            let _ = events.send(LlmEvent::Closed);
        });

        Ok(Self { inner })
    }

    /// Send the one-time session configuration. Text modality only and
    /// server-side turn detection off: turn taking lives in the pipeline.
    pub fn configure(&self, setup: &SessionSetup) -> Result<(), LlmError> {
        self.send_json(json!({
            "type": "session.update",
            "session": {
                "modalities": ["text"],
                "instructions": setup.instructions,
                "turn_detection": null,
                "tools": setup.tools,
                "tool_choice": "auto",
                "temperature": self.inner.temperature,
                "max_response_output_tokens": self.inner.max_response_tokens,
            }
        }))
    }

    /// Append a user message and request a response.
    pub fn send_user_message(&self, text: &str) -> Result<(), LlmError> {
        self.send_json(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{ "type": "input_text", "text": text }],
            }
        }))?;
        self.send_json(json!({ "type": "response.create" }))
    }

    /// Append a tool result and request continuation.
    pub fn send_function_result(&self, call_id: &str, result: &Value) -> Result<(), LlmError> {
        self.send_json(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": result.to_string(),
            }
        }))?;
        self.send_json(json!({ "type": "response.create" }))
    }

    /// Append a system message without requesting a response.
    pub fn inject_context(&self, text: &str) -> Result<(), LlmError> {
        self.send_json(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "system",
                "content": [{ "type": "input_text", "text": text }],
            }
        }))
    }

    /// Remove a previously-created conversation item.
    pub fn delete_item(&self, item_id: &str) -> Result<(), LlmError> {
        self.send_json(json!({
            "type": "conversation.item.delete",
            "item_id": item_id,
        }))
    }

    /// Cancel the in-flight response, if any. Returns the cancelled
    /// response id.
    pub fn cancel_response(&self) -> Result<Option<String>, LlmError> {
        let id = self.inner.active_response.lock().take();
        if let Some(ref id) = id {
            self.send_json(json!({
                "type": "response.cancel",
                "response_id": id,
            }))?;
        }
        Ok(id)
    }

    pub fn active_response_id(&self) -> Option<String> {
        self.inner.active_response.lock().clone()
    }

    /// Close the socket. Queued frames are flushed first by the writer.
    pub fn disconnect(&self) {
        let _ = self.inner.outbound.send(Message::Close(None));
    }

    fn send_json(&self, value: Value) -> Result<(), LlmError> {
        self.inner
            .outbound
            .send(Message::Text(value.to_string()))
            .map_err(|_| LlmError::Closed)
    }
}
