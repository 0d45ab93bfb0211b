//! HTTP surface
//!
//! Webhooks from the telephony provider, the per-call audio WebSocket
//! upgrade and the operator health endpoint.

use axum::extract::{Form, Path, State, WebSocketUpgrade};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use voicebridge_telephony::{signature, twiml};

use crate::state::{AppState, PendingCall};
use crate::stream_ws;

const NO_ASSISTANT_MESSAGE: &str =
    "We're sorry, this number is not configured to take calls right now. Goodbye.";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/voice/incoming", post(incoming_call))
        .route("/voice/status", post(status_callback))
        .route("/voice/stream/:call_sid", get(stream_upgrade))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn xml(body: String) -> Response {
    ([(CONTENT_TYPE, "text/xml")], body).into_response()
}

#[derive(Debug, Deserialize)]
struct IncomingForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "From", default)]
    from: String,
    #[serde(rename = "To", default)]
    to: String,
}

/// Incoming-call webhook. Announces the call to the platform; when an
/// assistant answers this number, replies with TwiML that connects the
/// call to the per-call audio WebSocket on this host.
async fn incoming_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<IncomingForm>,
) -> Response {
    tracing::info!(call_sid = %form.call_sid, from = %form.from, "Incoming call");

    let reply = match state
        .platform
        .notify_incoming(&form.call_sid, &form.from, &form.to)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(call_sid = %form.call_sid, "Incoming-call notify failed: {e}");
            return xml(twiml::error_response(NO_ASSISTANT_MESSAGE));
        }
    };

    let Some(assistant_id) = reply.assistant_id else {
        tracing::warn!(call_sid = %form.call_sid, to = %form.to, "No assistant for number");
        return xml(twiml::error_response(NO_ASSISTANT_MESSAGE));
    };

    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost")
        .to_string();

    // Signature validation is skipped unless configured AND the platform
    // returned the account token to validate against.
    if state.settings.validate_signatures {
        if let Some(token) = reply.twilio_auth_token.as_deref() {
            let provided = headers
                .get("x-twilio-signature")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");
            let url = format!("https://{host}/voice/incoming");
            let params = vec![
                ("CallSid".to_string(), form.call_sid.clone()),
                ("From".to_string(), form.from.clone()),
                ("To".to_string(), form.to.clone()),
            ];
            if !signature::validate(token, &url, &params, provided) {
                tracing::warn!(call_sid = %form.call_sid, "Webhook signature rejected");
                return StatusCode::FORBIDDEN.into_response();
            }
        }
    }

    state.pending_calls.lock().insert(
        form.call_sid.clone(),
        PendingCall {
            caller: form.from.clone(),
            assistant_id,
            organization_id: reply.organization_id.unwrap_or_default(),
        },
    );

    let ws_url = format!("wss://{host}/voice/stream/{}", form.call_sid);
    xml(twiml::connect_stream(&ws_url))
}

#[derive(Debug, Deserialize)]
struct StatusForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "CallStatus", default)]
    call_status: String,
    #[serde(rename = "CallDuration", default)]
    call_duration: Option<u64>,
}

/// Status callback; mirrored to the platform, always 200 back to the
/// provider so it stops retrying.
async fn status_callback(
    State(state): State<AppState>,
    Form(form): Form<StatusForm>,
) -> StatusCode {
    tracing::debug!(call_sid = %form.call_sid, status = %form.call_status, "Status callback");
    if let Err(e) = state
        .platform
        .forward_status(&form.call_sid, &form.call_status, form.call_duration)
        .await
    {
        tracing::warn!(call_sid = %form.call_sid, "Status forward failed: {e}");
    }
    // A finished call whose stream never opened leaves a pending entry.
    if form.call_status == "completed" || form.call_status == "failed" {
        state.pending_calls.lock().remove(&form.call_sid);
    }
    StatusCode::OK
}

/// Per-call audio WebSocket.
async fn stream_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| stream_ws::handle_socket(socket, state, call_sid))
}

/// Operator liveness: process status, live call count and GPU reachability.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let gpu = match state.inference.health().await {
        Ok(health) => health.status,
        Err(_) => "unreachable".to_string(),
    };
    Json(json!({
        "status": "ok",
        "active_calls": state.registry.count(),
        "gpu_server": gpu,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use voicebridge_inference::{InferenceClient, InferenceConfig};
    use voicebridge_platform::PlatformClient;

    #[test]
    fn test_router_creation() {
        let inference = InferenceClient::new(InferenceConfig::default()).unwrap();
        let platform = PlatformClient::new("http://127.0.0.1:8000", "secret");
        let state = AppState::new(Settings::from_env(), inference, platform);
        let _ = create_router(state);
    }
}
