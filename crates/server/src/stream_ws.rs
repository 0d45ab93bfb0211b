//! Per-call audio WebSocket handler
//!
//! Builds the session, registers it and hands the socket to the pipeline.
//! The pipeline's inbox is wired up before its LLM connect begins, so
//! `start` and early `media` events are never lost: the pipeline queues
//! them until setup completes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voicebridge_core::{CallSession, EndReason};
use voicebridge_pipeline::{CallPipeline, PipelineMsg};
use voicebridge_telephony::StreamEvent;

use crate::state::AppState;

pub async fn handle_socket(socket: WebSocket, state: AppState, call_sid: String) {
    tracing::info!(call_sid = %call_sid, "Audio stream connected");

    let config = match state.platform.fetch_config(&call_sid).await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(call_sid = %call_sid, "Config fetch failed, dropping stream: {e}");
            return;
        }
    };

    let pending = state
        .pending_calls
        .lock()
        .remove(&call_sid)
        .unwrap_or_default();

    // Fully-initialized session before any audio is processed.
    let session = Arc::new(CallSession::new(
        call_sid.clone(),
        pending.caller,
        pending.assistant_id,
        pending.organization_id,
        config,
    ));
    state.registry.insert(Arc::clone(&session));

    let (mut sink, mut source) = socket.split();

    // Writer task: sole owner of the sink; everything outbound (media,
    // marks, clears) funnels through this channel in order.
    let (telephony_tx, mut telephony_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(frame) = telephony_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let inbox = CallPipeline::start(
        Arc::clone(&session),
        Arc::clone(&state.registry),
        state.inference.clone(),
        state.platform.clone(),
        state.pipeline_config(),
        telephony_tx,
    );

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<StreamEvent>(&text) {
                Ok(event) => {
                    let stopped = matches!(event, StreamEvent::Stop);
                    if inbox.send(PipelineMsg::Stream(event)).is_err() || stopped {
                        break;
                    }
                }
                Err(e) => {
                    // Protocol error: drop the one message, keep the call.
                    tracing::debug!(call_sid = %call_sid, "Unparseable stream frame dropped: {e}");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(call_sid = %call_sid, "Audio stream closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(call_sid = %call_sid, "Audio stream error: {e}");
                let _ = inbox.send(PipelineMsg::EndCall(EndReason::WsError));
                break;
            }
        }
    }
    // Dropping the inbox sender lets the pipeline task notice the socket
    // is gone and run cleanup if it has not already.
}
