//! Serial synthesis queue
//!
//! One worker per call consumes sentence tasks in order; the queue is the
//! total-order gate for all outbound audio. Each task carries the epoch it
//! was enqueued under; an interrupt bumps the session epoch, which voids
//! every queued task at once without touching the channel.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::{mpsc, oneshot};

use voicebridge_audio::pcm16_8k_to_ulaw;
use voicebridge_core::CallSession;
use voicebridge_inference::InferenceClient;
use voicebridge_telephony::outbound;

use crate::framing::FrameBuffer;
use crate::messages::PipelineMsg;

/// Stream is killed after this long without a chunk.
const CHUNK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Mark name echoed back by the provider when playback finishes.
pub const SPEECH_END_MARK: &str = "ai_speech_end";

struct SpeechTask {
    text: String,
    epoch: u64,
    done: Option<oneshot::Sender<()>>,
}

/// Handle to the per-call synthesis worker.
#[derive(Clone)]
pub struct Speaker {
    tx: mpsc::UnboundedSender<SpeechTask>,
}

impl Speaker {
    /// Spawn the worker task for a call.
    pub fn spawn(
        session: Arc<CallSession>,
        inference: InferenceClient,
        telephony_tx: mpsc::UnboundedSender<String>,
        pipeline_tx: mpsc::UnboundedSender<PipelineMsg>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SpeechTask>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let current = session.current_epoch();
                if task.epoch != current {
                    tracing::debug!(call_sid = %session.call_sid, "Skipping synthesis from a superseded epoch");
                    continue;
                }
                if !session.is_live() {
                    continue;
                }
                if task.text.trim().is_empty() {
                    continue;
                }
                let spoke = synthesize(&session, &inference, &telephony_tx, &task.text, task.epoch).await;
                if !spoke {
                    let _ = pipeline_tx.send(PipelineMsg::SynthesisIdle);
                }
                if let Some(done) = task.done {
                    let _ = done.send(());
                }
            }
        });
        Self { tx }
    }

    /// Queue a sentence under the current epoch.
    pub fn enqueue(&self, session: &CallSession, text: impl Into<String>) {
        let _ = self.tx.send(SpeechTask {
            text: text.into(),
            epoch: session.current_epoch(),
            done: None,
        });
    }

    /// Queue a sentence and get a signal for when it has been synthesized
    /// and handed to the provider (used before transfers).
    pub fn enqueue_notified(
        &self,
        session: &CallSession,
        text: impl Into<String>,
    ) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self.tx.send(SpeechTask {
            text: text.into(),
            epoch: session.current_epoch(),
            done: Some(done_tx),
        });
        done_rx
    }
}

/// Stream one sentence from the GPU service to the telephony socket.
/// Returns true when at least one frame reached the provider (a mark was
/// queued behind it and will echo back).
async fn synthesize(
    session: &Arc<CallSession>,
    inference: &InferenceClient,
    telephony_tx: &mpsc::UnboundedSender<String>,
    text: &str,
    epoch: u64,
) -> bool {
    let Some(stream_sid) = session.stream_sid() else {
        tracing::warn!(call_sid = %session.call_sid, "No stream id yet, dropping synthesis");
        return false;
    };

    // Speaking begins: the caller is no longer "silent", and the mark echo
    // is what flips ai_speaking off again.
    session.clear_silence_timer();
    session.ai_speaking.store(true, Ordering::Release);

    let language = session.active_language();
    let voice = session.active_voice();
    let mut response = match inference
        .synthesize_stream(text, &language, voice.as_deref())
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(call_sid = %session.call_sid, "TTS request failed: {e}");
            session.ai_speaking.store(false, Ordering::Release);
            return false;
        }
    };

    let mut framer = FrameBuffer::new();
    let mut sent_frames = 0usize;

    loop {
        if session.current_epoch() != epoch || !session.is_live() {
            // Interrupted or hung up mid-stream; dropping the response
            // aborts the transfer.
            break;
        }
        match tokio::time::timeout(CHUNK_IDLE_TIMEOUT, response.chunk()).await {
            Err(_) => {
                tracing::warn!(call_sid = %session.call_sid, "TTS stream stalled, resolving partial");
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!(call_sid = %session.call_sid, "TTS stream error: {e}");
                break;
            }
            Ok(Ok(None)) => break,
            Ok(Ok(Some(chunk))) => {
                framer.push(chunk);
                while let Some(frame) = framer.next_frame() {
                    let ulaw = pcm16_8k_to_ulaw(&frame);
                    let _ = telephony_tx.send(outbound::media(&stream_sid, &BASE64.encode(ulaw)));
                    sent_frames += 1;
                }
            }
        }
    }

    // Nothing more goes out after an interrupt: the provider's buffer was
    // just cleared and a trailing blip of the old sentence would leak.
    if session.current_epoch() != epoch || !session.is_live() {
        return false;
    }

    // Trailing partial frame; anything under one sample is noise.
    let remainder = framer.take_remainder();
    if remainder.len() >= 2 {
        let ulaw = pcm16_8k_to_ulaw(&remainder);
        let _ = telephony_tx.send(outbound::media(&stream_sid, &BASE64.encode(ulaw)));
        sent_frames += 1;
    }

    if sent_frames > 0 {
        let _ = telephony_tx.send(outbound::mark(&stream_sid, SPEECH_END_MARK));
        tracing::debug!(call_sid = %session.call_sid, frames = sent_frames, "Synthesis streamed");
        true
    } else {
        // Nothing reached the provider, so no mark will echo back; release
        // the speaking flag here or it sticks forever.
        session.ai_speaking.store(false, Ordering::Release);
        false
    }
}
