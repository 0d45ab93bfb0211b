//! Per-call pipeline driver
//!
//! One task per call owns this struct and drains the inbox; handlers run
//! strictly in order, which is what lets the turn state machine stay free
//! of locks. Outbound I/O (VAD, STT, tools, summarization) is spawned and
//! reports back through the inbox.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::mpsc;

use voicebridge_audio as audio;
use voicebridge_core::{
    CallRegistry, CallSession, CallStatus, EndReason, SpeakerRole, TransferType,
};
use voicebridge_inference::InferenceClient;
use voicebridge_llm::{LlmEvent, RealtimeConfig, RealtimeSession, SessionSetup};
use voicebridge_platform::{CompletionReport, PlatformClient};
use voicebridge_telephony::{outbound, twiml, StreamEvent, TwilioClient};
use voicebridge_tools::{build_tool_definitions, ToolEngine, ToolEvent, ToolOutcome};

use crate::messages::PipelineMsg;
use crate::sentence::SentenceChunker;
use crate::speech::{Speaker, SPEECH_END_MARK};
use crate::summarize::{self, SummarizerConfig, SUMMARIZE_THRESHOLD_WORDS};
use crate::turn::{self, EndDisposition, IngestAction};

const DEFAULT_FILLER_PHRASES: &[&str] = &["One moment.", "Let me check that.", "Just a second."];

/// Process-level pipeline settings shared by every call.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub realtime: RealtimeConfig,
    pub summarizer: SummarizerConfig,
    /// Fallback when the assistant config has no silence timeout.
    pub silence_timeout_secs: u64,
    /// Fallback when the assistant config has no max duration.
    pub max_duration_secs: u64,
}

/// The per-call pipeline. Constructed by the adapter once the session is
/// registered, then driven entirely by its inbox.
pub struct CallPipeline {
    session: Arc<CallSession>,
    registry: Arc<CallRegistry>,
    inference: InferenceClient,
    platform: PlatformClient,
    twilio: TwilioClient,
    tools: ToolEngine,
    config: PipelineConfig,
    telephony_tx: mpsc::UnboundedSender<String>,
    tx: mpsc::UnboundedSender<PipelineMsg>,
    speaker: Speaker,
    chunker: SentenceChunker,
    llm: Option<RealtimeSession>,
    /// Media arriving before both sockets are up is queued, not dropped.
    ready: bool,
    pending_media: VecDeque<String>,
    http: reqwest::Client,
}

impl CallPipeline {
    /// Wire up a call and spawn its pipeline task. The returned sender is
    /// the call's inbox; the adapter feeds stream events into it. It must
    /// be registered as the message handler before the LLM connect starts,
    /// which `run` guarantees by spawning the connect from inside the task.
    pub fn start(
        session: Arc<CallSession>,
        registry: Arc<CallRegistry>,
        inference: InferenceClient,
        platform: PlatformClient,
        config: PipelineConfig,
        telephony_tx: mpsc::UnboundedSender<String>,
    ) -> mpsc::UnboundedSender<PipelineMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        let twilio = TwilioClient::new(&session.twilio.account_sid, &session.twilio.auth_token);
        let speaker = Speaker::spawn(
            Arc::clone(&session),
            inference.clone(),
            telephony_tx.clone(),
            tx.clone(),
        );
        let pipeline = Self {
            session,
            registry,
            inference,
            platform,
            twilio,
            tools: ToolEngine::new(),
            config,
            telephony_tx,
            tx: tx.clone(),
            speaker,
            chunker: SentenceChunker::new(),
            llm: None,
            ready: false,
            pending_media: VecDeque::new(),
            http: reqwest::Client::new(),
        };
        tokio::spawn(pipeline.run(rx));
        tx
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<PipelineMsg>) {
        self.spawn_llm_connect();
        while let Some(msg) = inbox.recv().await {
            self.handle(msg).await;
            if self.session.status() == CallStatus::Ended {
                break;
            }
        }
        // The adapter dropped the inbox (socket gone) or we broke out.
        if self.session.status() != CallStatus::Ended {
            self.cleanup(EndReason::WsClosed).await;
        }
    }

    fn spawn_llm_connect(&self) {
        let realtime = self.config.realtime.clone();
        let inbox = self.tx.clone();
        tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<LlmEvent>();
            let forward = inbox.clone();
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    if forward.send(PipelineMsg::Llm(event)).is_err() {
                        break;
                    }
                }
            });
            let result = RealtimeSession::connect(realtime, event_tx).await;
            let _ = inbox.send(PipelineMsg::Init(result));
        });
    }

    async fn handle(&mut self, msg: PipelineMsg) {
        match msg {
            PipelineMsg::Init(Ok(llm)) => self.on_llm_ready(llm).await,
            PipelineMsg::Init(Err(e)) => {
                tracing::error!(call_sid = %self.session.call_sid, "LLM connect failed: {e}");
                self.on_llm_failed().await;
            }
            PipelineMsg::Stream(event) => self.on_stream_event(event).await,
            PipelineMsg::Llm(event) => self.on_llm_event(event).await,
            PipelineMsg::VadResult { batch, reply } => self.on_vad_result(batch, reply).await,
            PipelineMsg::TurnResult { audio, check, stt } => {
                self.on_turn_result(audio, check, stt)
            }
            PipelineMsg::SttResult { text } => self.on_stt_result(text),
            PipelineMsg::ToolResult { call_id, outcome } => {
                self.on_tool_result(call_id, outcome).await
            }
            PipelineMsg::SummaryResult { summary } => self.on_summary(summary),
            PipelineMsg::SynthesisIdle => self.restart_silence_timer(),
            PipelineMsg::SilenceTimeout => self.end_call(EndReason::SilenceTimeout).await,
            PipelineMsg::MaxDuration => self.end_call(EndReason::MaxDuration).await,
            PipelineMsg::EndCall(reason) => self.end_call(reason).await,
        }
    }

    // --- setup ----------------------------------------------------------

    async fn on_llm_ready(&mut self, llm: RealtimeSession) {
        let setup = SessionSetup {
            instructions: self.session.config.system_prompt.clone(),
            tools: build_tool_definitions(&self.session.config),
        };
        if let Err(e) = llm.configure(&setup) {
            tracing::error!(call_sid = %self.session.call_sid, "LLM session configure failed: {e}");
        }
        self.llm = Some(llm);
        self.become_ready().await;
    }

    /// The LLM never came up. The call still gets the first message and a
    /// working audio path so the silence timer can wind it down; there is
    /// no mid-call reconnect because the conversation context would be
    /// gone anyway.
    async fn on_llm_failed(&mut self) {
        self.llm = None;
        self.become_ready().await;
    }

    async fn become_ready(&mut self) {
        self.session.set_status(CallStatus::Active);
        self.start_max_duration_timer();
        self.restart_silence_timer();

        if let Some(first) = self.session.config.first_message.clone() {
            self.session.push_transcript(SpeakerRole::Assistant, &first);
            self.speaker.enqueue(&self.session, first);
        }

        self.ready = true;
        let queued: Vec<String> = self.pending_media.drain(..).collect();
        for payload in queued {
            self.on_media(payload).await;
        }
    }

    // --- telephony stream ------------------------------------------------

    async fn on_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {}
            StreamEvent::Start { start } => {
                // Set unconditionally, even while setup is still running:
                // synthesis cannot address the stream without it.
                self.session.set_stream_sid(&start.stream_sid);
                tracing::info!(call_sid = %self.session.call_sid, stream_sid = %start.stream_sid, "Stream started");
            }
            StreamEvent::Media { media } => {
                if self.ready {
                    self.on_media(media.payload).await;
                } else {
                    self.pending_media.push_back(media.payload);
                }
            }
            StreamEvent::Mark { mark } => {
                if mark.name == SPEECH_END_MARK {
                    self.session.ai_speaking.store(false, Ordering::SeqCst);
                    self.restart_silence_timer();
                }
            }
            StreamEvent::Stop => {
                tracing::info!(call_sid = %self.session.call_sid, "Stream stopped by provider");
                self.cleanup(EndReason::WsClosed).await;
            }
        }
    }

    async fn on_media(&mut self, payload_b64: String) {
        let ulaw = match BASE64.decode(payload_b64.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(call_sid = %self.session.call_sid, "Undecodable media payload: {e}");
                return;
            }
        };
        let pcm = audio::ulaw_to_pcm16_16k(&ulaw);
        let Some(batch) = self.session.push_vad_frame(&pcm) else {
            return;
        };

        self.session.push_preroll(&batch);

        let action = turn::ingest_action(
            audio::is_silence(&batch),
            self.session.user_speaking.load(Ordering::SeqCst),
            self.session.awaiting_turn_confirmation.load(Ordering::SeqCst),
            self.session.vad_in_flight.load(Ordering::SeqCst),
        );
        match action {
            IngestAction::DropSilence | IngestAction::Discard => {}
            IngestAction::AppendToSpeech => self.session.append_speech(&batch),
            IngestAction::Dispatch => {
                self.session.vad_in_flight.store(true, Ordering::SeqCst);
                let inference = self.inference.clone();
                let session = Arc::clone(&self.session);
                let inbox = self.tx.clone();
                tokio::spawn(async move {
                    let wav = audio::pcm16_to_wav_base64(&batch, 16000);
                    let reply = match inference.detect_vad(&wav, &session.session_id).await {
                        Ok(reply) => Some(reply),
                        Err(e) => {
                            tracing::warn!(call_sid = %session.call_sid, "VAD request failed, dropping batch: {e}");
                            None
                        }
                    };
                    let _ = inbox.send(PipelineMsg::VadResult { batch, reply });
                });
            }
        }
    }

    // --- VAD state machine -----------------------------------------------

    async fn on_vad_result(
        &mut self,
        batch: Vec<u8>,
        reply: Option<voicebridge_inference::VadReply>,
    ) {
        // Release the guard no matter how the request went.
        self.session.vad_in_flight.store(false, Ordering::SeqCst);
        let Some(reply) = reply else { return };

        // Fast-interrupt pre-pass; deliberately no early return so the
        // caller's audio still lands in the speech buffer below.
        let (count, fires) = turn::fast_interrupt_step(
            self.session.ai_speaking.load(Ordering::SeqCst),
            reply.probability,
            self.session.fast_interrupt_count.load(Ordering::SeqCst),
        );
        self.session
            .fast_interrupt_count
            .store(count, Ordering::SeqCst);
        if fires {
            self.interrupt();
        }

        match reply.event {
            voicebridge_inference::VadEvent::SpeechStart => self.on_speech_start(batch),
            voicebridge_inference::VadEvent::Silence => self.on_silence(),
            voicebridge_inference::VadEvent::SpeechEnd => self.on_speech_end(),
        }
    }

    fn on_speech_start(&mut self, batch: Vec<u8>) {
        let s = Arc::clone(&self.session);
        if s.awaiting_turn_confirmation.load(Ordering::SeqCst) {
            // Continuation of a held turn: the buffer keeps the prior
            // audio, only the silence accounting starts over.
            s.turn_silence_ms.store(0, Ordering::SeqCst);
            s.user_speaking.store(true, Ordering::SeqCst);
            s.clear_silence_timer();
            s.append_speech(&batch);
        } else if !s.user_speaking.load(Ordering::SeqCst) {
            // New turn.
            s.user_speaking.store(true, Ordering::SeqCst);
            s.start_turn();
            s.clear_silence_timer();
            s.speech_started_during_ai
                .store(s.ai_speaking.load(Ordering::SeqCst), Ordering::SeqCst);
            let preroll = s.drain_preroll();
            s.prepend_speech(preroll);
            s.append_speech(&batch);
        } else {
            s.append_speech(&batch);
        }

        let confirmed = s.speech_start_count.fetch_add(1, Ordering::SeqCst) + 1;
        if confirmed >= turn::INTERRUPT_THRESHOLD && s.ai_speaking.load(Ordering::SeqCst) {
            s.speech_started_during_ai.store(false, Ordering::SeqCst);
            self.interrupt();
        }

        if !self
            .session
            .awaiting_turn_confirmation
            .load(Ordering::SeqCst)
        {
            if let Some(elapsed) = self.session.turn_elapsed_ms() {
                if elapsed > turn::MAX_SPEECH_MS {
                    tracing::info!(call_sid = %self.session.call_sid, "Max speech reached, forcing transcription");
                    self.force_transcribe();
                }
            }
        }
    }

    fn on_silence(&mut self) {
        let s = Arc::clone(&self.session);
        if !s.awaiting_turn_confirmation.load(Ordering::SeqCst) {
            s.speech_start_count.store(0, Ordering::SeqCst);
            return;
        }
        // Smart-turn fallback is an accumulator over VAD silence batches,
        // NOT a timer: a timer restarts on every reflexive "hello?" and
        // was measured at ~26 s of added latency.
        let silence_ms = s.turn_silence_ms.fetch_add(turn::BATCH_MS, Ordering::SeqCst) + turn::BATCH_MS;
        if silence_ms >= turn::TURN_CONFIRMATION_SILENCE_MS {
            s.awaiting_turn_confirmation.store(false, Ordering::SeqCst);
            s.turn_silence_ms.store(0, Ordering::SeqCst);
            self.force_transcribe();
            self.restart_silence_timer();
        }
    }

    fn on_speech_end(&mut self) {
        let s = Arc::clone(&self.session);
        let continuation = s.awaiting_turn_confirmation.load(Ordering::SeqCst);
        let duration_ms = s.turn_elapsed_ms().unwrap_or(0);
        let started_during_ai = s.speech_started_during_ai.load(Ordering::SeqCst);
        let confirmed = s.speech_start_count.load(Ordering::SeqCst);
        let audio_buf = s.take_speech_buffer();

        s.user_speaking.store(false, Ordering::SeqCst);
        s.speech_start_count.store(0, Ordering::SeqCst);
        s.clear_turn_start();

        match turn::speech_end_disposition(
            continuation,
            duration_ms,
            started_during_ai,
            confirmed,
            audio_buf.is_empty(),
        ) {
            EndDisposition::DiscardShort => {
                tracing::debug!(call_sid = %s.call_sid, duration_ms, "Sub-minimum burst discarded");
                self.restart_silence_timer();
            }
            EndDisposition::DiscardEcho => {
                tracing::debug!(call_sid = %s.call_sid, "Speech during AI playback discarded");
                self.restart_silence_timer();
            }
            EndDisposition::EmptyBuffer => {
                s.awaiting_turn_confirmation.store(false, Ordering::SeqCst);
                self.restart_silence_timer();
            }
            EndDisposition::Transcribe => self.spawn_turn_check(audio_buf),
        }
    }

    /// Run smart-turn and STT concurrently over the same buffer. When the
    /// turn is complete the transcript is already in hand (zero added
    /// latency); when it is not, one STT call was wasted.
    fn spawn_turn_check(&self, audio_buf: Vec<u8>) {
        let s = &self.session;
        if s.stt_in_flight.swap(true, Ordering::SeqCst) {
            // Put the turn back; it rides along with the next speech_end.
            tracing::warn!(call_sid = %s.call_sid, "STT already in flight, holding turn");
            s.prepend_speech(audio_buf);
            return;
        }
        let inference = self.inference.clone();
        let language = s.active_language();
        let inbox = self.tx.clone();
        tokio::spawn(async move {
            let wav = audio::pcm16_to_wav_base64(&audio_buf, 16000);
            let (check, stt) = tokio::join!(
                inference.check_turn(&wav),
                inference.transcribe(&wav, &language),
            );
            let _ = inbox.send(PipelineMsg::TurnResult {
                audio: audio_buf,
                check: check
                    .map_err(|e| tracing::warn!("Smart-turn check failed: {e}"))
                    .ok(),
                stt: stt.map_err(|e| tracing::warn!("STT failed: {e}")).ok(),
            });
        });
    }

    fn on_turn_result(
        &mut self,
        audio_buf: Vec<u8>,
        check: Option<voicebridge_inference::TurnCheck>,
        stt: Option<voicebridge_inference::Transcription>,
    ) {
        let s = Arc::clone(&self.session);
        s.stt_in_flight.store(false, Ordering::SeqCst);

        // A failed smart-turn check counts as complete; stalling the
        // caller on a dead classifier is worse than an early reply.
        let complete = check.map(|c| c.complete).unwrap_or(true);

        if !complete {
            tracing::debug!(call_sid = %s.call_sid, "Turn incomplete, holding buffer");
            // The STT result is discarded with the held turn.
            s.prepend_speech(audio_buf);
            s.awaiting_turn_confirmation.store(true, Ordering::SeqCst);
            s.turn_silence_ms.store(0, Ordering::SeqCst);
            return;
        }

        s.awaiting_turn_confirmation.store(false, Ordering::SeqCst);
        match stt {
            Some(t) if !t.text.trim().is_empty() => {
                self.deliver_user_text(t.text);
            }
            Some(_) => {
                tracing::debug!(call_sid = %self.session.call_sid, "Empty transcription, dropping turn");
            }
            None => self.spawn_stt_retry(audio_buf),
        }
        self.restart_silence_timer();
    }

    /// Sequential retry after a failed parallel STT.
    fn spawn_stt_retry(&self, audio_buf: Vec<u8>) {
        if self.session.stt_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let inference = self.inference.clone();
        let language = self.session.active_language();
        let inbox = self.tx.clone();
        tokio::spawn(async move {
            let wav = audio::pcm16_to_wav_base64(&audio_buf, 16000);
            let text = match inference.transcribe(&wav, &language).await {
                Ok(t) if !t.text.trim().is_empty() => Some(t.text),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("STT retry failed, dropping turn: {e}");
                    None
                }
            };
            let _ = inbox.send(PipelineMsg::SttResult { text });
        });
    }

    /// Flush the buffer and transcribe without a smart-turn check (forced
    /// paths: 20 s max speech, 3 s held-turn silence).
    fn force_transcribe(&self) {
        let s = &self.session;
        let audio_buf = s.take_speech_buffer();
        s.user_speaking.store(false, Ordering::SeqCst);
        s.speech_start_count.store(0, Ordering::SeqCst);
        s.clear_turn_start();
        if audio_buf.is_empty() {
            return;
        }
        self.spawn_stt_retry(audio_buf);
    }

    fn on_stt_result(&mut self, text: Option<String>) {
        self.session.stt_in_flight.store(false, Ordering::SeqCst);
        if let Some(text) = text {
            self.deliver_user_text(text);
        }
        self.restart_silence_timer();
    }

    fn deliver_user_text(&self, text: String) {
        tracing::info!(call_sid = %self.session.call_sid, "User: {text}");
        self.session.push_transcript(SpeakerRole::User, &text);
        match &self.llm {
            Some(llm) => {
                if let Err(e) = llm.send_user_message(&text) {
                    tracing::warn!(call_sid = %self.session.call_sid, "Failed to send user message: {e}");
                }
            }
            None => {
                tracing::warn!(call_sid = %self.session.call_sid, "No LLM session, transcript-only turn");
            }
        }
    }

    // --- LLM output -------------------------------------------------------

    async fn on_llm_event(&mut self, event: LlmEvent) {
        match event {
            LlmEvent::TextDelta(delta) => {
                for sentence in self.chunker.push(&delta) {
                    self.speaker.enqueue(&self.session, sentence);
                }
            }
            LlmEvent::TextDone(full) => {
                if let Some(rest) = self.chunker.flush() {
                    self.speaker.enqueue(&self.session, rest);
                }
                if !full.trim().is_empty() {
                    tracing::info!(call_sid = %self.session.call_sid, "Assistant: {full}");
                    self.session.push_transcript(SpeakerRole::Assistant, full);
                }
            }
            LlmEvent::ResponseCreated(_) | LlmEvent::ResponseDone(_) => {}
            LlmEvent::FunctionCall {
                call_id,
                name,
                arguments,
            } => self.on_function_call(call_id, name, arguments),
            LlmEvent::ItemCreated { id, .. } => {
                self.session.track_item(id);
                self.maybe_summarize();
            }
            LlmEvent::Error(e) => {
                tracing::warn!(call_sid = %self.session.call_sid, "LLM error: {e}");
            }
            LlmEvent::Closed => {
                // No mid-call reconnect: the remote context is gone. The
                // call winds down through the audio path.
                tracing::warn!(call_sid = %self.session.call_sid, "LLM socket closed mid-call");
                self.llm = None;
            }
        }
    }

    fn on_function_call(&mut self, call_id: String, name: String, arguments: Value) {
        tracing::info!(call_sid = %self.session.call_sid, tool = %name, "Tool call");

        // A filler phrase masks tool latency, but only when nothing is
        // playing; the serial queue keeps it ahead of the real response.
        if self.session.config.enable_filler_phrases
            && !self.session.ai_speaking.load(Ordering::SeqCst)
        {
            let configured = &self.session.config.filler_phrases;
            let phrase = if configured.is_empty() {
                DEFAULT_FILLER_PHRASES
                    .choose(&mut rand::thread_rng())
                    .map(|p| p.to_string())
            } else {
                configured.choose(&mut rand::thread_rng()).cloned()
            };
            if let Some(phrase) = phrase {
                self.speaker.enqueue(&self.session, phrase);
            }
        }

        let tools = self.tools.clone();
        let session = Arc::clone(&self.session);
        let inbox = self.tx.clone();
        tokio::spawn(async move {
            let outcome = tools.dispatch(&session, &name, &arguments).await;
            let _ = inbox.send(PipelineMsg::ToolResult { call_id, outcome });
        });
    }

    async fn on_tool_result(&mut self, call_id: String, outcome: ToolOutcome) {
        if let Some(llm) = &self.llm {
            if let Err(e) = llm.send_function_result(&call_id, &outcome.reply) {
                tracing::warn!(call_sid = %self.session.call_sid, "Failed to return tool result: {e}");
            }
        }
        if let Some(event) = outcome.event {
            self.on_tool_event(event).await;
        }
    }

    async fn on_tool_event(&mut self, event: ToolEvent) {
        match event {
            ToolEvent::EndCallRequested { reason } => {
                let reason = match reason.as_str() {
                    "user_requested" => EndReason::UserRequested,
                    "no_response" => EndReason::NoResponse,
                    _ => EndReason::Completed,
                };
                self.end_call(reason).await;
            }
            ToolEvent::TransferToNumber {
                phone_number,
                transfer_type,
                transfer_message,
                enable_client_message,
            } => {
                self.transfer_to_number(
                    phone_number,
                    transfer_type,
                    transfer_message,
                    enable_client_message,
                )
                .await;
            }
            ToolEvent::TransferToAgent {
                agent_id,
                delay_seconds,
                transfer_message,
                play_first_message,
            } => {
                self.transfer_to_agent(agent_id, delay_seconds, transfer_message, play_first_message)
                    .await;
            }
            ToolEvent::LanguageSwitched { language } => {
                tracing::info!(call_sid = %self.session.call_sid, %language, "Language switched");
            }
            ToolEvent::VoicemailDetected => {
                tracing::info!(call_sid = %self.session.call_sid, "Voicemail detected");
                if let Some(message) = self.session.config.voicemail_message.clone() {
                    // The model is expected to call end_call once this has
                    // been spoken.
                    self.speaker.enqueue(&self.session, message);
                }
            }
        }
    }

    // --- summarization ----------------------------------------------------

    fn maybe_summarize(&mut self) {
        let s = &self.session;
        if !s.config.context_summarization {
            return;
        }
        if s.transcript_word_count() <= SUMMARIZE_THRESHOLD_WORDS {
            return;
        }
        if s.summarizing.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(call_sid = %s.call_sid, "Transcript over threshold, summarizing");
        let transcript = s.transcript_snapshot();
        let http = self.http.clone();
        let config = self.config.summarizer.clone();
        let inbox = self.tx.clone();
        tokio::spawn(async move {
            let summary = summarize::summarize(&http, &config, &transcript).await;
            let _ = inbox.send(PipelineMsg::SummaryResult { summary });
        });
    }

    fn on_summary(&mut self, summary: Option<String>) {
        if let (Some(summary), Some(llm)) = (summary, &self.llm) {
            if let Err(e) =
                llm.inject_context(&format!("Conversation so far, summarized: {summary}"))
            {
                tracing::warn!(call_sid = %self.session.call_sid, "Failed to inject summary: {e}");
            } else {
                for item_id in self.session.take_tracked_items() {
                    let _ = llm.delete_item(&item_id);
                }
                self.session.clear_transcript();
                tracing::info!(call_sid = %self.session.call_sid, "Context replaced with summary");
            }
        }
        self.session.summarizing.store(false, Ordering::SeqCst);
    }

    // --- interrupts -------------------------------------------------------

    /// The caller barged in: stop everything queued for playback.
    fn interrupt(&mut self) {
        tracing::info!(call_sid = %self.session.call_sid, "Interrupt");
        if let Some(llm) = &self.llm {
            match llm.cancel_response() {
                Ok(Some(id)) => {
                    tracing::debug!(call_sid = %self.session.call_sid, response_id = %id, "Cancelled response")
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(call_sid = %self.session.call_sid, "Cancel failed: {e}")
                }
            }
        }
        if let Some(stream_sid) = self.session.stream_sid() {
            let _ = self.telephony_tx.send(outbound::clear(&stream_sid));
        }
        self.session.ai_speaking.store(false, Ordering::SeqCst);
        self.chunker.clear();
        self.session.clear_preroll();
        // Voids every queued synthesis task in one step.
        self.session.bump_epoch();
    }

    // --- transfers and teardown ------------------------------------------

    async fn transfer_to_number(
        &mut self,
        phone_number: String,
        transfer_type: TransferType,
        transfer_message: Option<String>,
        enable_client_message: bool,
    ) {
        if enable_client_message {
            if let Some(message) = transfer_message {
                self.speak_and_wait(message).await;
            }
        }
        if !self.session.begin_ending() {
            return;
        }
        let body = match transfer_type {
            TransferType::Conference => twiml::dial_number(&phone_number),
            TransferType::SipRefer => {
                let uri = if phone_number.starts_with("sip:") {
                    phone_number.clone()
                } else {
                    format!("sip:{phone_number}")
                };
                twiml::dial_sip(&uri)
            }
        };
        if let Err(e) = self
            .twilio
            .update_call_twiml(&self.session.call_sid, &body)
            .await
        {
            tracing::error!(call_sid = %self.session.call_sid, "Transfer update failed: {e}");
        }
        self.cleanup(EndReason::Transferred).await;
    }

    async fn transfer_to_agent(
        &mut self,
        agent_id: String,
        delay_seconds: Option<u64>,
        transfer_message: Option<String>,
        play_first_message: bool,
    ) {
        if let Some(message) = transfer_message {
            self.speak_and_wait(message).await;
        }
        if let Some(delay) = delay_seconds {
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
        let reply = match self
            .platform
            .transfer_agent_url(&self.session.call_sid, &agent_id)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // No target webhook means no transfer; the conversation
                // keeps going with the current assistant.
                tracing::error!(call_sid = %self.session.call_sid, "Transfer-agent lookup failed: {e}");
                return;
            }
        };
        if !self.session.begin_ending() {
            return;
        }
        tracing::info!(
            call_sid = %self.session.call_sid,
            %agent_id,
            play_first_message,
            "Handing call to agent webhook"
        );
        if let Err(e) = self
            .twilio
            .update_call_url(&self.session.call_sid, &reply.twiml_url)
            .await
        {
            tracing::error!(call_sid = %self.session.call_sid, "Transfer update failed: {e}");
        }
        self.cleanup(EndReason::Transferred).await;
    }

    /// Queue a sentence and wait for it to be handed to the provider, with
    /// a ceiling so a dead GPU cannot hold a transfer hostage.
    async fn speak_and_wait(&mut self, message: String) {
        let done = self.speaker.enqueue_notified(&self.session, message);
        if tokio::time::timeout(Duration::from_secs(15), done)
            .await
            .is_err()
        {
            tracing::warn!(call_sid = %self.session.call_sid, "Pre-transfer message timed out");
        }
    }

    async fn end_call(&mut self, reason: EndReason) {
        if !self.session.begin_ending() {
            return;
        }
        tracing::info!(call_sid = %self.session.call_sid, reason = reason.as_str(), "Ending call");
        if let Err(e) = self.twilio.complete_call(&self.session.call_sid).await {
            tracing::warn!(call_sid = %self.session.call_sid, "Hangup request failed: {e}");
        }
        self.cleanup(reason).await;
    }

    /// Idempotent teardown; every terminal path funnels through here.
    async fn cleanup(&mut self, reason: EndReason) {
        if !self.session.mark_ended() {
            return;
        }
        tracing::info!(call_sid = %self.session.call_sid, reason = reason.as_str(), "Cleaning up call");

        self.session.clear_timers();
        if let Some(llm) = self.llm.take() {
            llm.disconnect();
        }
        if let Err(e) = self.inference.reset_vad(&self.session.session_id).await {
            tracing::debug!(call_sid = %self.session.call_sid, "VAD reset failed: {e}");
        }

        let report = CompletionReport {
            call_sid: self.session.call_sid.clone(),
            assistant_id: self.session.assistant_id.clone(),
            organization_id: self.session.organization_id.clone(),
            end_reason: reason.as_str().to_string(),
            duration_seconds: self.session.elapsed_secs(),
            transcript: self.session.transcript_snapshot(),
            dynamic_variables: self.session.variables_snapshot(),
        };
        if let Err(e) = self.platform.complete_call(&report).await {
            tracing::warn!(call_sid = %self.session.call_sid, "Completion report failed: {e}");
        }

        self.registry.remove(&self.session.call_sid);
    }

    // --- timers -----------------------------------------------------------

    fn restart_silence_timer(&self) {
        let secs = self
            .session
            .config
            .silence_timeout_seconds
            .unwrap_or(self.config.silence_timeout_secs);
        let inbox = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = inbox.send(PipelineMsg::SilenceTimeout);
        });
        self.session.set_silence_timer(handle);
    }

    fn start_max_duration_timer(&self) {
        let secs = self
            .session
            .config
            .max_duration_seconds
            .unwrap_or(self.config.max_duration_secs);
        let inbox = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = inbox.send(PipelineMsg::MaxDuration);
        });
        self.session.set_max_duration_timer(handle);
    }
}
