//! Per-call session state
//!
//! One `CallSession` exists per live call, created when the audio
//! WebSocket opens and destroyed by the cleanup routine. Every buffer and
//! counter is initialized in the constructor; the first speech frame must
//! never observe a missing buffer.
//!
//! The pipeline task is the only writer for most fields, but synthesis
//! tasks and timers observe flags concurrently, so flags are atomics and
//! buffers sit behind short parking_lot locks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::assistant::{AssistantConfig, TwilioCredentials};
use crate::transcript::{SpeakerRole, TranscriptEntry};

/// 20 ms of PCM16 at 16 kHz.
pub const FRAME_BYTES: usize = 640;
/// Frames per VAD batch (200 ms).
pub const FRAMES_PER_BATCH: usize = 10;
/// Pre-roll ring capacity: the last 2 batches (400 ms).
pub const PREROLL_BATCHES: usize = 2;

/// Call lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Connecting,
    Active,
    Ending,
    Ended,
}

/// Why a call ended; serialized into the completion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    UserRequested,
    NoResponse,
    SilenceTimeout,
    MaxDuration,
    Transferred,
    Voicemail,
    WsClosed,
    WsError,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::UserRequested => "user_requested",
            EndReason::NoResponse => "no_response",
            EndReason::SilenceTimeout => "silence_timeout",
            EndReason::MaxDuration => "max_duration",
            EndReason::Transferred => "transferred",
            EndReason::Voicemail => "voicemail",
            EndReason::WsClosed => "ws_closed",
            EndReason::WsError => "ws_error",
        }
    }
}

/// State for one live call.
pub struct CallSession {
    // Identity
    pub call_sid: String,
    pub caller: String,
    pub assistant_id: String,
    pub organization_id: String,
    /// Fresh UUID, used as the GPU VAD session key.
    pub session_id: String,

    pub config: AssistantConfig,
    pub twilio: TwilioCredentials,

    status: Mutex<CallStatus>,
    pub created_at: Instant,

    // Turn-state flags
    pub user_speaking: AtomicBool,
    pub ai_speaking: AtomicBool,
    pub speech_started_during_ai: AtomicBool,
    pub awaiting_turn_confirmation: AtomicBool,
    pub vad_in_flight: AtomicBool,
    pub stt_in_flight: AtomicBool,
    pub summarizing: AtomicBool,

    // Audio buffers
    speech_buffer: Mutex<Vec<u8>>,
    vad_accumulator: Mutex<Vec<u8>>,
    preroll: Mutex<VecDeque<Vec<u8>>>,

    // Counters
    pub speech_start_count: AtomicU32,
    pub fast_interrupt_count: AtomicU32,
    pub turn_silence_ms: AtomicU64,
    turn_started_at: Mutex<Option<Instant>>,

    /// Bumped on interrupt; synthesis tasks from an older epoch are void.
    pub speech_epoch: AtomicU64,

    // Conversation state
    transcript: Mutex<Vec<TranscriptEntry>>,
    tracked_item_ids: Mutex<Vec<String>>,
    variables: Mutex<HashMap<String, String>>,

    // Active language and voice, updated by the language-switch tool.
    language: RwLock<String>,
    voice: RwLock<Option<String>>,

    stream_sid: Mutex<Option<String>>,

    // Timers
    silence_timer: Mutex<Option<JoinHandle<()>>>,
    max_duration_timer: Mutex<Option<JoinHandle<()>>>,
}

impl CallSession {
    /// Build a fully-initialized session. No buffer or counter is lazily
    /// created later; the hot audio path only appends.
    pub fn new(
        call_sid: impl Into<String>,
        caller: impl Into<String>,
        assistant_id: impl Into<String>,
        organization_id: impl Into<String>,
        config: AssistantConfig,
    ) -> Self {
        let language = config.language.clone();
        let voice = config.voice_for_language(&language);
        let twilio = TwilioCredentials {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
        };
        Self {
            call_sid: call_sid.into(),
            caller: caller.into(),
            assistant_id: assistant_id.into(),
            organization_id: organization_id.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            config,
            twilio,
            status: Mutex::new(CallStatus::Connecting),
            created_at: Instant::now(),
            user_speaking: AtomicBool::new(false),
            ai_speaking: AtomicBool::new(false),
            speech_started_during_ai: AtomicBool::new(false),
            awaiting_turn_confirmation: AtomicBool::new(false),
            vad_in_flight: AtomicBool::new(false),
            stt_in_flight: AtomicBool::new(false),
            summarizing: AtomicBool::new(false),
            speech_buffer: Mutex::new(Vec::new()),
            vad_accumulator: Mutex::new(Vec::with_capacity(FRAME_BYTES * FRAMES_PER_BATCH)),
            preroll: Mutex::new(VecDeque::with_capacity(PREROLL_BATCHES)),
            speech_start_count: AtomicU32::new(0),
            fast_interrupt_count: AtomicU32::new(0),
            turn_silence_ms: AtomicU64::new(0),
            turn_started_at: Mutex::new(None),
            speech_epoch: AtomicU64::new(0),
            transcript: Mutex::new(Vec::new()),
            tracked_item_ids: Mutex::new(Vec::new()),
            variables: Mutex::new(HashMap::new()),
            language: RwLock::new(language),
            voice: RwLock::new(voice),
            stream_sid: Mutex::new(None),
            silence_timer: Mutex::new(None),
            max_duration_timer: Mutex::new(None),
        }
    }

    pub fn status(&self) -> CallStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: CallStatus) {
        *self.status.lock() = status;
    }

    /// Transition to `Ending` unless the call is already winding down.
    /// Returns false when a previous caller won the race; end-call is
    /// idempotent through this check.
    pub fn begin_ending(&self) -> bool {
        let mut status = self.status.lock();
        if matches!(*status, CallStatus::Ending | CallStatus::Ended) {
            return false;
        }
        *status = CallStatus::Ending;
        true
    }

    /// Transition to `Ended`. Returns true only for the first caller, so
    /// cleanup runs exactly once.
    pub fn mark_ended(&self) -> bool {
        let mut status = self.status.lock();
        if *status == CallStatus::Ended {
            return false;
        }
        *status = CallStatus::Ended;
        true
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status(), CallStatus::Connecting | CallStatus::Active)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }

    // --- audio buffers ------------------------------------------------

    /// Append one decoded 20 ms frame; returns a full 200 ms batch once
    /// ten frames have accumulated.
    pub fn push_vad_frame(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let mut acc = self.vad_accumulator.lock();
        acc.extend_from_slice(frame);
        if acc.len() >= FRAME_BYTES * FRAMES_PER_BATCH {
            Some(std::mem::take(&mut *acc))
        } else {
            None
        }
    }

    /// Record a batch in the pre-roll ring, evicting FIFO beyond two.
    pub fn push_preroll(&self, batch: &[u8]) {
        let mut ring = self.preroll.lock();
        if ring.len() >= PREROLL_BATCHES {
            ring.pop_front();
        }
        ring.push_back(batch.to_vec());
    }

    /// Concatenate and clear the pre-roll ring.
    pub fn drain_preroll(&self) -> Vec<u8> {
        let mut ring = self.preroll.lock();
        let mut out = Vec::new();
        for batch in ring.drain(..) {
            out.extend_from_slice(&batch);
        }
        out
    }

    pub fn clear_preroll(&self) {
        self.preroll.lock().clear();
    }

    pub fn preroll_len(&self) -> usize {
        self.preroll.lock().len()
    }

    pub fn append_speech(&self, audio: &[u8]) {
        self.speech_buffer.lock().extend_from_slice(audio);
    }

    /// Prepend audio captured before speech was confirmed.
    pub fn prepend_speech(&self, audio: Vec<u8>) {
        if audio.is_empty() {
            return;
        }
        let mut buffer = self.speech_buffer.lock();
        let mut combined = audio;
        combined.extend_from_slice(&buffer);
        *buffer = combined;
    }

    pub fn take_speech_buffer(&self) -> Vec<u8> {
        std::mem::take(&mut *self.speech_buffer.lock())
    }

    pub fn speech_buffer_len(&self) -> usize {
        self.speech_buffer.lock().len()
    }

    // --- turn bookkeeping ---------------------------------------------

    pub fn start_turn(&self) {
        *self.turn_started_at.lock() = Some(Instant::now());
    }

    pub fn clear_turn_start(&self) {
        *self.turn_started_at.lock() = None;
    }

    pub fn turn_elapsed_ms(&self) -> Option<u64> {
        self.turn_started_at
            .lock()
            .map(|t| t.elapsed().as_millis() as u64)
    }

    // --- conversation state -------------------------------------------

    pub fn push_transcript(&self, role: SpeakerRole, message: impl Into<String>) {
        self.transcript
            .lock()
            .push(TranscriptEntry::new(role, message, self.elapsed_secs()));
    }

    pub fn transcript_snapshot(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().clone()
    }

    pub fn transcript_word_count(&self) -> usize {
        self.transcript.lock().iter().map(|e| e.word_count()).sum()
    }

    pub fn clear_transcript(&self) {
        self.transcript.lock().clear();
    }

    pub fn track_item(&self, item_id: impl Into<String>) {
        self.tracked_item_ids.lock().push(item_id.into());
    }

    pub fn take_tracked_items(&self) -> Vec<String> {
        std::mem::take(&mut *self.tracked_item_ids.lock())
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.lock().insert(name.into(), value.into());
    }

    pub fn variables_snapshot(&self) -> HashMap<String, String> {
        self.variables.lock().clone()
    }

    // --- language -----------------------------------------------------

    pub fn active_language(&self) -> String {
        self.language.read().clone()
    }

    pub fn active_voice(&self) -> Option<String> {
        self.voice.read().clone()
    }

    pub fn switch_language(&self, language: impl Into<String>) {
        let language = language.into();
        let voice = self.config.language_voices.get(&language).cloned();
        *self.voice.write() = voice;
        *self.language.write() = language;
    }

    // --- telephony stream ----------------------------------------------

    pub fn set_stream_sid(&self, sid: impl Into<String>) {
        *self.stream_sid.lock() = Some(sid.into());
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.lock().clone()
    }

    // --- timers ---------------------------------------------------------

    /// Replace the silence hangup timer, aborting any previous one.
    pub fn set_silence_timer(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.silence_timer.lock().replace(handle) {
            old.abort();
        }
    }

    pub fn clear_silence_timer(&self) {
        if let Some(old) = self.silence_timer.lock().take() {
            old.abort();
        }
    }

    pub fn set_max_duration_timer(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.max_duration_timer.lock().replace(handle) {
            old.abort();
        }
    }

    pub fn clear_timers(&self) {
        self.clear_silence_timer();
        if let Some(old) = self.max_duration_timer.lock().take() {
            old.abort();
        }
    }

    // --- epoch-based cancellation ---------------------------------------

    pub fn current_epoch(&self) -> u64 {
        self.speech_epoch.load(Ordering::Acquire)
    }

    /// Invalidate all queued synthesis tasks.
    pub fn bump_epoch(&self) -> u64 {
        self.speech_epoch.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantConfig;

    fn session() -> CallSession {
        CallSession::new("CA123", "+15550001111", "asst_1", "org_1", AssistantConfig::default())
    }

    #[test]
    fn test_constructed_fully_initialized() {
        let s = session();
        assert_eq!(s.status(), CallStatus::Connecting);
        assert_eq!(s.speech_buffer_len(), 0);
        assert_eq!(s.preroll_len(), 0);
        assert!(!s.user_speaking.load(Ordering::Relaxed));
        assert!(!s.session_id.is_empty());
    }

    #[test]
    fn test_vad_accumulator_batches_at_ten_frames() {
        let s = session();
        let frame = vec![1u8; FRAME_BYTES];
        for _ in 0..9 {
            assert!(s.push_vad_frame(&frame).is_none());
        }
        let batch = s.push_vad_frame(&frame).expect("tenth frame completes a batch");
        assert_eq!(batch.len(), FRAME_BYTES * FRAMES_PER_BATCH);
        // Accumulator starts over.
        assert!(s.push_vad_frame(&frame).is_none());
    }

    #[test]
    fn test_preroll_ring_evicts_fifo() {
        let s = session();
        s.push_preroll(&[1u8; 4]);
        s.push_preroll(&[2u8; 4]);
        s.push_preroll(&[3u8; 4]);
        assert_eq!(s.preroll_len(), 2);
        let drained = s.drain_preroll();
        assert_eq!(&drained[..4], &[2u8; 4]);
        assert_eq!(&drained[4..], &[3u8; 4]);
        assert_eq!(s.preroll_len(), 0);
    }

    #[test]
    fn test_prepend_speech_orders_preroll_first() {
        let s = session();
        s.append_speech(&[9u8; 2]);
        s.prepend_speech(vec![7u8; 2]);
        assert_eq!(s.take_speech_buffer(), vec![7, 7, 9, 9]);
    }

    #[test]
    fn test_ending_transitions_are_idempotent() {
        let s = session();
        assert!(s.begin_ending());
        assert!(!s.begin_ending());
        assert!(s.mark_ended());
        assert!(!s.mark_ended());
        assert!(!s.begin_ending());
    }

    #[test]
    fn test_language_switch_updates_voice() {
        let config: AssistantConfig = serde_json::from_str(
            r#"{"system_prompt":"x","voice":"alloy","language_voices":{"de":"vicki"}}"#,
        )
        .unwrap();
        let s = CallSession::new("CA1", "+1", "a", "o", config);
        assert_eq!(s.active_voice().as_deref(), Some("alloy"));
        s.switch_language("de");
        assert_eq!(s.active_language(), "de");
        assert_eq!(s.active_voice().as_deref(), Some("vicki"));
        // No mapping: fall through to the GPU default.
        s.switch_language("fr");
        assert_eq!(s.active_voice(), None);
    }

    #[test]
    fn test_epoch_bump_invalidates() {
        let s = session();
        let before = s.current_epoch();
        let after = s.bump_epoch();
        assert_eq!(after, before + 1);
        assert_eq!(s.current_epoch(), after);
    }
}
