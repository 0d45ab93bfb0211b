//! Turn-taking rules
//!
//! The decision logic of the state machine, kept free of I/O so the edge
//! cases (coughs, AI echo, held turns, drop windows) are directly
//! testable. The pipeline task applies the returned actions.

/// One VAD batch covers 200 ms of audio.
pub const BATCH_MS: u64 = 200;
/// A turn longer than this is force-flushed to STT.
pub const MAX_SPEECH_MS: u64 = 20_000;
/// Anything shorter is a cough or a click, not speech.
pub const MIN_SPEECH_MS: u64 = 200;
/// Confirmed speech-start batches needed to interrupt the AI.
pub const INTERRUPT_THRESHOLD: u32 = 1;
/// VAD probability that counts toward the fast-interrupt path.
pub const FAST_INTERRUPT_PROBABILITY: f32 = 0.6;
/// Fast-interrupt batches needed while the AI speaks.
pub const FAST_INTERRUPT_THRESHOLD: u32 = 1;
/// Accumulated silence that releases a held (incomplete) turn.
pub const TURN_CONFIRMATION_SILENCE_MS: u64 = 3_000;

/// What to do with an incoming 200 ms batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestAction {
    /// Pure silence outside any turn: not worth a GPU round trip.
    DropSilence,
    /// A VAD request is in flight and the user is speaking: keep the
    /// audio so nothing is lost during the drop window.
    AppendToSpeech,
    /// A VAD request is in flight and nobody is speaking: discard.
    Discard,
    /// Take the in-flight guard and issue the request.
    Dispatch,
}

/// Decide how to handle a batch before the VAD sees it.
///
/// Silence batches during active speech MUST reach the server-side VAD;
/// its stop-frame counter cannot advance otherwise and the speech buffer
/// grows until the max-speech cutoff.
pub fn ingest_action(
    is_silent: bool,
    user_speaking: bool,
    awaiting_confirmation: bool,
    vad_in_flight: bool,
) -> IngestAction {
    if is_silent && !user_speaking && !awaiting_confirmation {
        return IngestAction::DropSilence;
    }
    if vad_in_flight {
        if user_speaking {
            IngestAction::AppendToSpeech
        } else {
            IngestAction::Discard
        }
    } else {
        IngestAction::Dispatch
    }
}

/// Advance the fast-interrupt counter for one VAD reply.
///
/// Returns the new counter value and whether the interrupt fires. The
/// counter resets on any batch where the AI is not speaking or the
/// probability is below threshold.
pub fn fast_interrupt_step(ai_speaking: bool, probability: f32, count: u32) -> (u32, bool) {
    if !ai_speaking || probability < FAST_INTERRUPT_PROBABILITY {
        return (0, false);
    }
    let count = count + 1;
    if count >= FAST_INTERRUPT_THRESHOLD {
        (0, true)
    } else {
        (count, false)
    }
}

/// What to do with a finished turn at speech_end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDisposition {
    /// Sub-minimum burst (cough, click): discard, no STT.
    DiscardShort,
    /// Speech that started while the AI was talking and never cleared the
    /// interrupt threshold: AI echo or background, discard.
    DiscardEcho,
    /// Nothing captured: just rearm the silence timer.
    EmptyBuffer,
    /// Run the parallel smart-turn check and transcription.
    Transcribe,
}

/// Classify a speech_end event.
///
/// A confirmation continuation (the turn was held as incomplete and the
/// caller resumed) bypasses the short-burst and echo gates: those already
/// passed when the turn first ended.
pub fn speech_end_disposition(
    continuation: bool,
    turn_duration_ms: u64,
    started_during_ai: bool,
    confirmed_starts: u32,
    buffer_empty: bool,
) -> EndDisposition {
    if !continuation && turn_duration_ms < MIN_SPEECH_MS {
        return EndDisposition::DiscardShort;
    }
    if !continuation && started_during_ai && confirmed_starts < INTERRUPT_THRESHOLD {
        return EndDisposition::DiscardEcho;
    }
    if buffer_empty {
        return EndDisposition::EmptyBuffer;
    }
    EndDisposition::Transcribe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_outside_turn_dropped() {
        assert_eq!(
            ingest_action(true, false, false, false),
            IngestAction::DropSilence
        );
    }

    #[test]
    fn test_silence_during_speech_never_dropped() {
        // The server-side stop-frame counter needs these batches.
        assert_eq!(
            ingest_action(true, true, false, false),
            IngestAction::Dispatch
        );
        assert_eq!(
            ingest_action(true, true, false, true),
            IngestAction::AppendToSpeech
        );
    }

    #[test]
    fn test_silence_while_awaiting_confirmation_delivered() {
        assert_eq!(
            ingest_action(true, false, true, false),
            IngestAction::Dispatch
        );
    }

    #[test]
    fn test_drop_window_discards_non_speech() {
        assert_eq!(
            ingest_action(false, false, false, true),
            IngestAction::Discard
        );
    }

    #[test]
    fn test_fast_interrupt_fires_at_threshold() {
        let (count, fires) = fast_interrupt_step(true, 0.7, 0);
        assert!(fires);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_fast_interrupt_resets_below_threshold() {
        assert_eq!(fast_interrupt_step(true, 0.5, 3), (0, false));
        assert_eq!(fast_interrupt_step(false, 0.9, 3), (0, false));
    }

    #[test]
    fn test_cough_discarded() {
        // 120 ms burst: under the minimum, no STT, no LLM.
        assert_eq!(
            speech_end_disposition(false, 120, false, 1, false),
            EndDisposition::DiscardShort
        );
    }

    #[test]
    fn test_ai_echo_discarded() {
        assert_eq!(
            speech_end_disposition(false, 800, true, 0, false),
            EndDisposition::DiscardEcho
        );
    }

    #[test]
    fn test_real_interrupt_transcribed() {
        // Cleared the interrupt threshold, so it is not echo.
        assert_eq!(
            speech_end_disposition(false, 800, true, 1, false),
            EndDisposition::Transcribe
        );
    }

    #[test]
    fn test_continuation_bypasses_gates() {
        // Held turn resumed with a short burst: still transcribed.
        assert_eq!(
            speech_end_disposition(true, 150, false, 0, false),
            EndDisposition::Transcribe
        );
    }

    #[test]
    fn test_empty_buffer_rearms_timer_only() {
        assert_eq!(
            speech_end_disposition(false, 500, false, 1, true),
            EndDisposition::EmptyBuffer
        );
    }
}
