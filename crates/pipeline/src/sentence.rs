//! Sentence chunking for streamed LLM output
//!
//! Tokens accumulate until a sentence boundary appears, then the finished
//! sentence goes to the synthesis queue. Boundary detection must not fire
//! on abbreviations or decimals; model output is full of "Dr. Smith" and
//! "$3.50" and a naive split fragments speech mid-word.

use once_cell::sync::Lazy;
use regex::Regex;

/// Candidate boundary: terminal punctuation, optional closing quote or
/// bracket, then whitespace. Decimals never match because a digit follows
/// the period directly.
static BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]+["')\]]*\s"#).expect("static regex"));

/// Words a period does not end a sentence after.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "fig", "no", "dept", "approx",
];

/// Incremental sentence splitter over streamed tokens.
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token; returns any sentences completed by it.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut sentences = Vec::new();

        let mut search_from = 0;
        loop {
            let (start, end) = match BOUNDARY.find_at(&self.buffer, search_from) {
                Some(found) => (found.start(), found.end()),
                None => break,
            };
            if !self.is_sentence_end(start) {
                search_from = end;
                continue;
            }
            let sentence = self.buffer[..end].trim().to_string();
            self.buffer.drain(..end);
            search_from = 0;
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
        }
        sentences
    }

    /// Whether the match starting at `punct_start` really ends a sentence.
    fn is_sentence_end(&self, punct_start: usize) -> bool {
        if self.buffer.as_bytes()[punct_start] != b'.' {
            // '!' and '?' always terminate.
            return true;
        }
        let head = &self.buffer[..punct_start];
        let word: &str = head
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(['(', '"', '\'']);
        if word.is_empty() {
            return false;
        }
        // "e.g." / "i.e." / "U.S." carry internal periods.
        if word.contains('.') {
            return false;
        }
        // Single-letter initials: "John Q. Public".
        if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) {
            return false;
        }
        !ABBREVIATIONS.contains(&word.to_lowercase().as_str())
    }

    /// Whatever is left after the stream finished.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(text: &str) -> Vec<String> {
        let mut chunker = SentenceChunker::new();
        let mut out = chunker.push(text);
        out.extend(chunker.flush());
        out
    }

    #[test]
    fn test_splits_plain_sentences() {
        let sentences = split_all("We are open 9 to 5. Come by any time! Does that help?");
        assert_eq!(
            sentences,
            vec![
                "We are open 9 to 5.",
                "Come by any time!",
                "Does that help?"
            ]
        );
    }

    #[test]
    fn test_streamed_tokens_emit_incrementally() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("We are open").is_empty());
        assert!(chunker.push(" 9 to 5").is_empty());
        let sentences = chunker.push(". Let me know ");
        assert_eq!(sentences, vec!["We are open 9 to 5."]);
        assert_eq!(chunker.flush().as_deref(), Some("Let me know"));
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        for text in [
            "Please ask for Dr. Smith at the desk.",
            "Mr. Jones will call you back.",
            "Bring your ID, e.g. a passport, with you.",
            "Talk to John Q. Public about that.",
        ] {
            let sentences = split_all(text);
            assert_eq!(sentences.len(), 1, "wrongly split: {text} -> {sentences:?}");
        }
    }

    #[test]
    fn test_decimals_do_not_split() {
        let sentences = split_all("The total is 3.14 dollars. Pay at the counter.");
        assert_eq!(
            sentences,
            vec!["The total is 3.14 dollars.", "Pay at the counter."]
        );
    }

    #[test]
    fn test_trailing_punctuation_without_space_waits() {
        let mut chunker = SentenceChunker::new();
        // No trailing whitespace yet; the sentence may continue ("...").
        assert!(chunker.push("One moment.").is_empty());
        let sentences = chunker.push(" Thanks for waiting. ");
        assert_eq!(sentences, vec!["One moment.", "Thanks for waiting."]);
    }

    #[test]
    fn test_clear_drops_pending() {
        let mut chunker = SentenceChunker::new();
        chunker.push("Partial sentence that never");
        chunker.clear();
        assert_eq!(chunker.flush(), None);
    }
}
