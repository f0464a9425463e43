//! Sentence splitter (§4.5, §9, §8 property 4): a buffer plus a regex scan on
//! each token append. Detected prefixes are consumed and trailing boundary
//! whitespace trimmed before being handed to TTS.

use once_cell::sync::Lazy;
use regex::Regex;

static BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])\s+").unwrap());

pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self { buffer: String::new() }
    }

    /// Appends a token (arbitrary-sized chunk of streamed text) and returns any
    /// complete sentences it completed.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        let mut sentences = Vec::new();

        loop {
            let Some(m) = BOUNDARY.find(&self.buffer) else {
                break;
            };
            let sentence = self.buffer[..m.end()].trim_end().to_string();
            sentences.push(sentence);
            self.buffer.drain(..m.end());
        }

        sentences
    }

    /// Flushes any non-empty residual as a final sentence (called at stream end).
    pub fn flush(&mut self) -> Option<String> {
        let residual = self.buffer.trim();
        if residual.is_empty() {
            self.buffer.clear();
            return None;
        }
        let out = residual.to_string();
        self.buffer.clear();
        Some(out)
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_whole_string_in_one_push() {
        let mut splitter = SentenceSplitter::new();
        let sentences = splitter.push("Hi there. How are you?");
        assert_eq!(sentences, vec!["Hi there."]);
        assert_eq!(splitter.flush(), Some("How are you?".to_string()));
    }

    #[test]
    fn splits_across_many_small_tokens() {
        let mut splitter = SentenceSplitter::new();
        let mut out = Vec::new();
        for tok in ["Hi ", "there", ". ", "How", " are", " you", "?"] {
            out.extend(splitter.push(tok));
        }
        if let Some(residual) = splitter.flush() {
            out.push(residual);
        }
        assert_eq!(out, vec!["Hi there.", "How are you?"]);
    }

    #[test]
    fn flush_of_empty_buffer_is_none() {
        let mut splitter = SentenceSplitter::new();
        splitter.push("Complete sentence. ");
        splitter.flush();
        assert_eq!(splitter.flush(), None);
    }
}
