//! Incremental detokenization
//!
//! Decoding token ids one at a time produces broken text for tokenizers that
//! merge bytes across tokens, so the streamer re-decodes the ids of the
//! current word each time and only releases text once a word is complete.

use std::sync::Arc;

use anyhow::Result;

/// Anything that can turn token ids back into text
pub trait Detokenize {
    /// Decode a sequence of token ids
    fn detokenize(&self, ids: &[u32]) -> Result<String>;
}

impl<T: Detokenize + ?Sized> Detokenize for Arc<T> {
    fn detokenize(&self, ids: &[u32]) -> Result<String> {
        (**self).detokenize(ids)
    }
}

impl<T: Detokenize + ?Sized> Detokenize for &T {
    fn detokenize(&self, ids: &[u32]) -> Result<String> {
        (**self).detokenize(ids)
    }
}

/// Turns a stream of token ids into printable text chunks.
///
/// Text is released at word boundaries (up to the last space), on newlines,
/// and immediately after CJK ideographs, which have no spaces between words.
pub struct TextStreamer<D> {
    decoder: D,
    token_cache: Vec<u32>,
    /// Bytes of the decoded cache already handed out
    print_len: usize,
}

impl<D: Detokenize> TextStreamer<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            token_cache: Vec::new(),
            print_len: 0,
        }
    }

    /// Feed one token
    pub fn put(&mut self, token: u32) -> Result<Option<String>> {
        self.put_all(&[token])
    }

    /// Feed several tokens at once (used for the prompt)
    pub fn put_all(&mut self, tokens: &[u32]) -> Result<Option<String>> {
        self.token_cache.extend_from_slice(tokens);
        let text = self.decoder.detokenize(&self.token_cache)?;

        let printable = if text.ends_with('\n') {
            let printable = self.take(&text, text.len());
            self.reset();
            printable
        } else if text.chars().last().is_some_and(is_cjk) {
            self.take(&text, text.len())
        } else if text.ends_with(char::REPLACEMENT_CHARACTER) {
            // Incomplete multi-byte sequence, wait for the next token.
            None
        } else {
            let end = text.rfind(' ').map_or(0, |idx| idx + 1);
            self.take(&text, end)
        };

        Ok(printable)
    }

    /// Release whatever is still held back
    pub fn finish(&mut self) -> Result<Option<String>> {
        if self.token_cache.is_empty() {
            return Ok(None);
        }
        let text = self.decoder.detokenize(&self.token_cache)?;
        let printable = self.take(&text, text.len());
        self.reset();
        Ok(printable)
    }

    fn take(&mut self, text: &str, end: usize) -> Option<String> {
        if end <= self.print_len {
            return None;
        }
        let printable = text.get(self.print_len..end)?.to_string();
        self.print_len = end;
        Some(printable)
    }

    fn reset(&mut self) {
        self.token_cache.clear();
        self.print_len = 0;
    }
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per char; id 0 decodes to the replacement character.
    struct Chars;

    impl Detokenize for Chars {
        fn detokenize(&self, ids: &[u32]) -> Result<String> {
            Ok(ids
                .iter()
                .map(|&id| char::from_u32(id).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect())
        }
    }

    fn ids(text: &str) -> Vec<u32> {
        text.chars().map(u32::from).collect()
    }

    fn stream_all(text: &str) -> Vec<String> {
        let mut streamer = TextStreamer::new(Chars);
        let mut chunks = Vec::new();
        for id in ids(text) {
            chunks.extend(streamer.put(id).unwrap());
        }
        chunks.extend(streamer.finish().unwrap());
        chunks
    }

    #[test]
    fn test_emits_on_word_boundaries() {
        let chunks = stream_all("one two three");
        assert_eq!(chunks, vec!["one ", "two ", "three"]);
    }

    #[test]
    fn test_newline_flushes_line() {
        let chunks = stream_all("first line\nsecond");
        assert_eq!(chunks, vec!["first ", "line\n", "second"]);
    }

    #[test]
    fn test_cjk_is_emitted_immediately() {
        let chunks = stream_all("数字");
        assert_eq!(chunks, vec!["数", "字"]);
    }

    #[test]
    fn test_holds_back_incomplete_sequences() {
        let mut streamer = TextStreamer::new(Chars);
        assert_eq!(streamer.put_all(&ids("ab ")).unwrap().as_deref(), Some("ab "));
        assert_eq!(streamer.put(0).unwrap(), None);
    }

    #[test]
    fn test_prompt_then_tokens() {
        let mut streamer = TextStreamer::new(Chars);
        let head = streamer.put_all(&ids("An increasing sequence: one,")).unwrap();
        assert_eq!(head.as_deref(), Some("An increasing sequence: "));

        let mut rest = String::new();
        for id in ids(" two,") {
            if let Some(chunk) = streamer.put(id).unwrap() {
                rest.push_str(&chunk);
            }
        }
        assert_eq!(rest, "one, ");
        assert_eq!(streamer.finish().unwrap().as_deref(), Some("two,"));
        assert_eq!(streamer.finish().unwrap(), None);
    }

    #[test]
    fn test_concatenation_matches_full_decode() {
        let text = "An increasing sequence: one, two,\nthree, 四, five ";
        assert_eq!(stream_all(text).concat(), text);
    }
}
