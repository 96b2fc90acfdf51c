//! Scripted engine for running without model weights
//!
//! Tokens are Unicode scalar values, and the continuation counts upwards in
//! words (" two, three, four, ..."), so output is fully deterministic.

use std::time::Duration;

use anyhow::{bail, Result};

use super::{GenerationEngine, SamplingParams};
use crate::stream::{Detokenize, TokenSink};

const NUMBER_WORDS: &[&str] = &[
    "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven", "twelve",
    "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen", "twenty",
];

#[derive(Debug, Clone, Default)]
pub struct StubEngine {
    token_delay: Duration,
    fail_after: Option<usize>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before each token, to imitate a real decode step
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Fail the decode loop once `tokens` tokens have been produced
    pub fn with_failure_after(mut self, tokens: usize) -> Self {
        self.fail_after = Some(tokens);
        self
    }

    /// The first `max_new_tokens` characters this engine generates
    pub fn continuation(max_new_tokens: usize) -> String {
        script().take(max_new_tokens).collect()
    }
}

/// " two, three, ... twenty," repeated forever
fn script() -> impl Iterator<Item = char> {
    NUMBER_WORDS
        .iter()
        .cycle()
        .flat_map(|word| format!(" {word},").chars().collect::<Vec<_>>())
}

impl Detokenize for StubEngine {
    fn detokenize(&self, ids: &[u32]) -> Result<String> {
        Ok(ids
            .iter()
            .map(|&id| char::from_u32(id).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }
}

impl GenerationEngine for StubEngine {
    fn model_id(&self) -> &str {
        "stub"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn generate(
        &self,
        _prompt_ids: &[u32],
        max_new_tokens: usize,
        _sampling: &SamplingParams,
        sink: &mut dyn TokenSink,
    ) -> Result<()> {
        for (index, c) in script().take(max_new_tokens).enumerate() {
            if self.fail_after == Some(index) {
                bail!("stub engine failure after {} tokens", index);
            }
            if !self.token_delay.is_zero() {
                std::thread::sleep(self.token_delay);
            }
            if sink.put(u32::from(c))?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation() {
        assert_eq!(StubEngine::continuation(11), " two, three");
        assert_eq!(
            StubEngine::continuation(50),
            " two, three, four, five, six, seven, eight, nine, "
        );
    }

    #[test]
    fn test_tokenize_round_trips_text() {
        let engine = StubEngine::new();
        let ids = engine.tokenize("one, 二").unwrap();
        assert_eq!(ids.len(), 6);
        assert_eq!(engine.detokenize(&ids).unwrap(), "one, 二");
    }
}
