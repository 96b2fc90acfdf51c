//! Where a decode loop delivers its tokens

use std::ops::ControlFlow;

use anyhow::Result;

use super::channel::ChunkSender;
use super::streamer::{Detokenize, TextStreamer};

/// Receives token ids from a generation engine, one at a time.
///
/// `Break` tells the engine to stop decoding: either the token budget is
/// spent or nobody is reading the output anymore.
pub trait TokenSink {
    fn put(&mut self, token: u32) -> Result<ControlFlow<()>>;
}

/// Decodes tokens into text and forwards it over a [`ChunkSender`].
///
/// Tokens past `max_new_tokens` are discarded even if the engine keeps
/// calling `put`.
pub struct TextSink<D> {
    streamer: TextStreamer<D>,
    sender: ChunkSender,
    max_new_tokens: usize,
    generated: usize,
}

impl<D: Detokenize> TextSink<D> {
    pub fn new(decoder: D, sender: ChunkSender, max_new_tokens: usize) -> Self {
        Self {
            streamer: TextStreamer::new(decoder),
            sender,
            max_new_tokens,
            generated: 0,
        }
    }

    /// Feed the prompt so it appears at the start of the output.
    /// Does not count against the token budget.
    pub fn prime(&mut self, prompt_ids: &[u32]) -> Result<()> {
        if let Some(text) = self.streamer.put_all(prompt_ids)? {
            self.sender.push(text);
        }
        Ok(())
    }

    /// Number of generated tokens accepted so far
    pub fn generated(&self) -> usize {
        self.generated
    }

    /// Whether the budget has been spent
    pub fn is_exhausted(&self) -> bool {
        self.generated >= self.max_new_tokens
    }

    /// Whether the consumer has gone away
    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }

    /// Flush held-back text and end the stream, or fail it with `result`'s
    /// error.
    pub fn finish(mut self, result: Result<()>) {
        let result = result.and_then(|()| self.streamer.finish());
        match result {
            Ok(rest) => {
                if let Some(text) = rest {
                    self.sender.push(text);
                }
                self.sender.close();
            }
            Err(err) => self.sender.fail(err),
        }
    }
}

impl<D: Detokenize> TokenSink for TextSink<D> {
    fn put(&mut self, token: u32) -> Result<ControlFlow<()>> {
        if self.is_exhausted() {
            return Ok(ControlFlow::Break(()));
        }
        self.generated += 1;

        if let Some(text) = self.streamer.put(token)? {
            self.sender.push(text);
        }

        if self.is_cancelled() || self.is_exhausted() {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }
}
