//! Streaming bridge between decode threads and response bodies
//!
//! - `channel`: single-producer/single-consumer chunk handoff
//! - `streamer`: token ids to word-aligned text
//! - `sink`: what engines push tokens into; enforces the token budget

mod channel;
mod sink;
mod streamer;

pub use channel::{channel, ChunkSender, ChunkStream};
pub use sink::{TextSink, TokenSink};
pub use streamer::{Detokenize, TextStreamer};
