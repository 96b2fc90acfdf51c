//! Generation engines and the scheduler that runs them
//!
//! - `GenerationEngine`: the model boundary (tokenize, detokenize, decode loop)
//! - `CandleEngine`: llama-family checkpoints through candle
//! - `StubEngine`: scripted output, no weights
//! - `Scheduler`: admits jobs and runs each on its own OS thread

mod candle;
mod job;
mod scheduler;
mod stub;

pub use self::candle::CandleEngine;
pub use job::{GenerationJob, SamplingParams};
pub use scheduler::{GenerationSummary, Scheduler, StopReason, SubmitError};
pub use stub::StubEngine;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Backend, ModelConfig};
use crate::stream::{Detokenize, TokenSink};

/// A loaded model plus its tokenizer.
///
/// One instance is shared by every worker thread, so `generate` must keep all
/// per-run state (KV cache, RNG) local to the call.
pub trait GenerationEngine: Detokenize + Send + Sync {
    /// Identifier of the loaded model, for logs
    fn model_id(&self) -> &str;

    /// Encode text to token ids
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Run the decode loop, handing each new token to `sink`.
    ///
    /// Stops after `max_new_tokens`, at end of sequence, or as soon as the
    /// sink returns `Break`.
    fn generate(
        &self,
        prompt_ids: &[u32],
        max_new_tokens: usize,
        sampling: &SamplingParams,
        sink: &mut dyn TokenSink,
    ) -> Result<()>;
}

/// Load the engine selected by `config.backend`. Blocking.
pub fn load_engine(config: &ModelConfig) -> Result<Arc<dyn GenerationEngine>> {
    let engine: Arc<dyn GenerationEngine> = match config.backend {
        Backend::Candle => Arc::new(CandleEngine::load(config)?),
        Backend::Stub => Arc::new(StubEngine::new()),
    };
    Ok(engine)
}
