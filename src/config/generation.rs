//! Generation configuration settings

use serde::{Deserialize, Serialize};

/// Prompt used when none is configured.
pub const DEFAULT_PROMPT: &str = "An increasing sequence: one,";

/// Configuration for text generation
///
/// Every request to `GET /` is served with these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Prompt the model continues
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Maximum number of new tokens to generate
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Leave the prompt out of the streamed text
    #[serde(default)]
    pub skip_prompt: bool,

    /// Temperature for sampling (0 = greedy)
    #[serde(default)]
    pub temperature: f64,

    /// Top-p nucleus sampling threshold (None = disabled)
    #[serde(default)]
    pub top_p: Option<f64>,

    /// Top-k sampling (None = disabled)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Repetition penalty (1.0 = no penalty)
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// How many trailing tokens the repetition penalty looks at
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,

    /// Sampling seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_max_new_tokens() -> usize {
    50
}

fn default_repeat_penalty() -> f32 {
    1.0
}

fn default_repeat_last_n() -> usize {
    64
}

fn default_seed() -> u64 {
    299_792_458
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            max_new_tokens: default_max_new_tokens(),
            skip_prompt: false,
            temperature: 0.0,
            top_p: None,
            top_k: None,
            repeat_penalty: default_repeat_penalty(),
            repeat_last_n: default_repeat_last_n(),
            seed: default_seed(),
        }
    }
}
