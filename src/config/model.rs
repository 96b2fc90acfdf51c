//! Model configuration settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which generation engine backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Llama-family checkpoint run through candle
    #[default]
    Candle,
    /// Scripted engine, no weights needed
    Stub,
}

/// Model selection and placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Engine backend
    #[serde(default)]
    pub backend: Backend,

    /// HuggingFace hub repository id
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Hub revision (branch, tag or commit)
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Load tokenizer.json, config.json and weights from this directory
    /// instead of the hub
    #[serde(default)]
    pub local_dir: Option<PathBuf>,

    /// Data type for inference (f32, f16, bf16)
    #[serde(default = "default_dtype")]
    pub dtype: String,

    /// Force CPU even when an accelerator is available
    #[serde(default)]
    pub cpu: bool,

    /// Use flash attention. Loading fails unless built with `--features flash-attn`
    #[serde(default)]
    pub use_flash_attn: bool,
}

fn default_model_id() -> String {
    "HuggingFaceTB/SmolLM2-135M".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_dtype() -> String {
    "f32".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            model_id: default_model_id(),
            revision: default_revision(),
            local_dir: None,
            dtype: default_dtype(),
            cpu: false,
            use_flash_attn: false,
        }
    }
}
