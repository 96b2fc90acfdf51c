//! Configuration system for streamgen
//!
//! A single file (YAML or JSON) with `server`, `model` and `generation`
//! sections. Every field has a default, so an empty file is valid and
//! reproduces the stock behaviour: `0.0.0.0:8000`, prompt
//! `"An increasing sequence: one,"`, 50 new tokens.

mod generation;
mod model;
mod server;

pub use generation::{GenerationConfig, DEFAULT_PROMPT};
pub use model::{Backend, ModelConfig};
pub use server::ServerConfig;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use candle_core::DType;
use serde::{Deserialize, Serialize};

/// Parse a dtype string into a `DType`.
///
/// Accepts short and long forms: "f32"/"float32", "f16"/"float16", "bf16"/"bfloat16".
pub fn parse_dtype(s: &str) -> Result<DType> {
    match s {
        "f32" | "float32" => Ok(DType::F32),
        "f16" | "float16" => Ok(DType::F16),
        "bf16" | "bfloat16" => Ok(DType::BF16),
        other => Err(anyhow!("unknown dtype: '{}'", other)),
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Model selection
    #[serde(default)]
    pub model: ModelConfig,

    /// Per-request generation settings
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, picking the format from the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path),
            Some("yaml") | Some("yml") => Self::from_yaml(path),
            _ => Err(anyhow!("unsupported config format (expected .yaml, .yml or .json)")),
        };
        config.with_context(|| format!("failed to load config from {}", path.display()))
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
