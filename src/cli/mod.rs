//! CLI commands

mod generate;
mod serve;

pub use generate::generate;
pub use serve::serve;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, Backend};

/// Stream text from a causal language model over HTTP
#[derive(Parser)]
#[command(name = "streamgen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve {
        #[command(flatten)]
        model: ModelArgs,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Maximum number of generations running at once
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Generate once and print the stream to stdout
    Generate {
        #[command(flatten)]
        model: ModelArgs,

        /// Prompt text
        #[arg(long, short)]
        prompt: Option<String>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_new_tokens: Option<usize>,
    },
}

/// Options shared by every command that loads a model
#[derive(Args, Debug, Default)]
pub struct ModelArgs {
    /// Configuration file (YAML or JSON)
    #[arg(long, short, env = "STREAMGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// HuggingFace model repository
    #[arg(long)]
    pub model_id: Option<String>,

    /// Use the scripted stub engine instead of loading weights
    #[arg(long)]
    pub stub: bool,

    /// Use CPU even if an accelerator is available
    #[arg(long)]
    pub cpu: bool,
}

impl ModelArgs {
    /// Load the config file (or defaults) and apply these overrides
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_or_default(self.config.as_deref())?;
        if let Some(model_id) = &self.model_id {
            config.model.model_id = model_id.clone();
        }
        if self.stub {
            config.model.backend = Backend::Stub;
        }
        if self.cpu {
            config.model.cpu = true;
        }
        Ok(config)
    }
}
