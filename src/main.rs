use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamgen::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamgen=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            model,
            host,
            port,
            max_concurrent,
        } => {
            let mut config = model.load_config()?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(max_concurrent) = max_concurrent {
                config.server.max_concurrent_generations = max_concurrent;
            }
            streamgen::cli::serve(config).await?;
        }
        Commands::Generate {
            model,
            prompt,
            max_new_tokens,
        } => {
            let mut config = model.load_config()?;
            if let Some(prompt) = prompt {
                config.generation.prompt = prompt;
            }
            if let Some(max_new_tokens) = max_new_tokens {
                config.generation.max_new_tokens = max_new_tokens;
            }
            streamgen::cli::generate(config).await?;
        }
    }

    Ok(())
}
