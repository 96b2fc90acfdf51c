//! One-shot generation to stdout

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;

use crate::config::AppConfig;
use crate::engine::{self, GenerationJob, Scheduler};

/// Generate once with the configured settings, printing chunks as they arrive
pub async fn generate(config: AppConfig) -> Result<()> {
    let model_config = config.model.clone();
    let engine = tokio::task::spawn_blocking(move || engine::load_engine(&model_config)).await??;
    let scheduler = Scheduler::new(Arc::clone(&engine), 1);

    let job = GenerationJob::from_config(&config.generation);
    let mut chunks = scheduler.submit(job)?;

    let mut stdout = io::stdout();
    while let Some(chunk) = chunks.next().await {
        print!("{}", chunk?);
        stdout.flush()?;
    }
    println!();

    Ok(())
}
