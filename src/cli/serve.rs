//! HTTP server command

use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::engine::{self, Scheduler};
use crate::server;

/// Load the model and start the server
pub async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!(
        "Loading model: {} ({:?} backend)",
        config.model.model_id,
        config.model.backend
    );
    let model_config = config.model.clone();
    let engine = tokio::task::spawn_blocking(move || engine::load_engine(&model_config)).await??;
    tracing::info!("Model loaded successfully");

    let scheduler = Arc::new(Scheduler::new(
        engine,
        config.server.max_concurrent_generations,
    ));

    server::start(scheduler, config.generation, config.server).await
}
