//! HTTP server
//!
//! `GET /` streams generated text as a chunked `text/plain` body.

mod handlers;
mod routes;
mod streaming;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{GenerationConfig, ServerConfig};
use crate::engine::Scheduler;

pub use handlers::AppState;
pub use routes::api_routes;
pub use streaming::text_body;

/// Build the application router
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let mut app = api_routes().layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.with_state(state)
}

/// Start the HTTP server
pub async fn start(
    scheduler: Arc<Scheduler>,
    generation: GenerationConfig,
    config: ServerConfig,
) -> Result<()> {
    let limit = scheduler.limit();
    let state = Arc::new(AppState::new(scheduler, generation));
    let app = router(state, &config);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!(
        "  GET  / - Stream generated text (up to {} concurrent)",
        limit
    );
    tracing::info!("  GET  /health - Health check");

    axum::serve(listener, app).await?;

    Ok(())
}
