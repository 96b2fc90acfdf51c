//! Route definitions

use std::sync::Arc;

use axum::{routing::get, Router};

use super::handlers::{generate, health, AppState};

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(generate))
        .route("/health", get(health))
}
