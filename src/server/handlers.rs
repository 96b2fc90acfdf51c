//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use super::streaming::text_body;
use crate::config::GenerationConfig;
use crate::engine::{GenerationJob, Scheduler, SubmitError};

/// Shared application state
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    /// Settings every request is served with
    pub generation: GenerationConfig,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, generation: GenerationConfig) -> Self {
        Self {
            scheduler,
            generation,
        }
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Stream a continuation of the configured prompt.
///
/// The request itself (body, query, headers) is not read.
pub async fn generate(State(state): State<Arc<AppState>>) -> Response {
    let job = GenerationJob::from_config(&state.generation);
    let job_id = job.id;

    match state.scheduler.submit(job) {
        Ok(chunks) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(text_body(job_id, chunks)),
        )
            .into_response(),
        Err(e @ SubmitError::Busy { .. }) => {
            tracing::warn!(%job_id, "Rejecting request: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e @ SubmitError::Engine(_)) => {
            tracing::error!(%job_id, "{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
