//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler that encodes the
//! registry in the Prometheus text exposition format.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsEndpointError {
    EncodingFailed,
}

impl IntoResponse for MetricsEndpointError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<Response, MetricsEndpointError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let body = state.registry.encode().map_err(|e| {
        error!("Failed to encode Prometheus metrics: {}", e);
        MetricsEndpointError::EncodingFailed
    })?;
    state.record_scrape();

    debug!(
        "Metrics request completed: {} bytes, {:.3}ms",
        body.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok((
        [(header::CONTENT_TYPE, state.registry.content_type())],
        body,
    )
        .into_response())
}
