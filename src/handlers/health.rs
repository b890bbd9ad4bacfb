//! Health check endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let registered = if state.registry.is_registered() {
        "registered"
    } else {
        "not registered"
    };

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "OK\n\nPort: {}\nUptime: {}s\nScrapes served: {}\nInstruments: {}\n",
            state.port,
            uptime_secs,
            state.scrape_count(),
            registered
        ),
    )
}
