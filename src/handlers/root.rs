//! Root endpoint handler for the landing page.

use axum::{extract::State, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let version = env!("CARGO_PKG_VERSION");
    format!(
        "loadtest-metrics-exporter {version}\n\n\
         Metrics available at: http://localhost:{port}/metrics\n\
         Health:               http://localhost:{port}/health\n\
         Namespace:            {namespace}\n",
        port = state.port,
        namespace = state.registry.namespace(),
    )
}
