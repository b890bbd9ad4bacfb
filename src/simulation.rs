//! Before/after hooks for a simulation run.
//!
//! [`SimulationRun::begin`] brings the metrics endpoint up and never fails the
//! run because of it: if the configured port cannot be used, one more attempt
//! is made on the first free port above it, after that the run continues with
//! recording only. [`SimulationRun::finish`] leaves time for a final scrape
//! before the endpoint goes down.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::shim::SessionContext;
use crate::subsystem::MetricsSubsystem;

/// A simulation with its metrics endpoint.
pub struct SimulationRun {
    subsystem: Arc<MetricsSubsystem>,
    name: String,
    port: Option<u16>,
}

impl SimulationRun {
    /// Starts the metrics endpoint for simulation `name`.
    pub async fn begin(subsystem: Arc<MetricsSubsystem>, name: impl Into<String>) -> Self {
        let name = name.into();
        info!("========================================");
        info!("Starting simulation: {}", name);
        info!("========================================");

        let preferred = subsystem.config().port();
        let port = match subsystem.start_server(preferred).await {
            Ok(port) => Some(port),
            Err(e) => {
                warn!(
                    "Could not start Prometheus server on port {}: {}",
                    preferred, e
                );
                warn!("Metrics collection will continue, but may use a different port.");
                Self::start_alternative(&subsystem, preferred, e.is_port_related()).await
            }
        };

        Self {
            subsystem,
            name,
            port,
        }
    }

    async fn start_alternative(
        subsystem: &MetricsSubsystem,
        preferred: u16,
        port_related: bool,
    ) -> Option<u16> {
        if !port_related {
            error!("Continuing without Prometheus HTTP server.");
            return None;
        }

        let binder = subsystem.server().binder();
        let Some(alternative) = binder.find_available_port(preferred, binder.fallback_end(preferred))
        else {
            error!("No alternative port available. Continuing without Prometheus HTTP server.");
            return None;
        };

        match subsystem.start_server(alternative).await {
            Ok(port) => Some(port),
            Err(e) => {
                error!(
                    "Failed to start on alternative port {}: {}. Continuing without Prometheus HTTP server.",
                    alternative, e
                );
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port the endpoint was started on, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Context for a virtual user of `scenario` in this simulation.
    pub fn session(&self, scenario: &str) -> SessionContext {
        self.subsystem.session(&self.name, scenario)
    }

    /// Waits the configured final-scrape period, then stops the endpoint.
    pub async fn finish(self) {
        let wait = self.subsystem.config().final_scrape_wait();
        self.finish_after(wait).await
    }

    /// Like [`SimulationRun::finish`] with an explicit wait.
    pub async fn finish_after(self, wait: Duration) {
        info!("========================================");
        info!("Simulation completed: {}", self.name);
        info!("========================================");

        if self.subsystem.is_running() && !wait.is_zero() {
            info!(
                "Waiting {} seconds for final Prometheus scrape...",
                wait.as_secs()
            );
            let mut remaining = wait;
            while !remaining.is_zero() {
                debug!("Shutting down in {} seconds...", remaining.as_secs().max(1));
                let step = remaining.min(Duration::from_secs(1));
                tokio::time::sleep(step).await;
                remaining -= step;
            }
        }

        if self.subsystem.is_running() {
            info!("Stopping Prometheus metrics server...");
            self.subsystem.stop_server().await;
        }

        info!("Cleanup complete.");
    }
}
