//! Load-Test Metrics Exporter Library
//!
//! This library exposes the live metrics of a load-test run in the Prometheus
//! text format. Workload code records request outcomes, errors and virtual
//! user transitions; an embedded HTTP endpoint serves them on `/metrics`.
//!
//! # Features
//!
//! - **Idempotent Registration**: one instrument set per registry, created on first use
//! - **Resilient Port Binding**: retries a busy port, then scans a fallback range
//! - **Serialized Lifecycle**: start/stop/restart of the endpoint behind one async lock
//! - **Non-blocking Recording**: recording never waits on the server and never fails the caller
//!
//! # Usage
//!
//! ```no_run
//! use loadtest_metrics::{Config, MetricsSubsystem};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), loadtest_metrics::MetricsError> {
//! let subsystem = Arc::new(MetricsSubsystem::new(Config::default()));
//! subsystem.install_exit_hook();
//!
//! let port = subsystem.start_server(9102).await?;
//! println!("Scrape http://localhost:{port}/metrics");
//!
//! let recorder = subsystem.recorder().clone();
//! recorder.user_started("BasicSimulation", "Browse");
//! recorder.record_request("BasicSimulation", "Browse", "Home", true, 137);
//! recorder.record_error("BasicSimulation", "Browse", "Search", Some("timeout"));
//! recorder.user_finished("BasicSimulation", "Browse");
//!
//! subsystem.stop_server().await;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod recorder;
pub mod registry;
pub mod server;
pub mod shim;
pub mod simulation;
pub mod state;
pub mod subsystem;

// Re-export main types for convenience
pub use binder::{BoundListener, PortBinder};
pub use config::Config;
pub use error::{MetricsError, Result};
pub use metrics::LoadTestMetrics;
pub use recorder::Recorder;
pub use registry::MetricsRegistry;
pub use server::{termination_signal, ServerManager, ServerPhase};
pub use shim::{RequestTimer, SessionContext, StatusExpectation, UserSession};
pub use simulation::SimulationRun;
pub use subsystem::MetricsSubsystem;
