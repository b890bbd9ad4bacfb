//! Prometheus instrument definitions for load-test workloads.
//!
//! The instrument set is fixed: one latency histogram, the request, error,
//! users-started and users-finished counters, and the active-users gauge.
//! Everything is labelled by simulation and scenario, request-level
//! instruments additionally by request name and outcome.

use prometheus::core::Collector;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use tracing::debug;

/// Default metric name prefix.
pub const DEFAULT_NAMESPACE: &str = "gatling";

/// Latency bucket upper bounds in milliseconds. `+Inf` is implicit.
pub const LATENCY_BUCKETS_MS: [f64; 17] = [
    100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0, 1100.0, 1200.0,
    1500.0, 2000.0, 3000.0, 5000.0, 10000.0,
];

/// Label names for request-level instruments.
pub const REQUEST_LABELS: [&str; 4] = ["simulation", "scenario", "request", "status"];

/// Label names for the error counter.
pub const ERROR_LABELS: [&str; 4] = ["simulation", "scenario", "request", "error"];

/// Label names for user-level instruments.
pub const USER_LABELS: [&str; 2] = ["simulation", "scenario"];

/// Collection of Prometheus instruments for one metrics surface.
#[derive(Clone)]
pub struct LoadTestMetrics {
    // ========== Request Metrics ==========
    pub response_time_ms: HistogramVec, // labels: simulation, scenario, request, status
    pub requests_total: IntCounterVec,  // labels: simulation, scenario, request, status
    pub errors_total: IntCounterVec,    // labels: simulation, scenario, request, error

    // ========== User Metrics ==========
    pub active_users: IntGaugeVec,          // labels: simulation, scenario
    pub users_started_total: IntCounterVec, // labels: simulation, scenario
    pub users_finished_total: IntCounterVec, // labels: simulation, scenario
}

impl LoadTestMetrics {
    /// Creates all instruments under `namespace` and registers them with the
    /// registry. All or nothing: if the registry rejects one collector, the
    /// ones registered before it are unregistered again.
    pub fn new(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        // ========== Request Metrics ==========
        let response_time_ms = HistogramVec::new(
            HistogramOpts::new("response_time_milliseconds", "Response time in milliseconds")
                .namespace(namespace)
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &REQUEST_LABELS,
        )?;
        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests").namespace(namespace),
            &REQUEST_LABELS,
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors").namespace(namespace),
            &ERROR_LABELS,
        )?;

        // ========== User Metrics ==========
        let active_users = IntGaugeVec::new(
            Opts::new("active_users", "Number of active users").namespace(namespace),
            &USER_LABELS,
        )?;
        let users_started_total = IntCounterVec::new(
            Opts::new("users_started_total", "Total number of users started")
                .namespace(namespace),
            &USER_LABELS,
        )?;
        let users_finished_total = IntCounterVec::new(
            Opts::new("users_finished_total", "Total number of users finished")
                .namespace(namespace),
            &USER_LABELS,
        )?;

        let metrics = Self {
            response_time_ms,
            requests_total,
            errors_total,
            active_users,
            users_started_total,
            users_finished_total,
        };
        metrics.register_all(registry)?;

        Ok(metrics)
    }

    /// Fresh boxed handles to every instrument, in registration order.
    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        let collectors: [Box<dyn Collector>; 6] = [
            Box::new(self.response_time_ms.clone()),
            Box::new(self.requests_total.clone()),
            Box::new(self.errors_total.clone()),
            Box::new(self.active_users.clone()),
            Box::new(self.users_started_total.clone()),
            Box::new(self.users_finished_total.clone()),
        ];
        collectors.into()
    }

    fn register_all(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        for (registered, collector) in self.collectors().into_iter().enumerate() {
            if let Err(e) = registry.register(collector) {
                for collector in self.collectors().into_iter().take(registered) {
                    if let Err(e) = registry.unregister(collector) {
                        debug!("Rollback of partial registration failed: {}", e);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}
