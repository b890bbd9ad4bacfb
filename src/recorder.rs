//! Recording API called from workload code.
//!
//! Every call is lock-free with respect to the server lifecycle and never
//! fails observably: a lost observation is logged and dropped so the workload
//! under test is never affected by its own instrumentation.

use std::sync::Arc;
use tracing::warn;

use crate::metrics::LoadTestMetrics;
use crate::registry::MetricsRegistry;

/// Maximum length, in characters, of the `error` label.
pub const MAX_ERROR_LABEL_CHARS: usize = 100;

/// Error label used when no message is available.
pub const UNKNOWN_ERROR: &str = "unknown";

pub const STATUS_OK: &str = "ok";
pub const STATUS_KO: &str = "ko";

/// Maps a request outcome to its `status` label value.
pub fn status_label(success: bool) -> &'static str {
    if success {
        STATUS_OK
    } else {
        STATUS_KO
    }
}

/// Turns an optional free-text message into a bounded `error` label.
pub fn error_label(message: Option<&str>) -> &str {
    match message {
        Some(m) if !m.is_empty() => match m.char_indices().nth(MAX_ERROR_LABEL_CHARS) {
            Some((cut, _)) => &m[..cut],
            None => m,
        },
        _ => UNKNOWN_ERROR,
    }
}

/// Cheaply cloneable handle to the instrument set.
#[derive(Clone)]
pub struct Recorder {
    registry: Arc<MetricsRegistry>,
}

impl Recorder {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Records one completed request: a latency observation and a request
    /// count under `(simulation, scenario, request, ok|ko)`.
    pub fn record_request(
        &self,
        simulation: &str,
        scenario: &str,
        request: &str,
        success: bool,
        latency_ms: u64,
    ) {
        let Some(metrics) = self.metrics() else {
            return;
        };
        let labels = [simulation, scenario, request, status_label(success)];

        match metrics.response_time_ms.get_metric_with_label_values(&labels) {
            Ok(histogram) => histogram.observe(latency_ms as f64),
            Err(e) => warn!("Dropping latency observation for {}: {}", request, e),
        }
        match metrics.requests_total.get_metric_with_label_values(&labels) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!("Dropping request count for {}: {}", request, e),
        }
    }

    /// Counts one error. The message becomes the `error` label, cut to
    /// [`MAX_ERROR_LABEL_CHARS`] characters, or `unknown` if absent or empty.
    pub fn record_error(
        &self,
        simulation: &str,
        scenario: &str,
        request: &str,
        message: Option<&str>,
    ) {
        let Some(metrics) = self.metrics() else {
            return;
        };
        let labels = [simulation, scenario, request, error_label(message)];

        match metrics.errors_total.get_metric_with_label_values(&labels) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!("Dropping error count for {}: {}", request, e),
        }
    }

    /// A virtual user entered `scenario`.
    pub fn user_started(&self, simulation: &str, scenario: &str) {
        let Some(metrics) = self.metrics() else {
            return;
        };
        let labels = [simulation, scenario];

        match metrics.active_users.get_metric_with_label_values(&labels) {
            Ok(gauge) => gauge.inc(),
            Err(e) => warn!("Dropping active user increment: {}", e),
        }
        match metrics.users_started_total.get_metric_with_label_values(&labels) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!("Dropping users started count: {}", e),
        }
    }

    /// A virtual user left `scenario`.
    pub fn user_finished(&self, simulation: &str, scenario: &str) {
        let Some(metrics) = self.metrics() else {
            return;
        };
        let labels = [simulation, scenario];

        match metrics.active_users.get_metric_with_label_values(&labels) {
            Ok(gauge) => gauge.dec(),
            Err(e) => warn!("Dropping active user decrement: {}", e),
        }
        match metrics
            .users_finished_total
            .get_metric_with_label_values(&labels)
        {
            Ok(counter) => counter.inc(),
            Err(e) => warn!("Dropping users finished count: {}", e),
        }
    }

    /// Registers lazily so recording works before the server ever started.
    fn metrics(&self) -> Option<&LoadTestMetrics> {
        self.registry.recording_instruments()
    }
}
