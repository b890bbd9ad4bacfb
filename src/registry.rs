//! One-time registration of the instrument set.
//!
//! The registry owns the Prometheus [`Registry`] that `/metrics` exposes and a
//! latch holding the registered [`LoadTestMetrics`]. The latch is set by the
//! first successful [`MetricsRegistry::ensure_registered`] call and is never
//! reset, so server restarts reuse the same instruments.

use once_cell::sync::OnceCell;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use crate::error::{MetricsError, Result};
use crate::metrics::LoadTestMetrics;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Owner of the Prometheus registry and the instrument latch.
pub struct MetricsRegistry {
    registry: Registry,
    namespace: String,
    enable_runtime_metrics: bool,
    runtime_installed: AtomicBool,
    instruments: OnceCell<LoadTestMetrics>,
    /// Set when the last registration attempt failed. Recording stops trying
    /// until an explicit `ensure_registered` succeeds.
    registration_failed: AtomicBool,
}

impl MetricsRegistry {
    /// Creates a registry backed by a fresh Prometheus registry.
    pub fn new(namespace: impl Into<String>, enable_runtime_metrics: bool) -> Self {
        Self::with_registry(Registry::new(), namespace, enable_runtime_metrics)
    }

    /// Creates a registry on top of an existing Prometheus registry, e.g. one
    /// the host already exposes elsewhere.
    pub fn with_registry(
        registry: Registry,
        namespace: impl Into<String>,
        enable_runtime_metrics: bool,
    ) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
            enable_runtime_metrics,
            runtime_installed: AtomicBool::new(false),
            instruments: OnceCell::new(),
            registration_failed: AtomicBool::new(false),
        }
    }

    /// Registers the instrument set on first call and returns it. Later calls
    /// return the same set without touching the Prometheus registry.
    pub fn ensure_registered(&self) -> Result<&LoadTestMetrics> {
        self.instruments.get_or_try_init(|| {
            self.install_runtime_metrics();

            match LoadTestMetrics::new(&self.registry, &self.namespace) {
                Ok(metrics) => {
                    info!(
                        "Prometheus metrics registered successfully (namespace: {})",
                        self.namespace
                    );
                    self.registration_failed.store(false, Ordering::Release);
                    Ok(metrics)
                }
                Err(e) => {
                    error!("Error registering metrics: {}", e);
                    self.registration_failed.store(true, Ordering::Release);
                    Err(MetricsError::RegistrationConflict(e))
                }
            }
        })
    }

    /// Instruments for the recording path. Registers lazily on first use,
    /// but after a failed attempt returns `None` without touching the
    /// Prometheus registry again.
    pub fn recording_instruments(&self) -> Option<&LoadTestMetrics> {
        if let Some(metrics) = self.instruments.get() {
            return Some(metrics);
        }
        if self.registration_failed.load(Ordering::Acquire) {
            return None;
        }

        match self.ensure_registered() {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("Metrics unavailable, dropping observations: {}", e);
                None
            }
        }
    }

    /// Returns the instruments if registration already happened.
    pub fn instruments(&self) -> Option<&LoadTestMetrics> {
        self.instruments.get()
    }

    /// True once the instrument set has been registered.
    pub fn is_registered(&self) -> bool {
        self.instruments.get().is_some()
    }

    /// True if the last registration attempt failed.
    pub fn registration_failed(&self) -> bool {
        self.registration_failed.load(Ordering::Acquire)
    }

    /// True if the process collector was installed.
    pub fn runtime_metrics_installed(&self) -> bool {
        self.runtime_installed.load(Ordering::Acquire)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The Prometheus registry served on `/metrics`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Content type of [`MetricsRegistry::encode`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Gathers every registered collector and encodes it in the Prometheus
    /// text exposition format.
    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::with_capacity(BUFFER_CAP);

        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    /// Best-effort install of process-level metrics. Never fails.
    fn install_runtime_metrics(&self) {
        if !self.enable_runtime_metrics || self.runtime_installed.load(Ordering::Acquire) {
            return;
        }

        #[cfg(target_os = "linux")]
        {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            match self.registry.register(Box::new(collector)) {
                Ok(()) => {
                    self.runtime_installed.store(true, Ordering::Release);
                    debug!("Process metrics collector installed");
                }
                // Already present in a shared registry, or unsupported here.
                Err(e) => debug!("Process metrics not installed: {}", e),
            }
        }

        #[cfg(not(target_os = "linux"))]
        debug!("Process metrics are only available on Linux");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntCounter;

    #[test]
    fn test_ensure_registered_is_idempotent() {
        let registry = MetricsRegistry::new("gatling", false);
        assert!(!registry.is_registered());

        for _ in 0..5 {
            registry.ensure_registered().unwrap();
        }
        assert!(registry.is_registered());

        let first = registry.ensure_registered().unwrap() as *const LoadTestMetrics;
        let second = registry.ensure_registered().unwrap() as *const LoadTestMetrics;
        assert_eq!(first, second);
    }

    #[test]
    fn test_conflict_surfaces_as_registration_error() {
        let shared = Registry::new();
        let squatter = IntCounter::new("gatling_requests_total", "already here").unwrap();
        shared.register(Box::new(squatter)).unwrap();

        let registry = MetricsRegistry::with_registry(shared, "gatling", false);
        let err = registry.ensure_registered().err().unwrap();

        assert!(matches!(err, MetricsError::RegistrationConflict(_)));
        assert!(!registry.is_registered());
    }

    #[test]
    fn test_recording_path_stops_retrying_after_conflict() {
        let shared = Registry::new();
        let squatter = IntCounter::new("gatling_requests_total", "already here").unwrap();
        shared.register(Box::new(squatter.clone())).unwrap();

        let registry = MetricsRegistry::with_registry(shared.clone(), "gatling", false);
        assert!(registry.recording_instruments().is_none());
        assert!(registry.registration_failed());

        // Conflict cleared, but recording alone does not register again.
        shared.unregister(Box::new(squatter)).unwrap();
        assert!(registry.recording_instruments().is_none());
        assert!(!registry.is_registered());

        // An explicit registration succeeds and recording resumes.
        registry.ensure_registered().unwrap();
        assert!(!registry.registration_failed());
        assert!(registry.recording_instruments().is_some());
    }

    #[test]
    fn test_runtime_metrics_are_optional() {
        let registry = MetricsRegistry::new("gatling", false);
        registry.ensure_registered().unwrap();
        assert!(!registry.runtime_metrics_installed());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_runtime_metrics_installed_once() {
        let registry = MetricsRegistry::new("gatling", true);
        registry.ensure_registered().unwrap();
        registry.ensure_registered().unwrap();

        assert!(registry.runtime_metrics_installed());
        assert!(registry.encode().unwrap().contains("process_"));
    }

    #[test]
    fn test_encode_empty_registry() {
        let registry = MetricsRegistry::new("gatling", false);
        registry.ensure_registered().unwrap();
        // Vectors without any series produce no output.
        assert_eq!(registry.encode().unwrap(), "");
    }
}
