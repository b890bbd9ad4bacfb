//! Shared state for the exposition endpoint.
//!
//! One `EndpointState` is built per server launch and handed to the axum
//! router. It only borrows the registry; instruments outlive any single
//! listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::registry::MetricsRegistry;

/// Type alias for shared endpoint state.
pub type SharedState = Arc<EndpointState>;

/// State shared by the HTTP handlers of one running server.
pub struct EndpointState {
    pub registry: Arc<MetricsRegistry>,
    /// Port the listener is actually bound to.
    pub port: u16,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
    scrapes: AtomicU64,
}

impl EndpointState {
    pub fn new(registry: Arc<MetricsRegistry>, port: u16) -> Self {
        Self {
            registry,
            port,
            start_time: Instant::now(),
            scrapes: AtomicU64::new(0),
        }
    }

    pub fn record_scrape(&self) {
        self.scrapes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scrape_count(&self) -> u64 {
        self.scrapes.load(Ordering::Relaxed)
    }
}
