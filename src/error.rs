//! Error types for the metrics subsystem.
//!
//! Lifecycle calls return these to the caller so orchestration code can log
//! them and decide whether to retry. Recording never surfaces them.

use std::io;

/// Errors surfaced by registration, port binding and exposition.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// An instrument could not be registered, usually because a collector
    /// with the same name already lives in the registry.
    #[error("Failed to register metric instruments: {0}")]
    RegistrationConflict(#[source] prometheus::Error),

    /// The preferred port stayed busy through every retry and no port in the
    /// fallback range was free.
    #[error("Port {port} is still in use and no alternative port available up to {range_end}")]
    PortUnavailable { port: u16, range_end: u16 },

    /// The caller cancelled the start while it was waiting for the port.
    #[error("Interrupted while waiting for port {port}")]
    BindInterrupted { port: u16 },

    /// A port was selected but could not be turned into a listener.
    #[error("Failed to bind metrics listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

impl MetricsError {
    /// True for failures a caller may reasonably retry on another port.
    pub fn is_port_related(&self) -> bool {
        matches!(
            self,
            MetricsError::PortUnavailable { .. } | MetricsError::Bind { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T, E = MetricsError> = std::result::Result<T, E>;
