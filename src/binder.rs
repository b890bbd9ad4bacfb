//! Port selection for the metrics listener.
//!
//! A previous run that just shut down may still hold the preferred port for a
//! moment, so the binder first waits for it with a fixed number of retries and
//! only then scans a bounded range above it. The two phases never interleave.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MetricsError, Result};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_FALLBACK_RANGE: u16 = 100;

/// A listener together with the port it is bound to.
#[derive(Debug)]
pub struct BoundListener {
    pub port: u16,
    pub listener: TcpListener,
}

/// Finds a usable port and binds it.
#[derive(Debug, Clone)]
pub struct PortBinder {
    bind_addr: IpAddr,
    retry_attempts: u32,
    retry_delay: Duration,
    fallback_range: u16,
}

impl PortBinder {
    pub fn new(bind_addr: IpAddr) -> Self {
        Self {
            bind_addr,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            fallback_range: DEFAULT_FALLBACK_RANGE,
        }
    }

    /// Builds a binder from an already validated configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.bind_ip(),
            retry_attempts: config.retry_attempts(),
            retry_delay: config.retry_delay(),
            fallback_range: config.fallback_range(),
        }
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_fallback_range(mut self, range: u16) -> Self {
        self.fallback_range = range;
        self
    }

    pub fn bind_addr(&self) -> IpAddr {
        self.bind_addr
    }

    /// Last port of the fallback range for `preferred`, clamped to `u16::MAX`.
    pub fn fallback_end(&self, preferred: u16) -> u16 {
        preferred.saturating_add(self.fallback_range)
    }

    /// Binds `preferred`, waiting for it to free up, else the first free port
    /// in `(preferred, preferred + fallback_range]`.
    ///
    /// Cancelling `cancel` while waiting between retries aborts with
    /// [`MetricsError::BindInterrupted`]; no socket stays bound in that case.
    pub async fn find_and_bind(
        &self,
        preferred: u16,
        cancel: &CancellationToken,
    ) -> Result<BoundListener> {
        if let Some(socket) = self.probe(preferred) {
            return self.into_listener(preferred, socket);
        }

        for attempt in 1..=self.retry_attempts {
            info!(
                "Port {} is in use. Waiting... ({}/{})",
                preferred, attempt, self.retry_attempts
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Interrupted while waiting for port {}", preferred);
                    return Err(MetricsError::BindInterrupted { port: preferred });
                }
                _ = tokio::time::sleep(self.retry_delay) => {}
            }

            if let Some(socket) = self.probe(preferred) {
                return self.into_listener(preferred, socket);
            }
        }

        let range_end = self.fallback_end(preferred);
        match self.scan(preferred, range_end) {
            Some((port, socket)) => {
                info!(
                    "Port {} unavailable. Using alternative port {}",
                    preferred, port
                );
                self.into_listener(port, socket)
            }
            None => {
                warn!(
                    "Port {} is still in use and no alternative port available",
                    preferred
                );
                Err(MetricsError::PortUnavailable {
                    port: preferred,
                    range_end,
                })
            }
        }
    }

    /// Returns the first port in `(after, up_to]` that can be bound right now,
    /// without keeping it.
    pub fn find_available_port(&self, after: u16, up_to: u16) -> Option<u16> {
        self.scan(after, up_to).map(|(port, _socket)| port)
    }

    fn scan(&self, after: u16, up_to: u16) -> Option<(u16, std::net::TcpListener)> {
        let start = after.checked_add(1)?;
        (start..=up_to).find_map(|port| self.probe(port).map(|socket| (port, socket)))
    }

    /// Attempts to bind `port`. The socket is returned so a successful probe
    /// can become the listener without a release/rebind window.
    fn probe(&self, port: u16) -> Option<std::net::TcpListener> {
        match std::net::TcpListener::bind(SocketAddr::new(self.bind_addr, port)) {
            Ok(socket) => Some(socket),
            Err(e) => {
                debug!("Port {} on {} not available: {}", port, self.bind_addr, e);
                None
            }
        }
    }

    fn into_listener(&self, port: u16, socket: std::net::TcpListener) -> Result<BoundListener> {
        let to_bind_error = |source: io::Error| MetricsError::Bind { port, source };

        socket.set_nonblocking(true).map_err(to_bind_error)?;
        let listener = TcpListener::from_std(socket).map_err(to_bind_error)?;
        let port = listener.local_addr().map_err(to_bind_error)?.port();

        Ok(BoundListener { port, listener })
    }
}
