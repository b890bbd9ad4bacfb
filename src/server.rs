//! Lifecycle of the HTTP exposition endpoint.
//!
//! [`ServerManager`] owns the only listener. Start and stop calls queue on one
//! FIFO mutex, so concurrent callers see a linear sequence of transitions and
//! at most one server is ever bound. The current [`ServerPhase`] is published
//! on a watch channel, which keeps `is_running()` and `current_port()` cheap
//! and consistent while a start is still waiting for its port.
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               |                      ^
//!               +------ (failure) -----+--> Stopped
//! Running -> Stopping -> Stopped -> Starting   (restart on another port)
//! ```

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::binder::{BoundListener, PortBinder};
use crate::error::{MetricsError, Result};
use crate::handlers;
use crate::registry::MetricsRegistry;
use crate::state::EndpointState;

/// Exit code used after SIGINT cleanup.
const EXIT_CODE_SIGINT: i32 = 130;
/// Exit code used after SIGTERM cleanup.
const EXIT_CODE_SIGTERM: i32 = 143;

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Stopped,
    Starting { requested: u16 },
    Running { port: u16 },
    Stopping { port: u16 },
}

impl ServerPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, ServerPhase::Running { .. })
    }

    /// Bound port, only while running.
    pub fn port(&self) -> Option<u16> {
        match self {
            ServerPhase::Running { port } => Some(*port),
            _ => None,
        }
    }
}

/// A launched server and the means to stop it.
struct RunningServer {
    requested_port: u16,
    port: u16,
    shutdown: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

/// Resets the published phase to `Stopped` unless disarmed, so a failed or
/// dropped transition never leaves a stale `Starting`/`Stopping` behind.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<ServerPhase>,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<ServerPhase>, next: ServerPhase) -> Self {
        phase.send_replace(next);
        Self { phase, armed: true }
    }

    fn commit(mut self, next: ServerPhase) {
        self.phase.send_replace(next);
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.phase.send_replace(ServerPhase::Stopped);
        }
    }
}

/// Owner of the metrics HTTP server.
pub struct ServerManager {
    registry: Arc<MetricsRegistry>,
    binder: PortBinder,
    shutdown_timeout: Duration,
    state: Mutex<Option<RunningServer>>,
    phase: watch::Sender<ServerPhase>,
    /// Cancelled on process termination or drop. Parent of every server's
    /// shutdown token and aborts pending port waits.
    terminate: CancellationToken,
    /// Cancelled once the exit hook finished its cleanup.
    exited: CancellationToken,
    exit_hook_installed: AtomicBool,
}

impl ServerManager {
    pub fn new(registry: Arc<MetricsRegistry>, binder: PortBinder, shutdown_timeout: Duration) -> Self {
        let (phase, _) = watch::channel(ServerPhase::Stopped);
        Self {
            registry,
            binder,
            shutdown_timeout,
            state: Mutex::new(None),
            phase,
            terminate: CancellationToken::new(),
            exited: CancellationToken::new(),
            exit_hook_installed: AtomicBool::new(false),
        }
    }

    /// Starts the endpoint on `port`, or on a fallback port if it stays busy.
    /// Returns the port actually bound.
    pub async fn start(&self, port: u16) -> Result<u16> {
        self.start_cancellable(port, &CancellationToken::new()).await
    }

    /// Like [`ServerManager::start`], but `cancel` aborts a pending wait for a
    /// busy port with [`MetricsError::BindInterrupted`].
    pub async fn start_cancellable(&self, port: u16, cancel: &CancellationToken) -> Result<u16> {
        let mut state = self.state.lock().await;

        self.registry.ensure_registered()?;

        if let Some(running) = state.as_ref() {
            if running.port == port || running.requested_port == port {
                info!(
                    "Prometheus metrics server already running on port {}",
                    running.port
                );
                return Ok(running.port);
            }
        }

        if let Some(running) = state.take() {
            info!(
                "Restarting Prometheus metrics server: port {} -> {}",
                running.port, port
            );
            self.shutdown_server(running).await;
        }

        if self.terminate.is_cancelled() {
            warn!("Process is terminating, not starting metrics server on port {}", port);
            return Err(MetricsError::BindInterrupted { port });
        }

        let guard = PhaseGuard::enter(&self.phase, ServerPhase::Starting { requested: port });

        let bound = tokio::select! {
            biased;
            result = self.binder.find_and_bind(port, cancel) => result,
            _ = self.terminate.cancelled() => Err(MetricsError::BindInterrupted { port }),
        };

        let BoundListener {
            port: bound_port,
            listener,
        } = match bound {
            Ok(bound) => bound,
            Err(e) => {
                error!(
                    "Failed to start Prometheus server on port {}: {}",
                    port, e
                );
                return Err(e);
            }
        };

        let shutdown = self.terminate.child_token();
        let app = handlers::router(Arc::new(EndpointState::new(
            self.registry.clone(),
            bound_port,
        )));
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        *state = Some(RunningServer {
            requested_port: port,
            port: bound_port,
            shutdown,
            task,
        });
        guard.commit(ServerPhase::Running { port: bound_port });

        info!("✓ Prometheus metrics server started on port {}", bound_port);
        info!(
            "  Metrics available at: http://localhost:{}/metrics",
            bound_port
        );

        Ok(bound_port)
    }

    /// Stops the endpoint if it is running. Close errors are logged, the state
    /// is always reset.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        match state.take() {
            Some(running) => self.shutdown_server(running).await,
            None => debug!("Prometheus metrics server not running, nothing to stop"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase.borrow().is_running()
    }

    pub fn current_port(&self) -> Option<u16> {
        self.phase.borrow().port()
    }

    pub fn phase(&self) -> ServerPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase transition.
    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    pub fn binder(&self) -> &PortBinder {
        &self.binder
    }

    /// Registers a hook that stops the server on SIGINT/SIGTERM and then
    /// exits the process. Must be called inside a Tokio runtime. Returns
    /// `false` if a hook was already registered.
    pub fn install_exit_hook(self: &Arc<Self>) -> bool {
        self.register_exit_hook(async { Some(termination_signal().await) })
    }

    /// Registers a hook that stops the server once `trigger` resolves. The
    /// process keeps running; await [`ServerManager::exited`] to follow up.
    /// Returns `false` if a hook was already registered.
    pub fn install_exit_hook_on<F>(self: &Arc<Self>, trigger: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.register_exit_hook(async move {
            trigger.await;
            None
        })
    }

    /// Resolves after the exit hook completed its cleanup.
    pub async fn exited(&self) {
        self.exited.cancelled().await
    }

    fn register_exit_hook<F>(self: &Arc<Self>, trigger: F) -> bool
    where
        F: Future<Output = Option<i32>> + Send + 'static,
    {
        if self.exit_hook_installed.swap(true, Ordering::AcqRel) {
            debug!("Exit hook already registered, skipping");
            return false;
        }

        // Weak, so the hook alone never keeps the manager alive.
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let exit_code = trigger.await;

            if let Some(manager) = manager.upgrade() {
                info!("Shutdown hook triggered - stopping Prometheus server...");
                manager.terminate.cancel();
                manager.stop().await;
                manager.exited.cancel();
            }

            if let Some(code) = exit_code {
                std::process::exit(code);
            }
        });

        debug!("Exit hook registered");
        true
    }

    async fn shutdown_server(&self, running: RunningServer) {
        let RunningServer {
            port,
            shutdown,
            mut task,
            ..
        } = running;

        let guard = PhaseGuard::enter(&self.phase, ServerPhase::Stopping { port });
        shutdown.cancel();

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => info!("Prometheus metrics server stopped (port {})", port),
            Ok(Ok(Err(e))) => error!("Error stopping Prometheus server: {}", e),
            Ok(Err(e)) => error!("Prometheus server task failed: {}", e),
            Err(_) => {
                warn!(
                    "Prometheus server on port {} did not stop within {:?}, aborting",
                    port, self.shutdown_timeout
                );
                task.abort();
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        error!("Prometheus server task failed: {}", e);
                    }
                }
            }
        }

        guard.commit(ServerPhase::Stopped);
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        // Closes any listener still running.
        self.terminate.cancel();
    }
}

/// Waits for SIGINT or SIGTERM and returns the conventional exit code for it
/// (130 or 143).
pub async fn termination_signal() -> i32 {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            EXIT_CODE_SIGINT
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
            EXIT_CODE_SIGTERM
        }
    }
}
