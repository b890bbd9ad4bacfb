//! The metrics subsystem: registry, recorder and server in one object.
//!
//! Build one per process, share it by `Arc`, and hand [`Recorder`] clones or
//! [`SessionContext`]s to workload code. Tests build as many independent
//! instances as they like.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::binder::PortBinder;
use crate::config::Config;
use crate::error::Result;
use crate::recorder::Recorder;
use crate::registry::MetricsRegistry;
use crate::server::{ServerManager, ServerPhase};
use crate::shim::SessionContext;

/// Explicitly owned metrics surface of a load-test process.
pub struct MetricsSubsystem {
    config: Config,
    registry: Arc<MetricsRegistry>,
    server: Arc<ServerManager>,
    recorder: Recorder,
}

impl MetricsSubsystem {
    /// Builds a subsystem with its own Prometheus registry.
    pub fn new(config: Config) -> Self {
        let registry = MetricsRegistry::new(config.namespace(), config.enable_runtime_metrics());
        Self::from_parts(config, registry)
    }

    /// Builds a subsystem on top of an existing Prometheus registry.
    pub fn with_registry(config: Config, registry: prometheus::Registry) -> Self {
        let registry = MetricsRegistry::with_registry(
            registry,
            config.namespace(),
            config.enable_runtime_metrics(),
        );
        Self::from_parts(config, registry)
    }

    fn from_parts(config: Config, registry: MetricsRegistry) -> Self {
        let registry = Arc::new(registry);
        let server = Arc::new(ServerManager::new(
            registry.clone(),
            PortBinder::from_config(&config),
            config.shutdown_timeout(),
        ));
        let recorder = Recorder::new(registry.clone());

        Self {
            config,
            registry,
            server,
            recorder,
        }
    }

    /// Registers the instrument set. Idempotent.
    pub fn ensure_registered(&self) -> Result<()> {
        self.registry.ensure_registered().map(|_| ())
    }

    /// Starts the endpoint; see [`ServerManager::start`].
    pub async fn start_server(&self, port: u16) -> Result<u16> {
        self.server.start(port).await
    }

    /// Starts the endpoint on the configured port.
    pub async fn start_default(&self) -> Result<u16> {
        self.server.start(self.config.port()).await
    }

    pub async fn start_server_cancellable(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<u16> {
        self.server.start_cancellable(port, cancel).await
    }

    pub async fn stop_server(&self) {
        self.server.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.server.is_running()
    }

    pub fn current_port(&self) -> Option<u16> {
        self.server.current_port()
    }

    pub fn phase(&self) -> ServerPhase {
        self.server.phase()
    }

    /// See [`ServerManager::install_exit_hook`].
    pub fn install_exit_hook(&self) -> bool {
        self.server.install_exit_hook()
    }

    /// See [`ServerManager::install_exit_hook_on`].
    pub fn install_exit_hook_on<F>(&self, trigger: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.server.install_exit_hook_on(trigger)
    }

    pub async fn exited(&self) {
        self.server.exited().await
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Context for one virtual user of `scenario` in `simulation`.
    pub fn session(&self, simulation: &str, scenario: &str) -> SessionContext {
        SessionContext::new(self.recorder.clone(), simulation, scenario)
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn server(&self) -> &Arc<ServerManager> {
        &self.server
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
