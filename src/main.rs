//! loadtest-metrics-exporter
//!
//! Standalone metrics endpoint with tracing logging. Serves `/metrics` from a
//! fresh subsystem until SIGINT/SIGTERM, then stops the server cleanly.

mod cli;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};

use cli::{resolve_config, Args, LogLevel};
use loadtest_metrics::config::{show_config, validate_effective_config, Config};
use loadtest_metrics::{termination_signal, MetricsSubsystem};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let level = LogLevel::from_config(config.log_level.as_deref());
    let max_level = match level {
        LogLevel::Off | LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = resolve_config(&args).map_err(|e| anyhow::anyhow!("{e}"))?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format).map_err(|e| anyhow::anyhow!("{e}"));
    }

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config)?;

    info!("Starting loadtest-metrics-exporter");

    let subsystem = Arc::new(MetricsSubsystem::new(config));
    subsystem.install_exit_hook_on(async {
        termination_signal().await;
    });

    match subsystem.start_default().await {
        Ok(port) => info!("Serving metrics on {}:{}", subsystem.config().bind_ip(), port),
        Err(e) => {
            // Recording keeps working; only the endpoint is missing.
            error!("Metrics server not started: {}", e);
        }
    }

    subsystem.exited().await;

    info!("loadtest-metrics-exporter stopped gracefully");
    Ok(())
}
