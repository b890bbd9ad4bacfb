//! Configuration management for loadtest-metrics-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::binder::{DEFAULT_FALLBACK_RANGE, DEFAULT_RETRY_ATTEMPTS};
use crate::metrics::DEFAULT_NAMESPACE;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9102;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FINAL_SCRAPE_WAIT_SECS: u64 = 10;

/// Configuration format options for `show_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Exporter configuration. Every field is optional; accessors fall back to
/// the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Port binding
    #[serde(alias = "retry-attempts")]
    pub retry_attempts: Option<u32>,
    #[serde(alias = "retry-delay-ms")]
    pub retry_delay_ms: Option<u64>,
    #[serde(alias = "fallback-range")]
    pub fallback_range: Option<u16>,
    #[serde(alias = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: Option<u64>,

    // Metrics surface
    pub namespace: Option<String>,
    #[serde(alias = "enable-runtime-metrics")]
    pub enable_runtime_metrics: Option<bool>,

    // Simulation lifecycle
    #[serde(alias = "final-scrape-wait-secs")]
    pub final_scrape_wait_secs: Option<u64>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            retry_attempts: Some(DEFAULT_RETRY_ATTEMPTS),
            retry_delay_ms: Some(DEFAULT_RETRY_DELAY_MS),
            fallback_range: Some(DEFAULT_FALLBACK_RANGE),
            shutdown_timeout_secs: Some(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            enable_runtime_metrics: Some(true),
            final_scrape_wait_secs: Some(DEFAULT_FINAL_SCRAPE_WAIT_SECS),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Bind address; an unparsable value falls back to all interfaces.
    /// `validate_effective_config` rejects those up front.
    pub fn bind_ip(&self) -> IpAddr {
        self.bind
            .as_deref()
            .and_then(|b| b.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS))
    }

    pub fn fallback_range(&self) -> u16 {
        self.fallback_range.unwrap_or(DEFAULT_FALLBACK_RANGE)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(
            self.shutdown_timeout_secs
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        )
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn enable_runtime_metrics(&self) -> bool {
        self.enable_runtime_metrics.unwrap_or(true)
    }

    pub fn final_scrape_wait(&self) -> Duration {
        Duration::from_secs(
            self.final_scrape_wait_secs
                .unwrap_or(DEFAULT_FINAL_SCRAPE_WAIT_SECS),
        )
    }
}

/// Checks a Prometheus metric name prefix: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_valid_namespace(ns: &str) -> bool {
    let mut chars = ns.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.port() == 0 {
        return Err("port must be between 1 and 65535".into());
    }

    if let Some(bind) = cfg.bind.as_deref() {
        if bind.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid bind address '{}'", bind).into());
        }
    }

    if !is_valid_namespace(cfg.namespace()) {
        return Err(format!(
            "Invalid namespace '{}', expected [a-zA-Z_:][a-zA-Z0-9_:]*",
            cfg.namespace()
        )
        .into());
    }

    if cfg.fallback_range() == 0 {
        return Err("fallback_range must be at least 1".into());
    }

    if cfg.shutdown_timeout().is_zero() {
        return Err("shutdown_timeout_secs must be at least 1".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if !matches!(
            level.to_ascii_lowercase().as_str(),
            "off" | "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(format!("Invalid log_level '{}'", level).into());
        }
    }

    Ok(())
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/loadtest-metrics/exporter.yaml",
            "/etc/loadtest-metrics/exporter.yml",
            "/etc/loadtest-metrics/exporter.json",
            "./loadtest-metrics.yaml",
            "./loadtest-metrics.yml",
            "./loadtest-metrics.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if path.to_string_lossy().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    let loaded: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        // Default to YAML
        _ => serde_yaml::from_str(&content)?,
    };
    info!("Loaded configuration from: {}", path.display());

    Ok(merge_defaults(loaded))
}

/// Fills fields the file left out with their defaults.
fn merge_defaults(loaded: Config) -> Config {
    let d = Config::default();
    Config {
        port: loaded.port.or(d.port),
        bind: loaded.bind.or(d.bind),
        retry_attempts: loaded.retry_attempts.or(d.retry_attempts),
        retry_delay_ms: loaded.retry_delay_ms.or(d.retry_delay_ms),
        fallback_range: loaded.fallback_range.or(d.fallback_range),
        shutdown_timeout_secs: loaded.shutdown_timeout_secs.or(d.shutdown_timeout_secs),
        namespace: loaded.namespace.or(d.namespace),
        enable_runtime_metrics: loaded.enable_runtime_metrics.or(d.enable_runtime_metrics),
        final_scrape_wait_secs: loaded.final_scrape_wait_secs.or(d.final_scrape_wait_secs),
        log_level: loaded.log_level.or(d.log_level),
    }
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Prints configuration in the requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, format)?;
    println!("{output}");
    Ok(())
}
