//! CLI arguments for loadtest-metrics-exporter.
//!
//! This module defines the command-line interface using the clap library and
//! folds the flags into the file/default configuration.

use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use loadtest_metrics::config::{load_config, Config, ConfigFormat};

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parses the `log_level` config value; unknown values fall back to info.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("off") => LogLevel::Off,
            Some("error") => LogLevel::Error,
            Some("warn") => LogLevel::Warn,
            Some("debug") => LogLevel::Debug,
            Some("trace") => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "loadtest-metrics-exporter",
    about = "Prometheus metrics endpoint for load-test runs",
    long_about = "Prometheus metrics endpoint for load-test runs.\n\n\
                  Exposes request latency histograms, request and error counters and \
                  active user gauges of a running load test on /metrics. The port is \
                  retried while busy and falls back to the next free port above it.",
    version,
    propagate_version = true
)]
pub struct Args {
    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Metric name prefix
    #[arg(long)]
    pub namespace: Option<String>,

    /// Attempts to re-bind a busy port before scanning for another one
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Delay between bind attempts in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Number of ports above the preferred one to scan
    #[arg(long)]
    pub fallback_range: Option<u16>,
}

/// Effective configuration: CLI > config file > defaults.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(namespace) = &args.namespace {
        config.namespace = Some(namespace.clone());
    }

    // Port binding
    if let Some(attempts) = args.retry_attempts {
        config.retry_attempts = Some(attempts);
    }
    if let Some(delay) = args.retry_delay_ms {
        config.retry_delay_ms = Some(delay);
    }
    if let Some(range) = args.fallback_range {
        config.fallback_range = Some(range);
    }

    if let Some(level) = args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("loadtest-metrics-exporter").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_no_config_yields_defaults() {
        let config = resolve_config(&parse(&["--no-config"])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "port: 9300\nnamespace: k6\nfallback_range: 7").unwrap();

        let path = file.path().to_str().unwrap();
        let config = resolve_config(&parse(&["--config", path, "--port", "9400"])).unwrap();

        assert_eq!(config.port(), 9400);
        assert_eq!(config.namespace(), "k6");
        assert_eq!(config.fallback_range(), 7);
        // Untouched fields keep their defaults.
        assert_eq!(config.retry_attempts(), 5);
    }

    #[test]
    fn test_log_level_precedence() {
        let config = resolve_config(&parse(&["--no-config", "--log-level", "debug"])).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(
            LogLevel::from_config(config.log_level.as_deref()),
            LogLevel::Debug
        );
        assert_eq!(LogLevel::from_config(None), LogLevel::Info);
    }

    #[test]
    fn test_binding_flags() {
        let config = resolve_config(&parse(&[
            "--no-config",
            "--bind",
            "127.0.0.1",
            "--retry-attempts",
            "2",
            "--retry-delay-ms",
            "50",
        ]))
        .unwrap();

        assert_eq!(config.bind.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.retry_attempts(), 2);
        assert_eq!(config.retry_delay(), std::time::Duration::from_millis(50));
    }
}
