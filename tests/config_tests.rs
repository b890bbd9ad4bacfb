//! Integration tests for configuration loading and validation.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tempfile::Builder;

use loadtest_metrics::config::{load_config, render_config, validate_effective_config, ConfigFormat};
use loadtest_metrics::{Config, PortBinder};

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml() {
    let file = write_config(
        ".yaml",
        "port: 9300\nbind: 127.0.0.1\nnamespace: k6\nfinal_scrape_wait_secs: 0\n",
    );
    let config = load_config(Some(file.path())).unwrap();

    assert_eq!(config.port(), 9300);
    assert_eq!(config.bind_ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(config.namespace(), "k6");
    assert_eq!(config.final_scrape_wait(), Duration::ZERO);
    // Missing fields are filled with defaults.
    assert_eq!(config.fallback_range, Some(100));
    assert!(validate_effective_config(&config).is_ok());
}

#[test]
fn test_load_json_with_dashed_keys() {
    let file = write_config(
        ".json",
        r#"{"port": 9400, "retry-attempts": 2, "retry-delay-ms": 250, "fallback-range": 5}"#,
    );
    let config = load_config(Some(file.path())).unwrap();

    assert_eq!(config.port(), 9400);
    assert_eq!(config.retry_attempts(), 2);
    assert_eq!(config.retry_delay(), Duration::from_millis(250));
    assert_eq!(config.fallback_range(), 5);

    let binder = PortBinder::from_config(&config);
    assert_eq!(binder.fallback_end(9400), 9405);
}

#[test]
fn test_load_toml() {
    let file = write_config(
        ".toml",
        "port = 9500\nenable_runtime_metrics = false\nlog_level = \"debug\"\n",
    );
    let config = load_config(Some(file.path())).unwrap();

    assert_eq!(config.port(), 9500);
    assert!(!config.enable_runtime_metrics());
    assert_eq!(config.log_level.as_deref(), Some("debug"));
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let absent = dir.path().join("absent.yaml");
    let config = load_config(Some(absent.as_path())).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config(".yaml", "port: [not, a, port]\n");
    assert!(load_config(Some(file.path())).is_err());
}

#[test]
fn test_invalid_namespace_rejected() {
    let file = write_config(".yaml", "namespace: \"load-test\"\n");
    let config = load_config(Some(file.path())).unwrap();
    assert!(validate_effective_config(&config).is_err());
}

#[test]
fn test_rendered_config_loads_back() {
    let original = Config {
        port: Some(9999),
        namespace: Some("custom".into()),
        ..Config::default()
    };

    for (format, suffix) in [
        (ConfigFormat::Yaml, ".yaml"),
        (ConfigFormat::Json, ".json"),
        (ConfigFormat::Toml, ".toml"),
    ] {
        let rendered = render_config(&original, format).unwrap();
        let file = write_config(suffix, &rendered);
        assert_eq!(load_config(Some(file.path())).unwrap(), original, "{format:?}");
    }
}
