//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::{Ipv4Addr, TcpListener};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use loadtest_metrics::{Config, MetricsSubsystem};

/// Config bound to localhost with fast retries and no final-scrape wait.
pub fn test_config() -> Config {
    Config {
        bind: Some("127.0.0.1".into()),
        retry_attempts: Some(1),
        retry_delay_ms: Some(20),
        fallback_range: Some(20),
        shutdown_timeout_secs: Some(2),
        enable_runtime_metrics: Some(false),
        final_scrape_wait_secs: Some(0),
        ..Config::default()
    }
}

pub fn subsystem() -> MetricsSubsystem {
    MetricsSubsystem::new(test_config())
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Holds `count` consecutive ports starting at the returned base.
pub fn occupy_consecutive(count: u16) -> (u16, Vec<TcpListener>) {
    for _ in 0..100 {
        let base = free_port();
        if base.checked_add(count).is_none() {
            continue;
        }

        let held: Vec<TcpListener> = (base..base + count)
            .map_while(|port| TcpListener::bind((Ipv4Addr::LOCALHOST, port)).ok())
            .collect();
        if held.len() == count as usize {
            return (base, held);
        }
    }
    panic!("could not occupy {count} consecutive ports");
}

/// `true` if nothing listens on `port` any more.
pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// Polls until `port` is free again or the timeout expires.
pub async fn wait_until_free(port: u16) -> bool {
    for _ in 0..100 {
        if port_is_free(port) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Raw HTTP/1.1 GET; returns the response head (status line and headers) and
/// the body.
pub async fn http_get(port: u16, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
        .await
        .unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: localhost:{port}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8_lossy(&raw).into_owned();

    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
    (head.to_string(), body.to_string())
}
