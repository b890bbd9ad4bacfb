//! Integration tests for the server lifecycle and port selection.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{free_port, occupy_consecutive, port_is_free, subsystem, test_config, wait_until_free};
use loadtest_metrics::{Config, MetricsError, MetricsSubsystem, ServerPhase};

#[tokio::test]
async fn test_concurrent_start_single_listener() {
    let subsystem = Arc::new(subsystem());
    let port = free_port();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let subsystem = subsystem.clone();
            tokio::spawn(async move { subsystem.start_server(port).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), port);
    }

    assert!(subsystem.is_running());
    assert_eq!(subsystem.current_port(), Some(port));
    assert!(!port_is_free(port));

    subsystem.stop_server().await;
    assert!(!subsystem.is_running());
    assert!(port_is_free(port));
}

#[tokio::test]
async fn test_busy_port_falls_back_into_range() {
    let (base, _held) = occupy_consecutive(1);
    let subsystem = subsystem();

    let bound = subsystem.start_server(base).await.unwrap();
    let range_end = base + 20;

    assert!(bound > base && bound <= range_end, "bound {bound}");
    assert_eq!(subsystem.current_port(), Some(bound));

    subsystem.stop_server().await;
}

#[tokio::test]
async fn test_exhausted_range_reports_unavailable() {
    let (base, _held) = occupy_consecutive(4);
    let subsystem = MetricsSubsystem::new(Config {
        fallback_range: Some(3),
        ..test_config()
    });

    let err = subsystem.start_server(base).await.unwrap_err();
    assert!(err.is_port_related());
    match err {
        MetricsError::PortUnavailable { port, range_end } => {
            assert_eq!(port, base);
            assert_eq!(range_end, base + 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!subsystem.is_running());
    assert_eq!(subsystem.phase(), ServerPhase::Stopped);
}

#[tokio::test]
async fn test_busy_port_is_retried_until_released() {
    let (base, mut held) = occupy_consecutive(1);
    let subsystem = Arc::new(MetricsSubsystem::new(Config {
        retry_attempts: Some(50),
        retry_delay_ms: Some(20),
        ..test_config()
    }));

    let starter = {
        let subsystem = subsystem.clone();
        tokio::spawn(async move { subsystem.start_server(base).await })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(subsystem.phase(), ServerPhase::Starting { requested: base });
    assert!(!subsystem.is_running());
    held.clear();

    assert_eq!(starter.await.unwrap().unwrap(), base);
    subsystem.stop_server().await;
}

#[tokio::test]
async fn test_cancel_pending_wait() {
    let (base, _held) = occupy_consecutive(1);
    let subsystem = Arc::new(MetricsSubsystem::new(Config {
        retry_attempts: Some(5),
        retry_delay_ms: Some(10_000),
        ..test_config()
    }));
    let cancel = CancellationToken::new();

    let starter = {
        let subsystem = subsystem.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { subsystem.start_server_cancellable(base, &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(2), starter)
        .await
        .expect("cancel did not interrupt the wait")
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, MetricsError::BindInterrupted { port } if port == base));
    assert_eq!(subsystem.phase(), ServerPhase::Stopped);
    assert!(!subsystem.is_running());
    assert_eq!(subsystem.current_port(), None);
}

#[tokio::test]
async fn test_restart_on_other_port() {
    let subsystem = subsystem();
    let first = subsystem.start_server(free_port()).await.unwrap();
    let second = subsystem.start_server(free_port()).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(subsystem.current_port(), Some(second));
    assert!(port_is_free(first));
    assert!(!port_is_free(second));

    subsystem.stop_server().await;
    assert!(port_is_free(second));
}

#[tokio::test]
async fn test_stop_when_stopped_is_noop() {
    let subsystem = subsystem();
    subsystem.stop_server().await;
    subsystem.stop_server().await;
    assert_eq!(subsystem.phase(), ServerPhase::Stopped);
}

#[tokio::test]
async fn test_registration_conflict_fails_start() {
    let shared = prometheus::Registry::new();
    let squatter = prometheus::IntCounter::new("gatling_requests_total", "taken").unwrap();
    shared.register(Box::new(squatter)).unwrap();

    let subsystem = MetricsSubsystem::with_registry(test_config(), shared);
    let err = subsystem.start_server(free_port()).await.unwrap_err();

    assert!(matches!(err, MetricsError::RegistrationConflict(_)));
    assert!(!err.is_port_related());
    assert!(!subsystem.is_running());
}

#[tokio::test]
async fn test_exit_hook_stops_server() {
    let subsystem = subsystem();
    let port = subsystem.start_server(free_port()).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    assert!(subsystem.install_exit_hook_on(async move {
        let _ = rx.await;
    }));
    assert!(!subsystem.install_exit_hook_on(std::future::pending()));

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), subsystem.exited())
        .await
        .expect("exit hook did not finish");

    assert_eq!(subsystem.phase(), ServerPhase::Stopped);
    assert!(wait_until_free(port).await);

    // Terminating; no new server comes up.
    let err = subsystem.start_server(free_port()).await.unwrap_err();
    assert!(matches!(err, MetricsError::BindInterrupted { .. }));
}
