//! Integration tests for kbus-connect
//!
//! Each test runs its own broker on an ephemeral port.

use kbus_connect::{
    BusClient, BusClientFactory, ClientConfig, ConnectError, ResilientClient, ResilientConfig,
};
use kbus_core_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ConnectionFactory, ConnectionPool,
    PoolConfig, RetryConfig,
};
use kbus_proto::EventData;
use kbus_server::{BusServer, ServerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct Broker {
    addr: String,
    shutdown: CancellationToken,
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_broker() -> Broker {
    let server = BusServer::from_config(&ServerConfig::with_address("127.0.0.1:0"))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));
    Broker { addr, shutdown }
}

fn fast_config(addr: &str) -> ResilientConfig {
    ResilientConfig {
        retry: RetryConfig {
            max_retries: 2,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(50),
            multiplier: 2.0,
        },
        pool: PoolConfig { size: 2 },
        ..ResilientConfig::with_address(addr)
    }
}

#[tokio::test]
async fn test_wait_for_events_receives_published_event() {
    let broker = start_broker().await;
    let waiter = BusClient::connect(&broker.addr).await.unwrap();
    let publisher = BusClient::connect(&broker.addr).await.unwrap();

    let wait = tokio::spawn(async move {
        let mut seen = Vec::new();
        let result = waiter
            .wait_for_events(|event| {
                seen.push((event.event_type.clone(), event.payload.clone()));
                event.event_type == "ready"
            })
            .await;
        (result, seen)
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    publisher
        .publish_event("progress", "half", "", EventData::new())
        .await
        .unwrap();
    publisher
        .publish_event("ready", "done", "", EventData::new())
        .await
        .unwrap();

    let (result, seen) = wait.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(
        seen,
        vec![
            ("progress".to_string(), "half".to_string()),
            ("ready".to_string(), "done".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_wait_for_events_times_out() {
    let broker = start_broker().await;
    let client = BusClient::connect(&broker.addr).await.unwrap();
    assert_eq!(client.config(), &ClientConfig::default());

    let start = Instant::now();
    let result = client.wait_for_events(|_| false).await;

    assert!(matches!(result, Err(ConnectError::Timeout)));
    assert!(result.unwrap_err().to_string().contains("timeout"));
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(start.elapsed() < Duration::from_secs(8));
}

#[tokio::test]
async fn test_subscription_ids_are_distinct() {
    let broker = start_broker().await;
    let client = BusClient::connect(&broker.addr).await.unwrap();

    let first = client.subscribe().await.unwrap();
    let second = client.subscribe().await.unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_health_check_through_basic_client() {
    let broker = start_broker().await;
    let client = BusClient::connect(&broker.addr).await.unwrap();
    client.subscribe().await.unwrap();

    let status = client.health_check().await.unwrap();
    assert!(status.healthy);
    assert_eq!(status.metrics.total_connections, 1);
}

#[tokio::test]
async fn test_resilient_signal_and_wait_completion() {
    let broker = start_broker().await;
    let client = ResilientClient::connect(fast_config(&broker.addr))
        .await
        .unwrap();

    let mut data = EventData::new();
    data.insert("exit_code".to_string(), serde_json::json!(0));
    client
        .signal_resource_completion("job-1", "completed", data)
        .await
        .unwrap();

    let state = client
        .wait_for_resource_completion("job-1", 1)
        .await
        .unwrap();
    assert_eq!(state.resource_id, "job-1");
    assert_eq!(state.status, "completed");
    assert_eq!(state.data["exit_code"], 0);
    assert!(state.timestamp > 0);

    client.close().await;
}

#[tokio::test]
async fn test_resilient_cleanup_signal() {
    let broker = start_broker().await;
    let client = Arc::new(
        ResilientClient::connect(fast_config(&broker.addr))
            .await
            .unwrap(),
    );

    let wait = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_for_cleanup_signal(5).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    client
        .publish_event("dockercleanup", "tear down", "", EventData::new())
        .await
        .unwrap();

    let event = wait.await.unwrap().unwrap();
    assert_eq!(event.event_type, "dockercleanup");
    assert_eq!(event.payload, "tear down");
}

#[tokio::test]
async fn test_retry_budget_is_max_retries_plus_one() {
    let broker = start_broker().await;
    let client = ResilientClient::connect(fast_config(&broker.addr))
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let result: Result<(), ConnectError> = client
        .execute_with_retry(|_client| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ConnectError::Failed("probe"))
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(ConnectError::RetriesExhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, ConnectError::Failed("probe")));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_recovers_on_later_attempt() {
    let broker = start_broker().await;
    let client = ResilientClient::connect(fast_config(&broker.addr))
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let result = client
        .execute_with_retry(|_client| {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ConnectError::ConnectionClosed)
                } else {
                    Ok("third time")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "third time");
    let metrics = client.get_metrics().await;
    assert_eq!(metrics.circuit_state, CircuitState::Closed);
    assert_eq!(metrics.circuit_successes, 1);
    assert_eq!(metrics.circuit_failures, 0);
}

#[tokio::test]
async fn test_circuit_opens_and_rejects_without_calling() {
    let broker = start_broker().await;
    let config = ResilientConfig {
        retry: RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
        circuit_breaker: CircuitBreakerConfig {
            max_failures: 2,
            ..CircuitBreakerConfig::default()
        },
        ..fast_config(&broker.addr)
    };
    let client = ResilientClient::connect(config).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let result: Result<(), ConnectError> = client
            .execute_with_retry(|_client| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ConnectError::Failed("probe"))
                }
            })
            .await;
        assert!(result.is_err());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let rejected = client.health_check().await;
    assert!(matches!(rejected, Err(ConnectError::CircuitOpen)));

    let metrics = client.get_metrics().await;
    assert_eq!(metrics.circuit_state, CircuitState::Open);
    assert_eq!(metrics.circuit_failures, 2);
}

#[tokio::test]
async fn test_metrics_snapshot() {
    let broker = start_broker().await;
    let client = ResilientClient::connect(fast_config(&broker.addr))
        .await
        .unwrap();

    let status = client.health_check().await.unwrap();
    assert!(status.healthy);

    let metrics = client.get_metrics().await;
    assert_eq!(metrics.circuit_state, CircuitState::Closed);
    assert_eq!(metrics.circuit_successes, 1);
    assert!(metrics.pool_healthy);
    assert_eq!(metrics.pool_size, 2);

    client.close().await;
    let metrics = client.get_metrics().await;
    assert!(!metrics.pool_healthy);
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_close_cancels_in_flight_wait() {
    let broker = start_broker().await;
    let client = Arc::new(
        ResilientClient::connect(fast_config(&broker.addr))
            .await
            .unwrap(),
    );

    let wait = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_for_resource_completion("never", 30).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let start = Instant::now();
    client.close().await;

    let result = tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ConnectError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_pool_startup_is_all_or_nothing() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = ResilientClient::connect(fast_config(&addr)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_huge_timeouts_do_not_break_the_client() {
    let broker = start_broker().await;
    let client = Arc::new(BusClient::connect(&broker.addr).await.unwrap());

    let completion = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_for_resource_completion("deploy", i64::MAX).await })
    };
    let cleanup = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_for_cleanup_signal(i64::MAX).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    client
        .signal_resource_completion("deploy", "completed", EventData::new())
        .await
        .unwrap();
    client
        .publish_event("cleanup", "all done", "", EventData::new())
        .await
        .unwrap();

    let state = tokio::time::timeout(Duration::from_secs(3), completion)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(state.status, "completed");

    let event = tokio::time::timeout(Duration::from_secs(3), cleanup)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "cleanup");
}

async fn bus_pool(addr: &str, size: usize) -> ConnectionPool<BusClient> {
    let factory: Arc<dyn ConnectionFactory<BusClient>> =
        Arc::new(BusClientFactory::new(addr, ClientConfig::default()));
    ConnectionPool::connect(factory, PoolConfig { size })
        .await
        .unwrap()
}

fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(50),
        multiplier: 2.0,
    }
}

#[tokio::test]
async fn test_empty_pool_uses_every_attempt() {
    let broker = start_broker().await;
    let pool = bus_pool(&broker.addr, 1).await;
    pool.close().await;

    let client = ResilientClient::with_parts(
        pool,
        CircuitBreaker::new(CircuitBreakerConfig::default()),
        quick_retry(),
    );

    match client.health_check().await {
        Err(ConnectError::RetriesExhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, ConnectError::NoConnection));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(client.get_metrics().await.circuit_failures, 1);
}

#[tokio::test]
async fn test_retry_moves_past_dead_pooled_connection() {
    let broker = start_broker().await;
    let pool = bus_pool(&broker.addr, 2).await;

    // Close connection 0, then step the cursor back round to it
    pool.get().await.unwrap().close().await;
    pool.get().await.unwrap();

    let client = ResilientClient::with_parts(
        pool,
        CircuitBreaker::new(CircuitBreakerConfig::default()),
        quick_retry(),
    );
    let calls = Arc::new(AtomicUsize::new(0));

    let status = client
        .execute_with_retry(|bus| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                bus.health_check().await
            }
        })
        .await
        .unwrap();

    assert!(status.healthy);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
