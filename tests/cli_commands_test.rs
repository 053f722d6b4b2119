//! Subcommands against a live broker on an ephemeral port

use kbus::commands::{self, PublishArgs};
use kbus::config::BusConfig;
use kbus::KbusError;
use kbus_server::{BusServer, ServerConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn start_broker() -> (BusConfig, CancellationToken) {
    let server = BusServer::from_config(&ServerConfig::with_address("127.0.0.1:0"))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));

    let mut config = BusConfig::default();
    config.server.address = addr;
    config.client.pool_size = 1;
    config.retry.initial_interval_ms = 10;
    config.retry.max_interval_ms = 50;
    (config, shutdown)
}

#[tokio::test]
async fn test_signal_then_wait_completion() {
    let (config, shutdown) = start_broker().await;

    let data = commands::parse_data(Some(r#"{"image": "app:1.2"}"#)).unwrap();
    let signaled = commands::signal(&config, "build-7", "completed", data)
        .await
        .unwrap();
    assert_eq!(signaled["resource_id"], "build-7");

    let state = commands::wait_completion(&config, "build-7", 1)
        .await
        .unwrap();
    assert_eq!(state["resource_id"], "build-7");
    assert_eq!(state["status"], "completed");
    assert_eq!(state["data"]["image"], "app:1.2");

    shutdown.cancel();
}

#[tokio::test]
async fn test_publish_reaches_cleanup_waiter() {
    let (config, shutdown) = start_broker().await;

    let waiter = {
        let config = config.clone();
        tokio::spawn(async move { commands::wait_cleanup(&config, 5).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let published = commands::publish(
        &config,
        PublishArgs {
            event_type: "cleanup".to_string(),
            payload: "workflow finished".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(published["published"], "cleanup");

    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event["type"], "cleanup");
    assert_eq!(event["payload"], "workflow finished");

    shutdown.cancel();
}

#[tokio::test]
async fn test_health_reports_broker_and_client() {
    let (config, shutdown) = start_broker().await;

    let report = commands::health(&config).await.unwrap();
    assert_eq!(report["broker"]["healthy"], true);
    assert_eq!(report["client"]["circuit_state"], "closed");
    assert_eq!(report["client"]["pool_size"], 1);

    shutdown.cancel();
}

#[tokio::test]
async fn test_unreachable_broker_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut config = BusConfig::default();
    config.server.address = addr;

    let result = commands::health(&config).await;
    assert!(matches!(result, Err(KbusError::Connect(_))));
}
