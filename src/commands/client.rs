/*!
 * Client subcommands, all routed through the resilient client
 *
 * Each command opens its own pool, performs one operation and closes the
 * pool again whether or not the operation succeeded.
 */

use crate::config::BusConfig;
use crate::error::Result;
use kbus_connect::ResilientClient;
use kbus_proto::EventData;
use serde_json::{json, Value};

/// Arguments of `kbus publish`
#[derive(Debug, Clone, Default)]
pub struct PublishArgs {
    pub event_type: String,
    pub payload: String,
    pub resource_id: String,
    pub data: EventData,
}

async fn connect(config: &BusConfig) -> Result<ResilientClient> {
    Ok(ResilientClient::connect(config.resilient_config()).await?)
}

pub async fn publish(config: &BusConfig, args: PublishArgs) -> Result<Value> {
    let client = connect(config).await?;
    let result = client
        .publish_event(&args.event_type, &args.payload, &args.resource_id, args.data)
        .await;
    client.close().await;

    result?;
    Ok(json!({ "published": args.event_type }))
}

pub async fn signal(
    config: &BusConfig,
    resource_id: &str,
    status: &str,
    data: EventData,
) -> Result<Value> {
    let client = connect(config).await?;
    let result = client
        .signal_resource_completion(resource_id, status, data)
        .await;
    client.close().await;

    result?;
    Ok(json!({ "resource_id": resource_id, "status": status }))
}

pub async fn wait_completion(
    config: &BusConfig,
    resource_id: &str,
    timeout_seconds: i64,
) -> Result<Value> {
    let client = connect(config).await?;
    let result = client
        .wait_for_resource_completion(resource_id, timeout_seconds)
        .await;
    client.close().await;

    Ok(serde_json::to_value(result?)?)
}

pub async fn wait_cleanup(config: &BusConfig, timeout_seconds: i64) -> Result<Value> {
    let client = connect(config).await?;
    let result = client.wait_for_cleanup_signal(timeout_seconds).await;
    client.close().await;

    Ok(serde_json::to_value(result?)?)
}

/// Broker health plus the client's own breaker and pool view
pub async fn health(config: &BusConfig) -> Result<Value> {
    let client = connect(config).await?;
    let result = client.health_check().await;
    let metrics = client.get_metrics().await;
    client.close().await;

    Ok(json!({
        "broker": serde_json::to_value(result?)?,
        "client": serde_json::to_value(metrics)?,
    }))
}
