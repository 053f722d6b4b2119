//! Request/response shapes for every `BusService` procedure
//!
//! Responses use a dual error channel. A transport-level failure (the call
//! never reached a handler) is reported in [`ResponseFrame::error`]; a
//! handler that ran but could not satisfy the request fills the `error`
//! field of its own response. Callers must check both.

use crate::event::{Event, EventData};
use crate::health::HealthStatus;
use serde::{Deserialize, Serialize};

/// Protocol error returned by `GetEvent` when the long-poll window elapses
pub const NO_EVENTS_AVAILABLE: &str = "no events available";

/// Protocol error returned by `GetEvent` for an unknown subscription
pub const INVALID_SUBSCRIPTION: &str = "invalid subscription ID";

/// Protocol error returned by `GetEvent` after the broker shut down
pub const SUBSCRIPTION_CLOSED: &str = "subscription closed";

/// Protocol error returned by `HealthCheck` when the broker has no checker
pub const HEALTH_UNAVAILABLE: &str = "health checker not available";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
    #[serde(default)]
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishEventRequest {
    pub event: Event,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishEventResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalCompletionRequest {
    pub resource_id: String,
    pub status: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalCompletionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitForCompletionRequest {
    pub resource_id: String,
    /// Seconds; 0 selects the broker's default
    #[serde(default)]
    pub timeout: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitForCompletionResponse {
    pub success: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    #[serde(default)]
    pub status: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A call to one of the broker's procedures
///
/// Serialized as `{"method": "BusService.<Name>", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum BusRequest {
    #[serde(rename = "BusService.Subscribe")]
    Subscribe(SubscribeRequest),
    #[serde(rename = "BusService.GetEvent")]
    GetEvent(EventRequest),
    #[serde(rename = "BusService.PublishEvent")]
    PublishEvent(PublishEventRequest),
    #[serde(rename = "BusService.SignalCompletion")]
    SignalCompletion(SignalCompletionRequest),
    #[serde(rename = "BusService.WaitForCompletion")]
    WaitForCompletion(WaitForCompletionRequest),
    #[serde(rename = "BusService.HealthCheck")]
    HealthCheck(HealthCheckRequest),
}

impl BusRequest {
    /// Wire name of the procedure
    pub fn method(&self) -> &'static str {
        match self {
            BusRequest::Subscribe(_) => "BusService.Subscribe",
            BusRequest::GetEvent(_) => "BusService.GetEvent",
            BusRequest::PublishEvent(_) => "BusService.PublishEvent",
            BusRequest::SignalCompletion(_) => "BusService.SignalCompletion",
            BusRequest::WaitForCompletion(_) => "BusService.WaitForCompletion",
            BusRequest::HealthCheck(_) => "BusService.HealthCheck",
        }
    }
}

/// The reply to a [`BusRequest`], tagged with the same method name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "result")]
pub enum BusResponse {
    #[serde(rename = "BusService.Subscribe")]
    Subscribe(SubscribeResponse),
    #[serde(rename = "BusService.GetEvent")]
    GetEvent(EventResponse),
    #[serde(rename = "BusService.PublishEvent")]
    PublishEvent(PublishEventResponse),
    #[serde(rename = "BusService.SignalCompletion")]
    SignalCompletion(SignalCompletionResponse),
    #[serde(rename = "BusService.WaitForCompletion")]
    WaitForCompletion(WaitForCompletionResponse),
    #[serde(rename = "BusService.HealthCheck")]
    HealthCheck(HealthCheckResponse),
}

/// Request envelope; `seq` pairs the call with its response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub seq: u64,
    pub body: BusRequest,
}

/// Request envelope with the body left undecoded
///
/// The server reads this first so that a call with an unknown method or bad
/// parameters can still be answered under its own `seq`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequestFrame {
    pub seq: u64,
    pub body: serde_json::Value,
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub seq: u64,
    #[serde(default)]
    pub body: Option<BusResponse>,
    /// Transport-level failure; set instead of `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    /// A successful reply
    pub fn reply(seq: u64, body: BusResponse) -> Self {
        Self {
            seq,
            body: Some(body),
            error: None,
        }
    }

    /// A transport-level failure for call `seq`
    pub fn failure(seq: u64, error: impl Into<String>) -> Self {
        Self {
            seq,
            body: None,
            error: Some(error.into()),
        }
    }
}
