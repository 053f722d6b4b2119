//! TCP front end for the bus service
//!
//! One task accepts connections. Each connection gets a reader loop and a
//! writer task; every decoded call is dispatched on its own task so a
//! long-polling `GetEvent` never blocks other calls on the same socket.
//! Responses are written in completion order and paired by `seq`.

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::health::HealthChecker;
use crate::service::{BusApi, BusService};
use futures::{SinkExt, StreamExt};
use kbus_proto::{BusRequest, BusResponse, RawRequestFrame, ResponseFrame, ServerCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const METHODS: [&str; 6] = [
    "BusService.Subscribe",
    "BusService.GetEvent",
    "BusService.PublishEvent",
    "BusService.SignalCompletion",
    "BusService.WaitForCompletion",
    "BusService.HealthCheck",
];

/// Transport error for a call whose handler did not finish
pub const CALL_FAILED: &str = "rpc: call handler failed";

/// Responses queued per connection before handlers wait on the writer
const WRITE_QUEUE_DEPTH: usize = 64;

/// A bound broker listener
pub struct BusServer {
    listener: TcpListener,
    service: Arc<BusService>,
}

impl BusServer {
    /// Bind `addr` and serve `service` on it
    pub async fn bind(addr: &str, service: Arc<BusService>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, service })
    }

    /// Validate `config`, build a service with a health checker and bind it
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let health = Arc::new(HealthChecker::new(config.health()));
        let service = Arc::new(BusService::new(config.service(), Some(health)));
        Self::bind(&config.address, service).await
    }

    /// The address actually bound; useful with port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> &Arc<BusService> {
        &self.service
    }

    /// Accept connections until `shutdown` is cancelled, then shut the service down
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let local = self.listener.local_addr()?;
        info!(address = %local, "Bus server listening");

        let health_loop = self
            .service
            .health_checker()
            .map(|health| health.start(shutdown.child_token()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        let service: Arc<dyn BusApi> = self.service.clone();
                        tokio::spawn(handle_connection(stream, peer, service, shutdown.child_token()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        info!("Bus server shutting down");
        self.service.shutdown().await;

        if let Some(handle) = health_loop {
            if let Err(e) = handle.await {
                error!(error = %e, "Health checker task failed");
            }
        }

        Ok(())
    }
}

/// Run a broker with a health checker until `shutdown` is cancelled
pub async fn start_bus_server(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let server = BusServer::from_config(&config).await?;
    server.serve(shutdown).await
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<dyn BusApi>,
    shutdown: CancellationToken,
) {
    let (mut sink, mut frames) = Framed::new(stream, ServerCodec::new()).split();
    let (tx, mut rx) = mpsc::channel::<ResponseFrame>(WRITE_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(peer = %peer, error = %e, "Failed to write response");
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                let service = service.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = run_call(service, frame).await;
                    // Peer may be gone; nothing left to tell it
                    let _ = tx.send(response).await;
                });
            }
            Some(Err(e)) => {
                warn!(peer = %peer, error = %e, "Malformed frame, closing connection");
                break;
            }
            None => break,
        }
    }

    drop(tx);
    if shutdown.is_cancelled() {
        writer.abort();
    }
    debug!(peer = %peer, "Connection closed");
}

/// Run one call on its own task; every frame gets an answer even if the
/// handler dies
async fn run_call(service: Arc<dyn BusApi>, frame: RawRequestFrame) -> ResponseFrame {
    let seq = frame.seq;
    let call = tokio::spawn(async move { dispatch(service.as_ref(), frame).await });

    match call.await {
        Ok(response) => response,
        Err(e) => {
            error!(seq, error = %e, "Call handler failed");
            ResponseFrame::failure(seq, CALL_FAILED)
        }
    }
}

/// Decode one call, run it against `service` and build the reply
///
/// Unknown methods and undecodable parameters are answered on the frame's
/// transport error channel.
pub async fn dispatch(service: &dyn BusApi, frame: RawRequestFrame) -> ResponseFrame {
    let seq = frame.seq;
    let method = frame
        .body
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    let request: BusRequest = match serde_json::from_value(frame.body) {
        Ok(request) => request,
        Err(e) if METHODS.contains(&method.as_str()) => {
            warn!(seq, method = %method, error = %e, "Invalid parameters");
            return ResponseFrame::failure(seq, format!("rpc: invalid params for {method}: {e}"));
        }
        Err(_) => {
            warn!(seq, method = %method, "Unknown method");
            return ResponseFrame::failure(seq, format!("rpc: can't find method {method}"));
        }
    };

    debug!(seq, method = request.method(), "Dispatching call");

    let body = match request {
        BusRequest::Subscribe(req) => BusResponse::Subscribe(service.subscribe(req).await),
        BusRequest::GetEvent(req) => BusResponse::GetEvent(service.get_event(req).await),
        BusRequest::PublishEvent(req) => {
            BusResponse::PublishEvent(service.publish_event(req).await)
        }
        BusRequest::SignalCompletion(req) => {
            BusResponse::SignalCompletion(service.signal_completion(req).await)
        }
        BusRequest::WaitForCompletion(req) => {
            BusResponse::WaitForCompletion(service.wait_for_completion(req).await)
        }
        BusRequest::HealthCheck(req) => BusResponse::HealthCheck(service.health_check(req).await),
    };

    ResponseFrame::reply(seq, body)
}
