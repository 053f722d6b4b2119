//! Multiplexed RPC connection to a bus broker
//!
//! Many calls may be outstanding on one connection. Each request is tagged
//! with a sequence number and parked in a pending table; a background reader
//! routes every response frame back to its caller. When the socket goes
//! away, the reader marks the connection closed and fails every parked call.

use crate::error::{ConnectError, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use kbus_proto::{BusRequest, BusResponse, ClientCodec, RequestFrame, ResponseFrame};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

type FrameSink = SplitSink<Framed<TcpStream, ClientCodec>, RequestFrame>;
type FrameStream = SplitStream<Framed<TcpStream, ClientCodec>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseFrame>>>>;

/// One TCP connection to the broker
pub struct BusConnection {
    addr: String,
    writer: Mutex<FrameSink>,
    pending: Pending,
    next_seq: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl BusConnection {
    /// Dial the broker at `addr`
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let (writer, frames) = Framed::new(stream, ClientCodec::new()).split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            frames,
            pending.clone(),
            closed.clone(),
            addr.to_string(),
        ));

        debug!(addr = %addr, "Connected to bus");

        Ok(Self {
            addr: addr.to_string(),
            writer: Mutex::new(writer),
            pending,
            next_seq: AtomicU64::new(0),
            closed,
            reader,
        })
    }

    /// Remote address this connection was opened to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send one call and wait for its reply
    ///
    /// A frame-level server error becomes [`ConnectError::Rpc`]; the
    /// response's own `error` field is left for the caller to inspect.
    pub async fn call(&self, request: BusRequest) -> Result<BusResponse> {
        if self.is_closed() {
            return Err(ConnectError::ConnectionClosed);
        }

        let method = request.method();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(seq, tx);

        // The reader may have drained the table between the check and the insert
        if self.is_closed() {
            self.pending.lock().await.remove(&seq);
            return Err(ConnectError::ConnectionClosed);
        }

        let sent = {
            let mut writer = self.writer.lock().await;
            writer.send(RequestFrame { seq, body: request }).await
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&seq);
            self.closed.store(true, Ordering::SeqCst);
            return Err(e.into());
        }

        let frame = rx.await.map_err(|_| ConnectError::ConnectionClosed)?;
        if let Some(error) = frame.error {
            return Err(ConnectError::Rpc(error));
        }
        frame.body.ok_or(ConnectError::UnexpectedResponse(method))
    }

    /// Shut the socket and fail every outstanding call
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(addr = %self.addr, error = %e, "Error closing bus connection");
        }
        self.reader.abort();
        self.pending.lock().await.clear();
        debug!(addr = %self.addr, "Closed bus connection");
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for BusConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConnection")
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop(mut frames: FrameStream, pending: Pending, closed: Arc<AtomicBool>, addr: String) {
    while let Some(next) = frames.next().await {
        match next {
            Ok(frame) => {
                let waiter = pending.lock().await.remove(&frame.seq);
                match waiter {
                    // The caller may have given up; the reply is discarded
                    Some(tx) => {
                        let _ = tx.send(frame);
                    }
                    None => debug!(addr = %addr, seq = frame.seq, "Reply for unknown call"),
                }
            }
            Err(e) => {
                warn!(addr = %addr, error = %e, "Bus connection read failed");
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
    debug!(addr = %addr, "Bus connection reader stopped");
}
