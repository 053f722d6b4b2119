//! End-to-end tests speaking the frame protocol directly to a live broker

use futures::{SinkExt, StreamExt};
use kbus_proto::{
    BusRequest, BusResponse, ClientCodec, Event, EventRequest, PublishEventRequest, RequestFrame,
    ResponseFrame, SubscribeRequest, NO_EVENTS_AVAILABLE,
};
use kbus_server::{BusServer, ServerConfig};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

type Wire = Framed<TcpStream, ClientCodec>;

async fn start_broker(long_poll: Duration) -> (SocketAddr, CancellationToken) {
    let config = ServerConfig {
        long_poll_timeout: long_poll,
        ..ServerConfig::with_address("127.0.0.1:0")
    };
    let server = BusServer::from_config(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));
    (addr, shutdown)
}

async fn connect(addr: SocketAddr) -> Wire {
    Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new())
}

async fn call(wire: &mut Wire, seq: u64, body: BusRequest) -> BusResponse {
    wire.send(RequestFrame { seq, body }).await.unwrap();
    let frame = wire.next().await.unwrap().unwrap();
    assert_eq!(frame.seq, seq);
    assert!(frame.error.is_none(), "transport error: {:?}", frame.error);
    frame.body.unwrap()
}

#[tokio::test]
async fn test_subscribe_publish_get_event() {
    let (addr, shutdown) = start_broker(Duration::from_secs(5)).await;
    let mut wire = connect(addr).await;

    let id = match call(&mut wire, 1, BusRequest::Subscribe(SubscribeRequest {})).await {
        BusResponse::Subscribe(resp) => resp.id,
        other => panic!("unexpected response: {other:?}"),
    };

    let published = call(
        &mut wire,
        2,
        BusRequest::PublishEvent(PublishEventRequest {
            event: Event::new("ready", "done"),
        }),
    )
    .await;
    assert!(matches!(published, BusResponse::PublishEvent(resp) if resp.success));

    match call(&mut wire, 3, BusRequest::GetEvent(EventRequest { id })).await {
        BusResponse::GetEvent(resp) => {
            assert_eq!(resp.error, None);
            assert_eq!(resp.event.event_type, "ready");
            assert_eq!(resp.event.payload, "done");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    shutdown.cancel();
}

#[tokio::test]
async fn test_long_poll_does_not_block_other_calls() {
    let (addr, shutdown) = start_broker(Duration::from_millis(500)).await;
    let mut wire = connect(addr).await;

    let id = match call(&mut wire, 1, BusRequest::Subscribe(SubscribeRequest {})).await {
        BusResponse::Subscribe(resp) => resp.id,
        other => panic!("unexpected response: {other:?}"),
    };

    // The long poll goes out first, the subscribe second; the subscribe must
    // come back while the poll is still parked.
    wire.send(RequestFrame {
        seq: 10,
        body: BusRequest::GetEvent(EventRequest { id }),
    })
    .await
    .unwrap();
    wire.send(RequestFrame {
        seq: 11,
        body: BusRequest::Subscribe(SubscribeRequest {}),
    })
    .await
    .unwrap();

    let mut replies: HashMap<u64, ResponseFrame> = HashMap::new();
    let first = wire.next().await.unwrap().unwrap();
    assert_eq!(first.seq, 11);
    replies.insert(first.seq, first);
    let second = wire.next().await.unwrap().unwrap();
    replies.insert(second.seq, second);

    match replies.remove(&10).and_then(|f| f.body) {
        Some(BusResponse::GetEvent(resp)) => {
            assert_eq!(resp.error.as_deref(), Some(NO_EVENTS_AVAILABLE))
        }
        other => panic!("unexpected response: {other:?}"),
    }

    shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_method_keeps_connection_open() {
    use bytes::Bytes;
    use tokio_util::codec::LengthDelimitedCodec;

    let (addr, shutdown) = start_broker(Duration::from_secs(5)).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = Framed::new(stream, LengthDelimitedCodec::new());

    let bogus = serde_json::json!({
        "seq": 4,
        "body": {"method": "BusService.Unsubscribe", "params": {}}
    });
    raw.send(Bytes::from(serde_json::to_vec(&bogus).unwrap()))
        .await
        .unwrap();
    let reply: ResponseFrame = serde_json::from_slice(&raw.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply.seq, 4);
    assert!(reply.body.is_none());
    assert!(reply.error.unwrap().contains("can't find method"));

    let subscribe = serde_json::to_vec(&RequestFrame {
        seq: 5,
        body: BusRequest::Subscribe(SubscribeRequest {}),
    })
    .unwrap();
    raw.send(Bytes::from(subscribe)).await.unwrap();
    let reply: ResponseFrame = serde_json::from_slice(&raw.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply.seq, 5);
    assert!(reply.body.is_some());

    shutdown.cancel();
}

#[tokio::test]
async fn test_garbage_frame_closes_connection() {
    use bytes::Bytes;
    use tokio_util::codec::LengthDelimitedCodec;

    let (addr, shutdown) = start_broker(Duration::from_secs(5)).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = Framed::new(stream, LengthDelimitedCodec::new());

    raw.send(Bytes::from_static(b"definitely not json"))
        .await
        .unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), raw.next())
        .await
        .unwrap();
    assert!(next.is_none() || next.unwrap().is_err());

    shutdown.cancel();
}
