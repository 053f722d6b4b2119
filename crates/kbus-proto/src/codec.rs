//! Length-delimited JSON frame codec
//!
//! Each frame is a 4-byte big-endian length followed by a JSON document.
//! The codec is typed on both directions so a `Framed` stream yields decoded
//! envelopes and accepts envelopes to send.

use crate::error::ProtoError;
use crate::messages::{RawRequestFrame, RequestFrame, ResponseFrame};
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest frame either side will accept
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Codec decoding `D` and encoding `E`
#[derive(Debug)]
pub struct FrameCodec<D, E> {
    inner: LengthDelimitedCodec,
    _marker: PhantomData<fn() -> (D, E)>,
}

/// Broker side: reads raw requests, writes responses
pub type ServerCodec = FrameCodec<RawRequestFrame, ResponseFrame>;

/// Client side: reads responses, writes requests
pub type ClientCodec = FrameCodec<ResponseFrame, RequestFrame>;

impl<D, E> FrameCodec<D, E> {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for FrameCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> Decoder for FrameCodec<D, E> {
    type Item = D;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, ProtoError> {
        match self.inner.decode(src)? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
            None => Ok(None),
        }
    }
}

impl<D, E: Serialize> Encoder<E> for FrameCodec<D, E> {
    type Error = ProtoError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), ProtoError> {
        let body = serde_json::to_vec(&item)?;
        self.inner.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{BusRequest, BusResponse, SubscribeRequest, SubscribeResponse};

    #[test]
    fn test_client_request_reaches_server_as_raw_frame() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();
        let mut wire = BytesMut::new();

        client
            .encode(
                RequestFrame {
                    seq: 42,
                    body: BusRequest::Subscribe(SubscribeRequest {}),
                },
                &mut wire,
            )
            .unwrap();

        let raw = server.decode(&mut wire).unwrap().unwrap();
        assert_eq!(raw.seq, 42);
        assert_eq!(raw.body["method"], "BusService.Subscribe");

        let request: BusRequest = serde_json::from_value(raw.body).unwrap();
        assert_eq!(request, BusRequest::Subscribe(SubscribeRequest {}));
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut server = ServerCodec::new();
        let mut client = ClientCodec::new();
        let mut wire = BytesMut::new();

        server
            .encode(
                ResponseFrame::reply(
                    1,
                    BusResponse::Subscribe(SubscribeResponse {
                        id: "sub-0".to_string(),
                        error: None,
                    }),
                ),
                &mut wire,
            )
            .unwrap();

        let mut partial = wire.split_to(wire.len() - 3);
        assert!(client.decode(&mut partial).unwrap().is_none());

        partial.unsplit(wire);
        let frame = client.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.seq, 1);
    }

    #[test]
    fn test_garbage_body_is_an_error() {
        let mut server = ServerCodec::new();
        let mut wire = BytesMut::new();
        LengthDelimitedCodec::new()
            .encode(Bytes::from_static(b"not json"), &mut wire)
            .unwrap();

        assert!(matches!(server.decode(&mut wire), Err(ProtoError::Json(_))));
    }
}
