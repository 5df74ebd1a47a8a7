//! Codec for length-prefixed bincode messages

use std::marker::PhantomData;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{encode_frame, split_frame};

/// Codec for encoding/decoding framed messages of type `T`
#[derive(Debug)]
pub struct MessageCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> MessageCodec<T> {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MessageCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for MessageCodec<T> {
    type Item = T;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let payload = match split_frame(src)? {
            Some(p) => p,
            None => return Ok(None), // Need more data
        };

        tracing::trace!(bytes = payload.len(), "decoded frame");
        let message: T = bincode::deserialize(&payload)?;
        Ok(Some(message))
    }
}

impl<'a, T: Serialize> Encoder<&'a T> for MessageCodec<T> {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'a T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(item)?;
        encode_frame(&payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;
    use crate::id::CorrelationId;
    use crate::message::{Operation, Request, Response};
    use crate::value::{Kwargs, Value};

    #[test]
    fn test_codec_request_roundtrip() {
        let mut codec = MessageCodec::<Request>::new();
        let request = Request::new(
            Operation::invoke("putstr").unwrap(),
            CorrelationId(-1),
            vec![Value::from("hello"), Value::Int(0), Value::Int(1)],
            Kwargs::new(),
        );

        let mut buf = BytesMut::new();
        codec.encode(&request, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, request);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = MessageCodec::<Response>::new();
        let response = Response::new(CorrelationId(-1), Ok(Value::Int(80)));

        let mut full_buf = BytesMut::new();
        codec.encode(&response, &mut full_buf).unwrap();

        // Split the buffer to simulate partial read
        let mut partial = full_buf.split_to(HEADER_SIZE - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full_buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.result, Ok(Value::Int(80)));
    }

    #[test]
    fn test_codec_payload_sizes() {
        let mut codec = MessageCodec::<Value>::new();

        for len in [0usize, 1, 4096, 1 << 20] {
            let value = Value::Bytes(vec![0xAB; len]);
            let mut buf = BytesMut::new();
            codec.encode(&value, &mut buf).unwrap();

            let announced = u64::from_le_bytes(buf[..HEADER_SIZE].try_into().unwrap());
            assert_eq!(announced as usize, buf.len() - HEADER_SIZE);

            assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), value);
        }
    }

    #[test]
    fn test_codec_back_to_back_frames() {
        let mut codec = MessageCodec::<Value>::new();
        let mut buf = BytesMut::new();
        codec.encode(&Value::Int(1), &mut buf).unwrap();
        codec.encode(&Value::Int(2), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Value::Int(1)));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Value::Int(2)));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
