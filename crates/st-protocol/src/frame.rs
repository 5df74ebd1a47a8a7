//! Frame header encoding/decoding
//!
//! Every object message is a length-prefixed frame:
//! - payload_length: 8 bytes (u64, little-endian)
//! - payload: exactly `payload_length` bytes of bincode

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted from the wire (256 MiB).
///
/// The prefix is a full u64, so a corrupted stream could otherwise ask for
/// an absurd allocation.
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Frame header containing the payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the payload in bytes
    pub payload_length: u64,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(payload_length: u64) -> Self {
        Self { payload_length }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u64_le(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the announced payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let payload_length = src.get_u64_le();
        if payload_length > MAX_PAYLOAD_SIZE as u64 {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Some(Self { payload_length }))
    }

    /// Payload length as a buffer size
    pub fn len(&self) -> usize {
        self.payload_length as usize
    }

    /// Whether the frame carries no payload bytes
    pub fn is_empty(&self) -> bool {
        self.payload_length == 0
    }
}

/// Write a complete frame (header + payload) into `dst`
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len() as u64,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    FrameHeader::new(payload.len() as u64).encode(dst);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Split one complete frame payload off the front of `src`.
///
/// Leaves `src` untouched and returns `None` while the header or the payload
/// is still incomplete, so a caller never observes a partial message.
pub fn split_frame(src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut peek = BytesMut::from(&src[..HEADER_SIZE]);
    let header = match FrameHeader::decode(&mut peek)? {
        Some(h) => h,
        None => return Ok(None),
    };

    if src.len() < HEADER_SIZE + header.len() {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(header.len()).freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_little_endian() {
        let mut buf = BytesMut::new();
        FrameHeader::new(0x0102).encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8; 4][..]);
        assert!(FrameHeader::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(u64::MAX);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_split_frame_waits_for_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        let mut partial = buf.split_to(HEADER_SIZE + 2);

        assert!(split_frame(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), HEADER_SIZE + 2);

        partial.extend_from_slice(&buf);
        let payload = split_frame(&mut partial).unwrap().unwrap();
        assert_eq!(&payload[..], b"hello");
        assert!(partial.is_empty());
    }

    #[test]
    fn test_empty_frame() {
        let mut buf = BytesMut::new();
        encode_frame(&[], &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let payload = split_frame(&mut buf).unwrap().unwrap();
        assert!(payload.is_empty());
    }
}
