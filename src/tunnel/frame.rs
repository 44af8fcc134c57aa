//! Frame encoding/decoding for the multiplexer
//!
//! Frame format:
//! ```text
//! +--------+--------+--------+--------+
//! |          Stream ID (4B)           |
//! +--------+--------+--------+--------+
//! |          Sequence (4B)            |
//! +--------+--------+--------+--------+
//! | Closing|
//! +--------+--------+--------+--------+
//! |   Payload (rest of the record)    |
//! +--------+--------+--------+--------+
//! ```
//!
//! The payload has no length field of its own; the record carrying the frame
//! bounds it.

use super::TunnelError;
use crate::obfuscation::MAX_RECORD_BODY;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size in bytes
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum payload carried by one frame
pub const MAX_PAYLOAD_SIZE: usize = MAX_RECORD_BODY - FRAME_HEADER_SIZE;

/// A multiplexer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stream ID (never 0 on the wire)
    pub stream_id: u32,
    /// Per-stream sequence number, wraps at 2^32
    pub seq: u32,
    /// Final frame of the stream; the payload is padding
    pub closing: bool,
    /// Payload data
    pub payload: Bytes,
}

impl Frame {
    /// Create a new data frame
    pub fn data(stream_id: u32, seq: u32, payload: Bytes) -> Self {
        Self {
            stream_id,
            seq,
            closing: false,
            payload,
        }
    }

    /// Create a closing frame carrying padding
    pub fn closing(stream_id: u32, seq: u32, padding: Bytes) -> Self {
        Self {
            stream_id,
            seq,
            closing: true,
            payload: padding,
        }
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        buf.put_u32(self.stream_id);
        buf.put_u32(self.seq);
        buf.put_u8(self.closing as u8);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a frame occupying all of `buf`
    pub fn decode(mut buf: Bytes) -> Result<Self, TunnelError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(TunnelError::InvalidFrame(format!(
                "Frame shorter than header: {} bytes",
                buf.len()
            )));
        }
        if buf.len() - FRAME_HEADER_SIZE > MAX_PAYLOAD_SIZE {
            return Err(TunnelError::FrameTooLarge(
                buf.len() - FRAME_HEADER_SIZE,
                MAX_PAYLOAD_SIZE,
            ));
        }

        let stream_id = buf.get_u32();
        let seq = buf.get_u32();
        let closing = match buf.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(TunnelError::InvalidFrame(format!(
                    "Unknown closing flag: {}",
                    other
                )))
            }
        };

        Ok(Self {
            stream_id,
            seq,
            closing,
            payload: buf,
        })
    }

    /// Get the total encoded size of this frame
    pub fn encoded_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_encode_decode() {
        let original = Frame::data(42, 7, Bytes::from_static(b"Hello, World!"));
        let encoded = original.encode();
        assert_eq!(encoded.len(), original.encoded_size());

        let decoded = Frame::decode(encoded.freeze()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_closing_frame_layout() {
        let frame = Frame::closing(1, u32::MAX, Bytes::from(vec![0xAA; 3]));
        let encoded = frame.encode();

        assert_eq!(&encoded[..4], &[0, 0, 0, 1]);
        assert_eq!(&encoded[4..8], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encoded[8], 1);
        assert_eq!(&encoded[9..], &[0xAA; 3]);
    }

    #[test]
    fn test_decode_rejects_short_header() {
        let err = Frame::decode(Bytes::from_static(&[0, 0, 0, 1, 0])).unwrap_err();
        assert!(matches!(err, TunnelError::InvalidFrame(_)));
    }

    #[test]
    fn test_decode_rejects_bad_closing_flag() {
        let mut raw = Frame::data(3, 0, Bytes::new()).encode();
        raw[8] = 2;
        let err = Frame::decode(raw.freeze()).unwrap_err();
        assert!(matches!(err, TunnelError::InvalidFrame(_)));
    }
}
