//! # Frame Codec
//!
//! `tokio_util` codec for [`RawFrame`]s over async byte streams.
//!
//! Same semantics as the blocking reader in [`crate::core::frame`]: at end of
//! stream, a missing or partial header ends the stream quietly, while a
//! partial payload is reported as [`ProtocolError::MalformedFrame`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::frame::{checked_len, PacketId, RawFrame, HEADER_LEN};
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let declared = i32::from_be_bytes([src[4], src[5], src[6], src[7]]);
        let len = checked_len(declared, self.max_payload)?;
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        let id = PacketId(src.get_i32());
        src.advance(4);
        let payload = src.split_to(len).freeze();
        Ok(Some(RawFrame::new(id, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.len() < HEADER_LEN {
            src.clear();
            return Ok(None);
        }
        let declared = i32::from_be_bytes([src[4], src[5], src[6], src[7]]);
        let expected = checked_len(declared, self.max_payload)?;
        let actual = src.len() - HEADER_LEN;
        src.clear();
        Err(ProtocolError::MalformedFrame { expected, actual })
    }
}

impl Encoder<RawFrame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload {
            return Err(ProtocolError::OversizedPacket(item.payload.len()));
        }
        item.encode_into(dst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let mut codec = FrameCodec::new(1024);
        let wire = RawFrame::new(PacketId(3), Bytes::from_static(b"payload"))
            .to_bytes()
            .unwrap();

        let mut src = BytesMut::from(&wire[..5]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        src.extend_from_slice(&wire[5..10]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        src.extend_from_slice(&wire[10..]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(frame.id, PacketId(3));
        assert_eq!(&frame.payload[..], b"payload");
        assert!(src.is_empty());
    }

    #[test]
    fn test_encode_decode_back_to_back() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        for i in 0..3 {
            codec
                .encode(RawFrame::new(PacketId(i), Bytes::from(vec![i as u8; 4])), &mut buf)
                .unwrap();
        }
        for i in 0..3 {
            let frame = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.id, PacketId(i));
        }
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_eof_with_partial_header_ends_quietly() {
        let mut codec = FrameCodec::new(1024);
        let mut src = BytesMut::from(&[0u8, 0, 0][..]);
        assert_eq!(codec.decode_eof(&mut src).unwrap(), None);
    }

    #[test]
    fn test_eof_with_partial_payload_is_malformed() {
        let mut codec = FrameCodec::new(1024);
        let wire = RawFrame::new(PacketId(1), Bytes::from_static(b"abcdef"))
            .to_bytes()
            .unwrap();
        let mut src = BytesMut::from(&wire[..HEADER_LEN + 2]);
        assert!(matches!(
            codec.decode_eof(&mut src),
            Err(ProtocolError::MalformedFrame {
                expected: 6,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_oversized_rejected_both_ways() {
        let mut codec = FrameCodec::new(4);
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(RawFrame::new(PacketId(1), Bytes::from_static(b"12345")), &mut dst),
            Err(ProtocolError::OversizedPacket(5))
        ));

        let mut src = BytesMut::new();
        src.extend_from_slice(&1i32.to_be_bytes());
        src.extend_from_slice(&5i32.to_be_bytes());
        assert!(matches!(
            codec.decode(&mut src),
            Err(ProtocolError::OversizedPacket(5))
        ));
    }
}
