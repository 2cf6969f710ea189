//! # Frames
//!
//! Length-prefixed wire frames and blocking read/write over `std::io`.
//!
//! ## Wire Format
//! ```text
//! [Packet Id(4)] [Length(4)] [Payload(N)]
//! ```
//! Both header fields are big-endian `i32`.
//!
//! A short or missing header marks the end of the stream. A payload shorter than
//! its declared length means the stream is desynchronized: the read fails with
//! [`ProtocolError::MalformedFrame`] and the connection must be closed.

use std::fmt;
use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{instrument, trace};

use crate::error::{ProtocolError, Result};

/// Header size: packet id + payload length
pub const HEADER_LEN: usize = 8;

/// Wire identity of a packet type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId(pub i32);

impl PacketId {
    /// Hash a fully qualified type name into an identity.
    ///
    /// 31-multiplier string hash over UTF-16 code units with wrapping `i32`
    /// arithmetic. Renaming a packet type changes its identity.
    pub const fn of_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: i32 = 0;
        let mut i = 0;
        while i < bytes.len() {
            // Decode one UTF-8 scalar, then fold its UTF-16 units.
            let b0 = bytes[i] as u32;
            let (scalar, width) = if b0 < 0x80 {
                (b0, 1)
            } else if b0 < 0xE0 {
                (((b0 & 0x1F) << 6) | (bytes[i + 1] as u32 & 0x3F), 2)
            } else if b0 < 0xF0 {
                (
                    ((b0 & 0x0F) << 12)
                        | ((bytes[i + 1] as u32 & 0x3F) << 6)
                        | (bytes[i + 2] as u32 & 0x3F),
                    3,
                )
            } else {
                (
                    ((b0 & 0x07) << 18)
                        | ((bytes[i + 1] as u32 & 0x3F) << 12)
                        | ((bytes[i + 2] as u32 & 0x3F) << 6)
                        | (bytes[i + 3] as u32 & 0x3F),
                    4,
                )
            };
            if scalar >= 0x10000 {
                let v = scalar - 0x10000;
                hash = hash.wrapping_mul(31).wrapping_add((0xD800 + (v >> 10)) as i32);
                hash = hash.wrapping_mul(31).wrapping_add((0xDC00 + (v & 0x3FF)) as i32);
            } else {
                hash = hash.wrapping_mul(31).wrapping_add(scalar as i32);
            }
            i += width;
        }
        PacketId(hash)
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({:#010x})", self.0)
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// One frame as read off or written to a transport, payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub id: PacketId,
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(id: PacketId, payload: Bytes) -> Self {
        Self { id, payload }
    }

    /// Size on the wire, header included.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Header and payload as one contiguous buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut out)?;
        Ok(out.freeze())
    }

    pub(crate) fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let len = i32::try_from(self.payload.len())
            .map_err(|_| ProtocolError::OversizedPacket(self.payload.len()))?;
        dst.reserve(self.wire_len());
        dst.put_i32(self.id.0);
        dst.put_i32(len);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

/// Validate a declared payload length against the configured maximum.
pub(crate) fn checked_len(declared: i32, max_payload: usize) -> Result<usize> {
    match usize::try_from(declared) {
        Ok(len) if len <= max_payload => Ok(len),
        Ok(len) => Err(ProtocolError::OversizedPacket(len)),
        Err(_) => Err(ProtocolError::InvalidLength(declared)),
    }
}

/// Write one frame as a single unit and flush.
#[instrument(skip(writer, frame), fields(packet_id = %frame.id, len = frame.payload.len()), level = "trace")]
pub fn write_frame<W: Write>(writer: &mut W, frame: &RawFrame) -> Result<()> {
    write_encoded(writer, &frame.to_bytes()?)
}

/// Write an already encoded frame as a single unit and flush.
pub fn write_encoded<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// Fill `buf` as far as the reader allows; returns the byte count obtained.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read one frame.
///
/// Returns `Ok(None)` when the header cannot be read in full, which ends the
/// read loop. A short payload is connection-fatal.
pub fn read_frame<R: Read>(reader: &mut R, max_payload: usize) -> Result<Option<RawFrame>> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_full(reader, &mut header)?;
    if got < HEADER_LEN {
        trace!(bytes = got, "Header incomplete, end of stream");
        return Ok(None);
    }

    let id = PacketId(i32::from_be_bytes([header[0], header[1], header[2], header[3]]));
    let declared = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let expected = checked_len(declared, max_payload)?;

    let mut payload = vec![0u8; expected];
    let actual = read_full(reader, &mut payload)?;
    if actual != expected {
        return Err(ProtocolError::MalformedFrame { expected, actual });
    }

    Ok(Some(RawFrame::new(id, Bytes::from(payload))))
}
