//! # Buffer
//!
//! Growable (optionally bounded) byte cursor with fixed-width primitive codecs.
//!
//! All multi-byte values are big-endian. Strings are prefixed with their UTF-8
//! byte length as an `i32`; identifiers are written as two `i64` halves, most
//! significant first. The codec carries no field tags, so a packet must read its
//! fields in exactly the order it wrote them.
//!
//! ## Usage
//! ```rust
//! use nodegraph_sync::core::buffer::Buffer;
//!
//! let mut out = Buffer::allocate();
//! out.write_int(7).unwrap();
//! out.write_string("group").unwrap();
//! let bytes = out.finish();
//!
//! let mut input = Buffer::wrap(&bytes);
//! assert_eq!(input.read_int().unwrap(), 7);
//! assert_eq!(input.read_string().unwrap(), "group");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Default capacity reserved by [`Buffer::allocate`]
const DEFAULT_CAPACITY: usize = 256;

/// Byte region plus a single read/write cursor.
#[derive(Debug, Default)]
pub struct Buffer {
    data: BytesMut,
    position: usize,
    limit: Option<usize>,
}

impl Buffer {
    /// Empty buffer for writing.
    pub fn allocate() -> Self {
        Self {
            data: BytesMut::with_capacity(DEFAULT_CAPACITY),
            position: 0,
            limit: None,
        }
    }

    /// Empty buffer for writing that refuses to grow past `limit` bytes.
    pub fn bounded(limit: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(limit.min(DEFAULT_CAPACITY)),
            position: 0,
            limit: Some(limit),
        }
    }

    /// Buffer positioned at the start of `bytes`, for reading.
    pub fn wrap(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            position: 0,
            limit: None,
        }
    }

    /// Consume the buffer and return everything written to it.
    pub fn finish(self) -> Bytes {
        self.data.freeze()
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total bytes held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        if let Some(limit) = self.limit {
            let wanted = self.data.len() + additional;
            if wanted > limit {
                return Err(ProtocolError::OversizedPacket(wanted));
            }
        }
        self.data.reserve(additional);
        Ok(())
    }

    fn take(&mut self, needed: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::BufferUnderflow { needed, remaining });
        }
        let start = self.position;
        self.position += needed;
        Ok(&self.data[start..start + needed])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn advance_written(&mut self) {
        self.position = self.data.len();
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn write_byte(&mut self, value: i8) -> Result<()> {
        self.reserve(1)?;
        self.data.put_i8(value);
        self.advance_written();
        Ok(())
    }

    pub fn write_boolean(&mut self, value: bool) -> Result<()> {
        self.write_byte(value as i8)
    }

    pub fn write_short(&mut self, value: i16) -> Result<()> {
        self.reserve(2)?;
        self.data.put_i16(value);
        self.advance_written();
        Ok(())
    }

    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.reserve(4)?;
        self.data.put_i32(value);
        self.advance_written();
        Ok(())
    }

    pub fn write_long(&mut self, value: i64) -> Result<()> {
        self.reserve(8)?;
        self.data.put_i64(value);
        self.advance_written();
        Ok(())
    }

    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.reserve(4)?;
        self.data.put_f32(value);
        self.advance_written();
        Ok(())
    }

    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.reserve(8)?;
        self.data.put_f64(value);
        self.advance_written();
        Ok(())
    }

    /// Length-prefixed raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        let len = i32::try_from(value.len())
            .map_err(|_| ProtocolError::OversizedPacket(value.len()))?;
        self.reserve(4 + value.len())?;
        self.data.put_i32(len);
        self.data.put_slice(value);
        self.advance_written();
        Ok(())
    }

    /// Length-prefixed UTF-8.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    pub fn write_uuid(&mut self, value: Uuid) -> Result<()> {
        let (most, least) = value.as_u64_pair();
        self.write_long(most as i64)?;
        self.write_long(least as i64)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn read_byte(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_short(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_int(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_long(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_length()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8(bytes)?)
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let most = self.read_long()? as u64;
        let least = self.read_long()? as u64;
        Ok(Uuid::from_u64_pair(most, least))
    }

    /// Read an `i32` element count or byte length, rejecting negatives.
    pub fn read_length(&mut self) -> Result<usize> {
        let len = self.read_int()?;
        usize::try_from(len).map_err(|_| ProtocolError::InvalidLength(len))
    }

    /// Write a collection length as an `i32`.
    pub fn write_length(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| ProtocolError::OversizedPacket(len))?;
        self.write_int(len)
    }
}
