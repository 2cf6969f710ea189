//! # Transport Layer
//!
//! Boundary between the synchronization core and the host's byte channels.
//!
//! The host owns the actual connections. The core only needs to push an encoded
//! frame to a peer and to force a peer off. Inbound bytes reach the core either
//! as already-framed packets (`Endpoint::receive_frame`) or as an async byte
//! stream handed to `Endpoint::spawn_reader`.
//!
//! ## Components
//! - **PeerId**: opaque 128-bit identity of a connected peer
//! - **Transport**: outbound frame delivery and forced disconnect
//! - **MemoryTransport**: records traffic in memory (loopback, tests)
//! - **WriterTransport**: blocking frame writes to per-peer `std::io::Write` sinks

pub mod memory;
pub mod writer;

use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

use crate::core::serializer::Subtype;
use crate::error::Result;

pub use memory::MemoryTransport;
pub use writer::WriterTransport;

/// Identity of a connected peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Sentinel for "nobody".
    pub const NONE: PeerId = PeerId(Uuid::nil());

    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PeerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Subtype<Uuid> for PeerId {
    fn upcast(&self) -> Uuid {
        self.0
    }

    fn downcast(value: Uuid) -> Result<Self> {
        Ok(Self(value))
    }
}

/// Byte-level channel to every connected peer.
///
/// `send` must write the whole frame and flush before returning.
pub trait Transport: Send + Sync {
    fn send(&self, peer: PeerId, frame: Bytes) -> Result<()>;

    /// Drop the connection to `peer`. Must tolerate peers that are already gone.
    fn disconnect(&self, peer: PeerId) -> Result<()>;
}
