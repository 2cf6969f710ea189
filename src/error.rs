//! # Error Types
//!
//! Error handling for the synchronization core.
//!
//! This module defines every error variant the core can surface, from low-level
//! buffer underflows to connection-fatal framing errors and property contract violations.
//!
//! ## Error Categories
//! - **I/O Errors**: transport read/write failures
//! - **Framing Errors**: short payloads, oversized frames (connection-fatal)
//! - **Codec Errors**: buffer underflow, invalid UTF-8, negative length prefixes
//! - **Contract Errors**: property type mismatches, missing serializers or fields
//! - **Session Errors**: unknown peers, closed connections
//!
//! Registration conflicts and unknown packet identities are not errors: they are
//! logged with `tracing::warn!` and recovered locally.
//!
//! ## Example Usage
//! ```rust
//! use nodegraph_sync::core::buffer::Buffer;
//! use nodegraph_sync::error::{ProtocolError, Result};
//!
//! fn read_flag(bytes: &[u8]) -> Result<bool> {
//!     let mut buffer = Buffer::wrap(bytes);
//!     buffer.read_boolean()
//! }
//!
//! assert!(matches!(read_flag(&[]), Err(ProtocolError::BufferUnderflow { .. })));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Lock-related error messages
    pub const ERR_LISTENERS_LOCK: &str = "Failed to acquire lock on endpoint listeners";
    pub const ERR_PEERS_LOCK: &str = "Failed to acquire lock on endpoint peers";
    pub const ERR_HEARTBEATS_LOCK: &str = "Failed to acquire lock on heartbeat table";
    pub const ERR_RESOLVED_LOCK: &str = "Failed to acquire lock on serializer cache";
    pub const ERR_TRANSPORT_LOCK: &str = "Failed to acquire lock on transport sink";
    pub const ERR_STORE_LOCK: &str = "Failed to acquire lock on graph store";
    pub const ERR_LIBRARY_LOCK: &str = "Failed to acquire lock on type library";

    /// Session errors
    pub const ERR_HEARTBEAT_EXPIRED: &str = "Heartbeat lease expired";
}

/// ProtocolError is the primary error type for all core operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid length prefix: {0}")]
    InvalidLength(i32),

    #[error("Malformed frame: expected {expected} payload bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Property nesting too deep: {0} levels")]
    NestingTooDeep(usize),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("No serializer registered for type {0}")]
    MissingSerializer(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Packet type {0} is not registered")]
    UnregisteredPacket(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error desynchronizes the stream it was read from.
    ///
    /// Callers must close the connection on these rather than keep reading.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::MalformedFrame { .. }
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::InvalidLength(_)
                | ProtocolError::NestingTooDeep(_)
                | ProtocolError::ConnectionClosed
        )
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        ProtocolError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
