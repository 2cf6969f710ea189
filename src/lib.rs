//! # nodegraph-sync
//!
//! Real-time synchronization core for multiplayer node-graph editors.
//!
//! Peers exchange typed packets over a length-prefixed binary frame. Packet
//! payloads are built from a big-endian [`Buffer`](core::buffer::Buffer) and a
//! schema-less [`Property`](core::property::Property) tree whose leaves are
//! written through a type-keyed [`SerializerRegistry`](core::serializer::SerializerRegistry).
//! Decoded packets fan out to [`Listener`](protocol::Listener)s installed on an
//! [`Endpoint`](protocol::Endpoint), and a heartbeat listener evicts silent peers.
//!
//! ## Modules
//! - [`core`]: buffers, property trees, serializers, framing
//! - [`protocol`]: packets, registry, endpoint, heartbeat
//! - [`graph`]: node/edge/link views and the shared graph store
//! - [`service`]: graph and schema replication listeners
//! - [`transport`]: peer identities and byte transports
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use nodegraph_sync::protocol::{Endpoint, GraphListRequestPacket, Payload, Protocol, Role};
//! use nodegraph_sync::transport::{MemoryTransport, PeerId};
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let server = Endpoint::new(Role::Server, Arc::new(Protocol::new()), transport.clone());
//! let peer = PeerId::random();
//! server.connect(peer).unwrap();
//!
//! let request: Payload = GraphListRequestPacket { group: "materials".into() }.into();
//! server.send(&request, peer).unwrap();
//! assert_eq!(transport.drain().unwrap().len(), 1);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod graph;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::buffer::Buffer;
pub use crate::core::property::Property;
pub use crate::core::serializer::SerializerRegistry;
pub use config::SyncConfig;
pub use error::{ProtocolError, Result};
pub use protocol::{Endpoint, Listener, Payload, Protocol, Role};
pub use transport::PeerId;
