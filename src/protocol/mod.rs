//! # Protocol Layer
//!
//! Packet definitions, the packet registry, the listener fabric and liveness.
//!
//! ## Components
//! - **Packet**: Identity hashing and the packet registry
//! - **Message**: The closed [`Payload`] set
//! - **Dispatcher**: Ordered listener fan-out
//! - **Endpoint**: Peer tracking, sending and receiving
//! - **Heartbeat**: Lease-based liveness
//!
//! Both registries live in a [`Protocol`] value built once at startup and shared
//! behind an `Arc`.

pub mod dispatcher;
pub mod endpoint;
pub mod heartbeat;
pub mod message;
pub mod packet;

#[cfg(test)]
mod tests;

pub use dispatcher::Listener;
pub use endpoint::{Endpoint, Role};
pub use heartbeat::{Heartbeat, HeartbeatListener};
pub use message::*;
pub use packet::{Packet, PacketRegistry};

use uuid::Uuid;

use crate::core::serializer::SerializerRegistry;
use crate::transport::PeerId;

/// Packet and serializer registries for one process.
#[derive(Debug, Default)]
pub struct Protocol {
    pub packets: PacketRegistry,
    pub serializers: SerializerRegistry,
}

impl Protocol {
    /// Registries with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every packet and serializer this crate defines.
    pub fn new() -> Self {
        let mut protocol = Self {
            packets: PacketRegistry::new(),
            serializers: SerializerRegistry::with_defaults(),
        };
        protocol.serializers.declare_subtype::<PeerId, Uuid>("peer_id");
        crate::graph::register_types(&mut protocol.serializers);

        protocol.register_packet::<HeartbeatPacket>();
        protocol.register_packet::<DisconnectPacket>();
        protocol.register_packet::<GraphListRequestPacket>();
        protocol.register_packet::<GraphListResponsePacket>();
        protocol.register_packet::<GraphUpdatePacket>();
        protocol.register_packet::<GraphDeletePacket>();
        protocol.register_packet::<SchemaSyncPacket>();
        protocol
    }

    pub fn register_packet<P: Packet>(&mut self) -> &mut Self {
        self.packets.register::<P>();
        self
    }
}
