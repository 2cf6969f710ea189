//! # Packet Registry
//!
//! Stable identities for packet types and instantiation by identity.
//!
//! A packet's identity is the 31-multiplier hash of its fully qualified
//! [`Packet::NAME`]. Identities are not checked for uniqueness: registering a
//! second type under an existing identity logs a warning and replaces the first.
//! Use [`PacketRegistry::register_with_id`] to assign identities explicitly.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::buffer::Buffer;
use crate::core::frame::{PacketId, RawFrame};
use crate::core::serializer::SerializerRegistry;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Payload;

/// A typed, self-identifying unit of data exchanged between peers.
///
/// Fields must be read in the order they are written.
pub trait Packet: Default + Into<Payload> + Send + Sync + 'static {
    /// Fully qualified wire name; hashed into the packet identity.
    const NAME: &'static str;

    fn id() -> PacketId {
        PacketId::of_name(Self::NAME)
    }

    fn write(&self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()>;

    /// Populate a default instance from `buffer`.
    fn read(&mut self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()>;
}

type Supplier = fn() -> Payload;

fn supply<P: Packet>() -> Payload {
    P::default().into()
}

#[derive(Clone, Copy)]
struct Registration {
    name: &'static str,
    supplier: Supplier,
}

/// Identity-to-constructor table, populated once at startup.
#[derive(Default)]
pub struct PacketRegistry {
    by_id: HashMap<PacketId, Registration>,
    by_name: HashMap<&'static str, PacketId>,
}

impl std::fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.by_id.iter().map(|(id, reg)| (id, reg.name)))
            .finish()
    }
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `P` under the hash of its name.
    pub fn register<P: Packet>(&mut self) {
        self.register_with_id::<P>(P::id());
    }

    /// Register `P` under an explicitly assigned identity.
    pub fn register_with_id<P: Packet>(&mut self, id: PacketId) {
        self.insert(id, P::NAME, supply::<P>);
    }

    fn insert(&mut self, id: PacketId, name: &'static str, supplier: Supplier) {
        if let Some(previous) = self.by_id.insert(id, Registration { name, supplier }) {
            warn!(
                packet_id = %id,
                previous = previous.name,
                replacement = name,
                "Packet identity already registered, replacing"
            );
            if previous.name != name {
                self.by_name.remove(previous.name);
            }
        }
        if let Some(old_id) = self.by_name.insert(name, id) {
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }
    }

    /// Fresh default instance for `id`, or `None` if the identity is unknown.
    pub fn create(&self, id: PacketId) -> Option<Payload> {
        match self.by_id.get(&id) {
            Some(registration) => Some((registration.supplier)()),
            None => {
                warn!(packet_id = %id, "Unknown packet identity");
                None
            }
        }
    }

    /// Identity currently bound to a packet name.
    pub fn id_of(&self, name: &str) -> Option<PacketId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: PacketId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Serialize `packet` into a frame no larger than [`MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, packet: &Payload, types: &SerializerRegistry) -> Result<RawFrame> {
        self.encode_bounded(packet, types, MAX_PAYLOAD_SIZE)
    }

    /// Serialize `packet` into a frame whose payload fits in `max_payload` bytes.
    ///
    /// The payload goes into a scratch buffer first so its length is known
    /// before the header is produced. A payload over the limit fails with
    /// [`ProtocolError::OversizedPacket`] before anything is sent.
    pub fn encode_bounded(
        &self,
        packet: &Payload,
        types: &SerializerRegistry,
        max_payload: usize,
    ) -> Result<RawFrame> {
        let id = self
            .id_of(packet.name())
            .ok_or_else(|| ProtocolError::UnregisteredPacket(packet.name().to_string()))?;
        let mut scratch = Buffer::bounded(max_payload);
        packet.write(&mut scratch, types)?;
        Ok(RawFrame::new(id, scratch.finish()))
    }

    /// Deserialize a frame. Unknown identities yield `Ok(None)`.
    pub fn decode(&self, frame: &RawFrame, types: &SerializerRegistry) -> Result<Option<Payload>> {
        let Some(mut packet) = self.create(frame.id) else {
            return Ok(None);
        };
        let mut buffer = Buffer::wrap(&frame.payload);
        packet.read(&mut buffer, types)?;
        if buffer.remaining() > 0 {
            trace!(
                packet = packet.name(),
                trailing = buffer.remaining(),
                "Ignoring trailing payload bytes"
            );
        }
        Ok(Some(packet))
    }
}
