//! Packet definitions.
//!
//! Every packet the endpoint can carry is a variant of [`Payload`]. Listeners
//! match on it exhaustively, so adding a packet forces every listener to decide
//! what to do with it.

use crate::core::buffer::Buffer;
use crate::core::property::Property;
use crate::core::serializer::SerializerRegistry;
use crate::error::Result;
use crate::protocol::packet::Packet;
use crate::transport::PeerId;

/// Liveness proof. `owner` is the peer whose lease is being renewed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatPacket {
    pub owner: PeerId,
}

/// Sent before a forced disconnect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisconnectPacket {
    pub reason: String,
}

/// Ask for the names of every graph in `group`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphListRequestPacket {
    pub group: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphListResponsePacket {
    pub group: String,
    pub names: Vec<String>,
}

/// Full replacement of one graph document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphUpdatePacket {
    pub group: String,
    pub name: String,
    pub graph: Property,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDeletePacket {
    pub group: String,
    pub name: String,
}

/// Type library contents pushed from server to client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSyncPacket {
    pub schemas: Vec<Property>,
}

impl Packet for HeartbeatPacket {
    const NAME: &'static str = "nodegraph_sync.protocol.HeartbeatPacket";

    fn write(&self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
        types.write(buffer, &self.owner)
    }

    fn read(&mut self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
        self.owner = types.read(buffer)?;
        Ok(())
    }
}

impl Packet for DisconnectPacket {
    const NAME: &'static str = "nodegraph_sync.protocol.DisconnectPacket";

    fn write(&self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        buffer.write_string(&self.reason)
    }

    fn read(&mut self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        self.reason = buffer.read_string()?;
        Ok(())
    }
}

impl Packet for GraphListRequestPacket {
    const NAME: &'static str = "nodegraph_sync.graph.GraphListRequestPacket";

    fn write(&self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        buffer.write_string(&self.group)
    }

    fn read(&mut self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        self.group = buffer.read_string()?;
        Ok(())
    }
}

impl Packet for GraphListResponsePacket {
    const NAME: &'static str = "nodegraph_sync.graph.GraphListResponsePacket";

    fn write(&self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        buffer.write_string(&self.group)?;
        buffer.write_length(self.names.len())?;
        for name in &self.names {
            buffer.write_string(name)?;
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        self.group = buffer.read_string()?;
        let count = buffer.read_length()?;
        self.names = Vec::with_capacity(count.min(buffer.remaining()));
        for _ in 0..count {
            self.names.push(buffer.read_string()?);
        }
        Ok(())
    }
}

impl Packet for GraphUpdatePacket {
    const NAME: &'static str = "nodegraph_sync.graph.GraphUpdatePacket";

    fn write(&self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
        buffer.write_string(&self.group)?;
        buffer.write_string(&self.name)?;
        self.graph.write(buffer, types)
    }

    fn read(&mut self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
        self.group = buffer.read_string()?;
        self.name = buffer.read_string()?;
        self.graph = Property::read(buffer, types)?;
        Ok(())
    }
}

impl Packet for GraphDeletePacket {
    const NAME: &'static str = "nodegraph_sync.graph.GraphDeletePacket";

    fn write(&self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        buffer.write_string(&self.group)?;
        buffer.write_string(&self.name)
    }

    fn read(&mut self, buffer: &mut Buffer, _types: &SerializerRegistry) -> Result<()> {
        self.group = buffer.read_string()?;
        self.name = buffer.read_string()?;
        Ok(())
    }
}

impl Packet for SchemaSyncPacket {
    const NAME: &'static str = "nodegraph_sync.schema.SchemaSyncPacket";

    fn write(&self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
        buffer.write_length(self.schemas.len())?;
        for schema in &self.schemas {
            schema.write(buffer, types)?;
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
        let count = buffer.read_length()?;
        self.schemas = Vec::with_capacity(count.min(buffer.remaining()));
        for _ in 0..count {
            self.schemas.push(Property::read(buffer, types)?);
        }
        Ok(())
    }
}

/// Closed set of packets understood by this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Heartbeat(HeartbeatPacket),
    Disconnect(DisconnectPacket),
    GraphListRequest(GraphListRequestPacket),
    GraphListResponse(GraphListResponsePacket),
    GraphUpdate(GraphUpdatePacket),
    GraphDelete(GraphDeletePacket),
    SchemaSync(SchemaSyncPacket),
}

macro_rules! payload_variants {
    ($($variant:ident => $packet:ty),+ $(,)?) => {
        $(
            impl From<$packet> for Payload {
                fn from(packet: $packet) -> Self {
                    Payload::$variant(packet)
                }
            }
        )+

        impl Payload {
            /// Wire name of the wrapped packet.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Payload::$variant(_) => <$packet as Packet>::NAME,)+
                }
            }

            pub fn write(&self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
                match self {
                    $(Payload::$variant(packet) => packet.write(buffer, types),)+
                }
            }

            pub fn read(&mut self, buffer: &mut Buffer, types: &SerializerRegistry) -> Result<()> {
                match self {
                    $(Payload::$variant(packet) => packet.read(buffer, types),)+
                }
            }
        }
    };
}

payload_variants! {
    Heartbeat => HeartbeatPacket,
    Disconnect => DisconnectPacket,
    GraphListRequest => GraphListRequestPacket,
    GraphListResponse => GraphListResponsePacket,
    GraphUpdate => GraphUpdatePacket,
    GraphDelete => GraphDeletePacket,
    SchemaSync => SchemaSyncPacket,
}
