//! Blocking transport over per-peer `std::io::Write` sinks.
//!
//! Each sink sits behind its own mutex so frames to one peer are never
//! interleaved, while writes to different peers do not contend.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::core::frame::write_encoded;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::{PeerId, Transport};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Default)]
pub struct WriterTransport {
    sinks: RwLock<HashMap<PeerId, Sink>>,
}

impl WriterTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the outbound half of a peer's connection.
    pub fn attach<W: Write + Send + 'static>(&self, peer: PeerId, sink: W) -> Result<()> {
        self.sinks
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?
            .insert(peer, Arc::new(Mutex::new(Box::new(sink))));
        Ok(())
    }

    pub fn is_attached(&self, peer: PeerId) -> bool {
        self.sinks
            .read()
            .map(|sinks| sinks.contains_key(&peer))
            .unwrap_or(false)
    }
}

impl Transport for WriterTransport {
    #[instrument(skip(self, frame), fields(peer = %peer, bytes = frame.len()), level = "trace")]
    fn send(&self, peer: PeerId, frame: Bytes) -> Result<()> {
        let sink = self
            .sinks
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?
            .get(&peer)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownPeer(peer.to_string()))?;

        let mut sink = sink
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?;
        write_encoded(&mut **sink, &frame)
    }

    fn disconnect(&self, peer: PeerId) -> Result<()> {
        let removed = self
            .sinks
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?
            .remove(&peer);
        if removed.is_some() {
            debug!(peer = %peer, "Sink detached");
        }
        Ok(())
    }
}
