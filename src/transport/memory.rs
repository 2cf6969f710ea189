//! In-memory transport that records outbound frames and disconnects.

use std::sync::Mutex;

use bytes::Bytes;
use tracing::trace;

use crate::core::frame::{read_frame, RawFrame};
use crate::error::{constants, ProtocolError, Result};
use crate::transport::{PeerId, Transport};

#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<(PeerId, Bytes)>>,
    disconnected: Mutex<Vec<PeerId>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every frame sent so far, decoded back into raw frames.
    pub fn drain(&self) -> Result<Vec<(PeerId, RawFrame)>> {
        let sent = std::mem::take(
            &mut *self
                .sent
                .lock()
                .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?,
        );
        let mut frames = Vec::with_capacity(sent.len());
        for (peer, bytes) in sent {
            let mut reader = &bytes[..];
            if let Some(frame) = read_frame(&mut reader, usize::MAX)? {
                frames.push((peer, frame));
            }
        }
        Ok(frames)
    }

    /// Peers that were forcibly disconnected, in order.
    pub fn disconnected(&self) -> Result<Vec<PeerId>> {
        Ok(self
            .disconnected
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?
            .clone())
    }
}

impl Transport for MemoryTransport {
    fn send(&self, peer: PeerId, frame: Bytes) -> Result<()> {
        trace!(peer = %peer, bytes = frame.len(), "Recording frame");
        self.sent
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?
            .push((peer, frame));
        Ok(())
    }

    fn disconnect(&self, peer: PeerId) -> Result<()> {
        self.disconnected
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_TRANSPORT_LOCK))?
            .push(peer);
        Ok(())
    }
}
