//! # Endpoint
//!
//! One side of a session: tracks connected peers, owns the listener list, and
//! moves packets between listeners and the [`Transport`].
//!
//! Inbound frames are decoded through the shared [`Protocol`] and fanned out to
//! every listener in install order. Outbound packets are framed once and handed
//! to the transport per target.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, instrument, warn};

use crate::config::{SyncConfig, MAX_PAYLOAD_SIZE};
use crate::core::codec::FrameCodec;
use crate::core::frame::RawFrame;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, Listener};
use crate::protocol::message::Payload;
use crate::protocol::Protocol;
use crate::transport::{PeerId, Transport};
use crate::utils::metrics::Metrics;

/// Which side of the session an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

pub struct Endpoint {
    role: Role,
    local_id: PeerId,
    protocol: Arc<Protocol>,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    peers: RwLock<HashSet<PeerId>>,
    metrics: Metrics,
    max_payload: usize,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &self.role)
            .field("local_id", &self.local_id)
            .field("listeners", &self.dispatcher.len())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn new(role: Role, protocol: Arc<Protocol>, transport: Arc<dyn Transport>) -> Self {
        Self {
            role,
            local_id: PeerId::random(),
            protocol,
            transport,
            dispatcher: Dispatcher::new(),
            peers: RwLock::new(HashSet::new()),
            metrics: Metrics::new(),
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_local_id(mut self, local_id: PeerId) -> Self {
        self.local_id = local_id;
        self
    }

    /// Apply the transport section of `config`.
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.max_payload = config.transport.max_payload_size;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn install(&self, listener: Arc<dyn Listener>) -> Result<()> {
        self.dispatcher.install(Arc::clone(&listener))?;
        debug!(listener = listener.name(), "Listener installed");
        listener.on_install(self)
    }

    pub fn uninstall(&self, listener: &Arc<dyn Listener>) -> Result<bool> {
        let removed = self.dispatcher.uninstall(listener)?;
        if removed {
            debug!(listener = listener.name(), "Listener uninstalled");
            listener.on_uninstall(self)?;
        }
        Ok(removed)
    }

    fn fan_out<F>(&self, hook: &'static str, mut call: F) -> Result<()>
    where
        F: FnMut(&dyn Listener) -> Result<()>,
    {
        for listener in self.dispatcher.snapshot()? {
            if let Err(e) = call(listener.as_ref()) {
                self.metrics.listener_error();
                warn!(listener = listener.name(), hook, error = %e, "Listener hook failed");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    pub fn peers(&self) -> Result<Vec<PeerId>> {
        let peers = self
            .peers
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_PEERS_LOCK))?;
        Ok(peers.iter().copied().collect())
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers
            .read()
            .map(|peers| peers.contains(&peer))
            .unwrap_or(false)
    }

    /// Start tracking `peer`. Hooks fire only if it was not already connected.
    pub fn connect(&self, peer: PeerId) -> Result<bool> {
        let added = self
            .peers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_PEERS_LOCK))?
            .insert(peer);
        if !added {
            return Ok(false);
        }

        self.metrics.connection_established();
        info!(peer = %peer, role = ?self.role, "Peer connected");
        self.fan_out("on_connect", |l| l.on_connect(self, peer))?;
        Ok(true)
    }

    /// Stop tracking `peer` and force the transport to drop it.
    /// Hooks fire only if it was connected.
    pub fn disconnect(&self, peer: PeerId) -> Result<bool> {
        let removed = self
            .peers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_PEERS_LOCK))?
            .remove(&peer);
        if !removed {
            return Ok(false);
        }

        if let Err(e) = self.transport.disconnect(peer) {
            warn!(peer = %peer, error = %e, "Transport disconnect failed");
        }
        self.metrics.connection_closed();
        info!(peer = %peer, role = ?self.role, "Peer disconnected");
        self.fan_out("on_disconnect", |l| l.on_disconnect(self, peer))?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn frame(&self, packet: &Payload) -> Result<Bytes> {
        self.protocol
            .packets
            .encode_bounded(packet, &self.protocol.serializers, self.max_payload)?
            .to_bytes()
    }

    fn transmit(&self, target: PeerId, frame: Bytes) -> Result<()> {
        let len = frame.len() as u64;
        self.transport.send(target, frame)?;
        self.metrics.frame_sent(len);
        Ok(())
    }

    /// Send to one connected peer.
    pub fn send(&self, packet: &Payload, target: PeerId) -> Result<()> {
        if !self.is_connected(target) {
            return Err(ProtocolError::ConnectionClosed);
        }
        let frame = self.frame(packet)?;
        debug!(peer = %target, packet = packet.name(), "Sending packet");
        self.transmit(target, frame)
    }

    /// Send to every connected peer. Per-peer failures are logged.
    pub fn send_to_all(&self, packet: &Payload) -> Result<()> {
        self.broadcast(packet, None)
    }

    pub fn send_to_all_except(&self, packet: &Payload, except: PeerId) -> Result<()> {
        self.broadcast(packet, Some(except))
    }

    fn broadcast(&self, packet: &Payload, except: Option<PeerId>) -> Result<()> {
        let frame = self.frame(packet)?;
        for peer in self.peers()? {
            if Some(peer) == except {
                continue;
            }
            if let Err(e) = self.transmit(peer, frame.clone()) {
                warn!(peer = %peer, packet = packet.name(), error = %e, "Broadcast send failed");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    pub fn tick(&self, delta: Duration, tick: u64) -> Result<()> {
        self.fan_out("on_tick", |l| l.on_tick(self, delta, tick))
    }

    /// Deliver `packet` to every listener in install order.
    pub fn dispatch(&self, packet: &Payload, from: PeerId) -> Result<()> {
        self.fan_out("on_packet", |l| l.on_packet(self, packet, from))
    }

    /// Decode one frame and dispatch it. Unknown identities are dropped.
    pub fn receive_frame(&self, from: PeerId, frame: RawFrame) -> Result<()> {
        self.metrics.frame_received(frame.wire_len() as u64);
        match self
            .protocol
            .packets
            .decode(&frame, &self.protocol.serializers)?
        {
            Some(packet) => self.dispatch(&packet, from),
            None => {
                self.metrics.unknown_packet();
                Ok(())
            }
        }
    }

    /// Read frames from `reader` on a dedicated task until the stream ends.
    ///
    /// Frames are dispatched in read order. A corrupt frame or a decode error
    /// disconnects `peer` and ends the task with that error.
    pub fn spawn_reader<R>(self: &Arc<Self>, peer: PeerId, reader: R) -> JoinHandle<Result<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let endpoint = Arc::clone(self);
        tokio::spawn(async move { endpoint.read_loop(peer, reader).await })
    }

    #[instrument(skip_all, fields(peer = %peer))]
    async fn read_loop<R>(&self, peer: PeerId, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut frames = FramedRead::new(reader, FrameCodec::new(self.max_payload));

        while let Some(next) = frames.next().await {
            let outcome = next.and_then(|frame| self.receive_frame(peer, frame));
            if let Err(e) = outcome {
                if e.is_connection_fatal() {
                    self.metrics.malformed_frame();
                }
                warn!(error = %e, "Closing connection after read failure");
                self.disconnect(peer)?;
                return Err(e);
            }
        }

        debug!("Stream ended");
        self.disconnect(peer)?;
        Ok(())
    }
}
