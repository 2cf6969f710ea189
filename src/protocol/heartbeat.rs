//! Lease-based liveness.
//!
//! Every tracked peer holds a [`Heartbeat`] whose expiry is pushed forward on
//! each renewal. Servers evict peers whose lease runs out; clients renew their
//! own lease before it does.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::HeartbeatConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::Listener;
use crate::protocol::endpoint::{Endpoint, Role};
use crate::protocol::message::{DisconnectPacket, HeartbeatPacket, Payload};
use crate::transport::PeerId;
use crate::utils::time::Clock;

/// Lease held on behalf of `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    owner: PeerId,
    expiry: Instant,
}

impl Heartbeat {
    /// New record that is already due.
    pub fn new(owner: PeerId, now: Instant) -> Self {
        Self { owner, expiry: now }
    }

    pub fn owner(&self) -> PeerId {
        self.owner
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    pub fn reschedule(&mut self, now: Instant, timeout: Duration) {
        self.expiry = now + timeout;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expiry
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.expiry.saturating_duration_since(now)
    }
}

/// Tracks one [`Heartbeat`] per remote peer.
///
/// The table is only touched under its mutex, and the mutex is always released
/// before calling back into the endpoint.
pub struct HeartbeatListener {
    timeout: Duration,
    renew_threshold: Duration,
    clock: Arc<dyn Clock>,
    beats: Mutex<HashMap<PeerId, Heartbeat>>,
}

impl HeartbeatListener {
    pub fn new(config: &HeartbeatConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            timeout: config.timeout,
            renew_threshold: config.renew_threshold,
            clock,
            beats: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PeerId, Heartbeat>>> {
        self.beats
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_HEARTBEATS_LOCK))
    }

    /// Current record for `peer`, if tracked.
    pub fn heartbeat(&self, peer: PeerId) -> Result<Option<Heartbeat>> {
        Ok(self.table()?.get(&peer).copied())
    }

    pub fn tracked(&self) -> Result<usize> {
        Ok(self.table()?.len())
    }

    /// Push the expiry of an existing record forward. Untracked peers are ignored.
    fn renew_existing(&self, peer: PeerId) -> Result<bool> {
        let now = self.clock.now();
        let mut beats = self.table()?;
        match beats.get_mut(&peer) {
            Some(beat) => {
                beat.reschedule(now, self.timeout);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Create-or-fetch the record for `peer` and push its expiry forward.
    fn renew(&self, peer: PeerId, owner: PeerId) -> Result<Heartbeat> {
        let now = self.clock.now();
        let mut beats = self.table()?;
        let beat = beats
            .entry(peer)
            .or_insert_with(|| Heartbeat::new(owner, now));
        beat.reschedule(now, self.timeout);
        Ok(*beat)
    }

    /// Drop records of peers the endpoint no longer tracks.
    fn prune(beats: &mut HashMap<PeerId, Heartbeat>, connected: &HashSet<PeerId>) {
        beats.retain(|peer, _| {
            let keep = connected.contains(peer);
            if !keep {
                debug!(peer = %peer, "Dropping heartbeat of departed peer");
            }
            keep
        });
    }

    fn expire(&self, endpoint: &Endpoint) -> Result<()> {
        let connected: HashSet<PeerId> = endpoint.peers()?.into_iter().collect();
        let now = self.clock.now();
        let expired: Vec<PeerId> = {
            let mut beats = self.table()?;
            Self::prune(&mut beats, &connected);
            let expired: Vec<PeerId> = beats
                .iter()
                .filter(|(_, beat)| beat.is_expired(now))
                .map(|(peer, _)| *peer)
                .collect();
            for peer in &expired {
                beats.remove(peer);
            }
            expired
        };

        for peer in expired {
            info!(peer = %peer, "Heartbeat expired, disconnecting");
            endpoint.metrics().heartbeat_expired();
            let notice: Payload = DisconnectPacket {
                reason: constants::ERR_HEARTBEAT_EXPIRED.to_string(),
            }
            .into();
            if let Err(e) = endpoint.send(&notice, peer) {
                warn!(peer = %peer, error = %e, "Failed to send disconnect notice");
            }
            endpoint.disconnect(peer)?;
        }
        Ok(())
    }

    fn renew_own(&self, endpoint: &Endpoint) -> Result<()> {
        let connected: HashSet<PeerId> = endpoint.peers()?.into_iter().collect();
        let now = self.clock.now();
        let due: Vec<(PeerId, PeerId)> = {
            let mut beats = self.table()?;
            Self::prune(&mut beats, &connected);
            beats
                .iter_mut()
                .filter(|(_, beat)| beat.remaining(now) < self.renew_threshold)
                .map(|(peer, beat)| {
                    beat.reschedule(now, self.timeout);
                    (*peer, beat.owner())
                })
                .collect()
        };

        for (peer, owner) in due {
            debug!(peer = %peer, "Renewing heartbeat");
            if let Err(e) = endpoint.send(&HeartbeatPacket { owner }.into(), peer) {
                warn!(peer = %peer, error = %e, "Failed to send heartbeat");
            }
        }
        Ok(())
    }
}

impl Listener for HeartbeatListener {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn on_connect(&self, endpoint: &Endpoint, peer: PeerId) -> Result<()> {
        let owner = match endpoint.role() {
            Role::Server => peer,
            Role::Client => endpoint.local_id(),
        };
        let beat = self.renew(peer, owner)?;
        if !endpoint.is_connected(peer) {
            self.table()?.remove(&peer);
            return Ok(());
        }
        endpoint.send(&HeartbeatPacket { owner: beat.owner() }.into(), peer)
    }

    fn on_packet(&self, endpoint: &Endpoint, packet: &Payload, from: PeerId) -> Result<()> {
        match packet {
            Payload::Heartbeat(_) => {
                // Records are created on connect only, so a heartbeat racing a
                // disconnect cannot bring one back.
                if !self.renew_existing(from)? {
                    debug!(peer = %from, "Heartbeat from untracked peer ignored");
                }
                Ok(())
            }
            Payload::Disconnect(notice) => {
                if endpoint.role() == Role::Client {
                    info!(peer = %from, reason = %notice.reason, "Disconnected by server");
                    endpoint.disconnect(from)?;
                }
                Ok(())
            }
            Payload::GraphListRequest(_)
            | Payload::GraphListResponse(_)
            | Payload::GraphUpdate(_)
            | Payload::GraphDelete(_)
            | Payload::SchemaSync(_) => Ok(()),
        }
    }

    fn on_tick(&self, endpoint: &Endpoint, _delta: Duration, _tick: u64) -> Result<()> {
        match endpoint.role() {
            Role::Server => self.expire(endpoint),
            Role::Client => self.renew_own(endpoint),
        }
    }

    fn on_disconnect(&self, _endpoint: &Endpoint, peer: PeerId) -> Result<()> {
        self.table()?.remove(&peer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_strictly_after_deadline() {
        let start = Instant::now();
        let mut beat = Heartbeat::new(PeerId::random(), start);
        beat.reschedule(start, Duration::from_secs(5));

        assert!(!beat.is_expired(start + Duration::from_millis(4900)));
        assert!(!beat.is_expired(start + Duration::from_secs(5)));
        assert!(beat.is_expired(start + Duration::from_millis(5100)));
    }

    #[test]
    fn test_remaining_saturates() {
        let start = Instant::now();
        let beat = Heartbeat::new(PeerId::NONE, start);
        assert_eq!(beat.remaining(start + Duration::from_secs(1)), Duration::ZERO);
    }
}
