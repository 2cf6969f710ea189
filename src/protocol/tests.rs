// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::HeartbeatConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::*;
use crate::transport::{MemoryTransport, PeerId, Transport};
use crate::utils::time::ManualClock;

/// Records the address of every packet it sees, tagged with its own label.
struct Recorder {
    label: &'static str,
    seen: Arc<Mutex<Vec<(&'static str, usize)>>>,
    fail: bool,
}

impl Listener for Recorder {
    fn on_packet(&self, _endpoint: &Endpoint, packet: &Payload, _from: PeerId) -> Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push((self.label, packet as *const Payload as usize));
        if self.fail {
            return Err(ProtocolError::Custom("listener failure".into()));
        }
        Ok(())
    }
}

fn server() -> (Arc<MemoryTransport>, Endpoint) {
    let transport = Arc::new(MemoryTransport::new());
    let endpoint = Endpoint::new(Role::Server, Arc::new(Protocol::new()), transport.clone());
    (transport, endpoint)
}

fn client() -> (Arc<MemoryTransport>, Endpoint) {
    let transport = Arc::new(MemoryTransport::new());
    let endpoint = Endpoint::new(Role::Client, Arc::new(Protocol::new()), transport.clone());
    (transport, endpoint)
}

fn heartbeat(clock: &Arc<ManualClock>) -> Arc<HeartbeatListener> {
    Arc::new(HeartbeatListener::new(
        &HeartbeatConfig {
            timeout: Duration::from_secs(5),
            renew_threshold: Duration::from_secs(1),
        },
        clock.clone(),
    ))
}

fn packets(transport: &MemoryTransport, protocol: &Protocol) -> Vec<(PeerId, Payload)> {
    transport
        .drain()
        .unwrap()
        .into_iter()
        .map(|(peer, frame)| {
            let packet = protocol
                .packets
                .decode(&frame, &protocol.serializers)
                .unwrap()
                .expect("registered packet");
            (peer, packet)
        })
        .collect()
}

#[test]
fn test_fan_out_in_install_order_with_same_instance() {
    let (_transport, endpoint) = server();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for (label, fail) in [("a", false), ("b", true), ("c", false)] {
        endpoint
            .install(Arc::new(Recorder {
                label,
                seen: seen.clone(),
                fail,
            }))
            .unwrap();
    }

    let packet: Payload = GraphListRequestPacket {
        group: "shaders".into(),
    }
    .into();
    endpoint.dispatch(&packet, PeerId::random()).unwrap();

    let seen = seen.lock().unwrap();
    let labels: Vec<_> = seen.iter().map(|(label, _)| *label).collect();
    assert_eq!(labels, vec!["a", "b", "c"]);
    let address = &packet as *const Payload as usize;
    assert!(seen.iter().all(|(_, addr)| *addr == address));
    assert_eq!(endpoint.metrics().snapshot().listener_errors, 1);
}

#[test]
fn test_uninstall_stops_delivery() {
    let (_transport, endpoint) = server();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder: Arc<dyn Listener> = Arc::new(Recorder {
        label: "only",
        seen: seen.clone(),
        fail: false,
    });
    endpoint.install(recorder.clone()).unwrap();
    assert!(endpoint.uninstall(&recorder).unwrap());
    assert!(!endpoint.uninstall(&recorder).unwrap());

    let packet: Payload = DisconnectPacket::default().into();
    endpoint.dispatch(&packet, PeerId::random()).unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_server_expires_silent_peer() {
    let clock = Arc::new(ManualClock::new());
    let (transport, endpoint) = server();
    let beats = heartbeat(&clock);
    endpoint.install(beats.clone()).unwrap();

    let peer = PeerId::random();
    endpoint.connect(peer).unwrap();
    let hello = packets(&transport, endpoint.protocol());
    assert_eq!(hello.len(), 1);
    assert_eq!(hello[0], (peer, Payload::from(HeartbeatPacket { owner: peer })));

    clock.advance(Duration::from_millis(4900));
    endpoint.tick(Duration::from_millis(4900), 1).unwrap();
    assert!(endpoint.is_connected(peer));
    assert!(transport.disconnected().unwrap().is_empty());

    clock.advance(Duration::from_millis(200));
    endpoint.tick(Duration::from_millis(200), 2).unwrap();
    assert!(!endpoint.is_connected(peer));
    assert_eq!(transport.disconnected().unwrap(), vec![peer]);
    assert_eq!(beats.tracked().unwrap(), 0);

    let farewell = packets(&transport, endpoint.protocol());
    assert_eq!(
        farewell,
        vec![(
            peer,
            Payload::from(DisconnectPacket {
                reason: constants::ERR_HEARTBEAT_EXPIRED.into()
            })
        )]
    );
    assert_eq!(endpoint.metrics().snapshot().heartbeats_expired, 1);
}

#[test]
fn test_inbound_heartbeat_extends_lease() {
    let clock = Arc::new(ManualClock::new());
    let (transport, endpoint) = server();
    endpoint.install(heartbeat(&clock)).unwrap();

    let peer = PeerId::random();
    endpoint.connect(peer).unwrap();

    clock.advance(Duration::from_secs(4));
    endpoint
        .dispatch(&HeartbeatPacket { owner: peer }.into(), peer)
        .unwrap();

    clock.advance(Duration::from_millis(4900));
    endpoint.tick(Duration::from_millis(4900), 1).unwrap();
    assert!(endpoint.is_connected(peer));

    clock.advance(Duration::from_millis(200));
    endpoint.tick(Duration::from_millis(200), 2).unwrap();
    assert!(!endpoint.is_connected(peer));
    assert_eq!(transport.disconnected().unwrap(), vec![peer]);
}

#[test]
fn test_client_renews_below_threshold() {
    let clock = Arc::new(ManualClock::new());
    let (transport, endpoint) = client();
    let beats = heartbeat(&clock);
    endpoint.install(beats.clone()).unwrap();

    let server_id = PeerId::random();
    endpoint.connect(server_id).unwrap();
    let me = endpoint.local_id();
    assert_eq!(
        packets(&transport, endpoint.protocol()),
        vec![(server_id, Payload::from(HeartbeatPacket { owner: me }))]
    );

    clock.advance(Duration::from_millis(3500));
    endpoint.tick(Duration::from_millis(3500), 1).unwrap();
    assert!(packets(&transport, endpoint.protocol()).is_empty());

    clock.advance(Duration::from_millis(600));
    endpoint.tick(Duration::from_millis(600), 2).unwrap();
    assert_eq!(
        packets(&transport, endpoint.protocol()),
        vec![(server_id, Payload::from(HeartbeatPacket { owner: me }))]
    );

    let record = beats.heartbeat(server_id).unwrap().unwrap();
    assert_eq!(record.owner(), me);
    assert_eq!(record.remaining(clock_now(&clock)), Duration::from_secs(5));

    // Clients never evict.
    clock.advance(Duration::from_secs(60));
    endpoint.tick(Duration::from_secs(60), 3).unwrap();
    assert!(endpoint.is_connected(server_id));
}

fn clock_now(clock: &ManualClock) -> std::time::Instant {
    crate::utils::time::Clock::now(clock)
}

#[test]
fn test_client_honours_disconnect_notice() {
    let clock = Arc::new(ManualClock::new());
    let (transport, endpoint) = client();
    let beats = heartbeat(&clock);
    endpoint.install(beats.clone()).unwrap();

    let server_id = PeerId::random();
    endpoint.connect(server_id).unwrap();
    endpoint
        .dispatch(
            &DisconnectPacket {
                reason: "shutting down".into(),
            }
            .into(),
            server_id,
        )
        .unwrap();

    assert!(!endpoint.is_connected(server_id));
    assert_eq!(transport.disconnected().unwrap(), vec![server_id]);
    assert_eq!(beats.tracked().unwrap(), 0);
}

#[test]
fn test_disconnect_removes_record() {
    let clock = Arc::new(ManualClock::new());
    let (_transport, endpoint) = server();
    let beats = heartbeat(&clock);
    endpoint.install(beats.clone()).unwrap();

    let peer = PeerId::random();
    endpoint.connect(peer).unwrap();
    assert_eq!(beats.tracked().unwrap(), 1);
    endpoint.disconnect(peer).unwrap();
    assert_eq!(beats.tracked().unwrap(), 0);
    assert!(beats.heartbeat(peer).unwrap().is_none());
}

#[test]
fn test_frame_roundtrip_through_protocol() {
    let protocol = Protocol::new();
    let packet: Payload = GraphListRequestPacket { group: String::new() }.into();
    let frame = protocol
        .packets
        .encode(&packet, &protocol.serializers)
        .unwrap();

    let bytes = frame.to_bytes().unwrap();
    let id = GraphListRequestPacket::id().0.to_be_bytes();
    assert_eq!(&bytes[..4], &id);
    assert_eq!(&bytes[4..8], &4i32.to_be_bytes());
    assert_eq!(&bytes[8..], &[0, 0, 0, 0]);

    let decoded = protocol
        .packets
        .decode(&frame, &protocol.serializers)
        .unwrap();
    assert_eq!(decoded, Some(packet));
}

#[test]
fn test_heartbeat_after_disconnect_is_ignored() {
    let clock = Arc::new(ManualClock::new());
    let (_transport, endpoint) = server();
    let beats = heartbeat(&clock);
    endpoint.install(beats.clone()).unwrap();

    let peer = PeerId::random();
    endpoint.connect(peer).unwrap();
    endpoint.disconnect(peer).unwrap();

    // A heartbeat already in flight when the peer left.
    endpoint
        .dispatch(&HeartbeatPacket { owner: peer }.into(), peer)
        .unwrap();
    assert_eq!(beats.tracked().unwrap(), 0);

    clock.advance(Duration::from_secs(10));
    endpoint.tick(Duration::from_secs(10), 1).unwrap();
    assert_eq!(endpoint.metrics().snapshot().heartbeats_expired, 0);
}

/// Memory transport that refuses frames for one peer.
struct Refusing {
    inner: MemoryTransport,
    refused: PeerId,
}

impl Transport for Refusing {
    fn send(&self, peer: PeerId, frame: bytes::Bytes) -> Result<()> {
        if peer == self.refused {
            return Err(ProtocolError::UnknownPeer(peer.to_string()));
        }
        self.inner.send(peer, frame)
    }

    fn disconnect(&self, peer: PeerId) -> Result<()> {
        self.inner.disconnect(peer)
    }
}

#[test]
fn test_failed_renewal_does_not_starve_other_peers() {
    let clock = Arc::new(ManualClock::new());
    let broken = PeerId::random();
    let healthy = PeerId::random();
    let transport = Arc::new(Refusing {
        inner: MemoryTransport::new(),
        refused: broken,
    });
    let endpoint = Endpoint::new(Role::Client, Arc::new(Protocol::new()), transport.clone());
    let beats = heartbeat(&clock);
    endpoint.install(beats.clone()).unwrap();

    endpoint.connect(broken).unwrap();
    endpoint.connect(healthy).unwrap();
    let errors_after_connect = endpoint.metrics().snapshot().listener_errors;
    transport.inner.drain().unwrap();

    clock.advance(Duration::from_millis(4100));
    endpoint.tick(Duration::from_millis(4100), 1).unwrap();

    let me = endpoint.local_id();
    assert_eq!(
        packets(&transport.inner, endpoint.protocol()),
        vec![(healthy, Payload::from(HeartbeatPacket { owner: me }))]
    );
    assert_eq!(
        endpoint.metrics().snapshot().listener_errors,
        errors_after_connect
    );
    let now = clock_now(&clock);
    for peer in [broken, healthy] {
        let record = beats.heartbeat(peer).unwrap().unwrap();
        assert_eq!(record.remaining(now), Duration::from_secs(5));
    }
}
