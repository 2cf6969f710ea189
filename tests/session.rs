//! End-to-end sessions between a server and in-memory clients.
//!
//! Frames are pumped between endpoints by hand so every step is deterministic.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use nodegraph_sync::config::HeartbeatConfig;
use nodegraph_sync::graph::{Edge, Graph, GraphStore, Node};
use nodegraph_sync::protocol::{Endpoint, HeartbeatListener, Protocol, Role};
use nodegraph_sync::service::{GraphSyncListener, MemoryTypeLibrary, SchemaSyncListener, TypeLibrary};
use nodegraph_sync::transport::MemoryTransport;
use nodegraph_sync::utils::ManualClock;
use nodegraph_sync::Property;

struct Peer {
    endpoint: Endpoint,
    transport: Arc<MemoryTransport>,
    store: Arc<GraphStore>,
    graphs: Arc<GraphSyncListener>,
    library: Arc<MemoryTypeLibrary>,
}

fn peer(role: Role, protocol: &Arc<Protocol>, clock: &Arc<ManualClock>) -> Peer {
    let transport = Arc::new(MemoryTransport::new());
    let endpoint = Endpoint::new(role, protocol.clone(), transport.clone());
    let store = Arc::new(GraphStore::new());
    let graphs = Arc::new(GraphSyncListener::new(store.clone()));
    let library = Arc::new(MemoryTypeLibrary::new());

    endpoint
        .install(Arc::new(HeartbeatListener::new(
            &HeartbeatConfig::default(),
            clock.clone(),
        )))
        .unwrap();
    endpoint.install(graphs.clone()).unwrap();
    endpoint
        .install(Arc::new(SchemaSyncListener::new(library.clone())))
        .unwrap();

    Peer {
        endpoint,
        transport,
        store,
        graphs,
        library,
    }
}

fn join(server: &Peer, client: &Peer) {
    server.endpoint.connect(client.endpoint.local_id()).unwrap();
    client.endpoint.connect(server.endpoint.local_id()).unwrap();
}

/// Deliver queued frames until every transport is quiet. Returns frames moved.
fn pump(server: &Peer, clients: &[&Peer]) -> usize {
    let server_id = server.endpoint.local_id();
    let mut moved = 0;
    loop {
        let mut round = 0;
        for (target, frame) in server.transport.drain().unwrap() {
            let client = clients
                .iter()
                .find(|c| c.endpoint.local_id() == target)
                .expect("frame for unknown client");
            client.endpoint.receive_frame(server_id, frame).unwrap();
            round += 1;
        }
        for client in clients {
            for (target, frame) in client.transport.drain().unwrap() {
                assert_eq!(target, server_id);
                server
                    .endpoint
                    .receive_frame(client.endpoint.local_id(), frame)
                    .unwrap();
                round += 1;
            }
        }
        if round == 0 {
            return moved;
        }
        moved += round;
    }
}

fn sample_graph() -> Property {
    let mut graph = Graph::new();
    let a = graph.upsert_node(Node::new("time")).unwrap();
    let b = graph.upsert_node(Node::new("sine")).unwrap();
    graph.connect(Edge::new(a, "seconds", b, "x")).unwrap();
    graph.into_property()
}

fn schema(name: &str) -> Property {
    let mut schema = Property::object();
    schema.put("name", name.to_string()).unwrap();
    schema.put("inputs", 2i64).unwrap();
    schema
}

#[test]
fn test_client_receives_library_on_connect() {
    let clock = Arc::new(ManualClock::new());
    let protocol = Arc::new(Protocol::new());
    let server = peer(Role::Server, &protocol, &clock);
    let client = peer(Role::Client, &protocol, &clock);

    server
        .library
        .load_properties(vec![schema("add"), schema("multiply")])
        .unwrap();
    client.library.load_properties(vec![schema("stale")]).unwrap();

    join(&server, &client);
    pump(&server, &[&client]);

    assert_eq!(client.library.count(), 2);
    assert!(client.library.get("stale").unwrap().is_none());
    assert_eq!(client.library.get("add").unwrap(), Some(schema("add")));
}

#[test]
fn test_list_request_replicates_group() {
    let clock = Arc::new(ManualClock::new());
    let protocol = Arc::new(Protocol::new());
    let server = peer(Role::Server, &protocol, &clock);
    let client = peer(Role::Client, &protocol, &clock);

    server.store.put("shaders", "water", sample_graph()).unwrap();
    server.store.put("shaders", "lava", Graph::new().into()).unwrap();
    server.store.put("scripts", "door", Graph::new().into()).unwrap();
    client.store.put("shaders", "deleted", Graph::new().into()).unwrap();

    join(&server, &client);
    pump(&server, &[&client]);

    client.graphs.request(&client.endpoint, "shaders").unwrap();
    pump(&server, &[&client]);

    assert_eq!(client.store.list("shaders").unwrap(), vec!["lava", "water"]);
    assert!(client.store.list("scripts").unwrap().is_empty());
    let replicated = client.store.get("shaders", "water").unwrap().unwrap();
    assert_eq!(Some(replicated.clone()), server.store.get("shaders", "water").unwrap());
    let graph = Graph::from_property(replicated).unwrap();
    assert_eq!(graph.nodes().unwrap().len(), 2);
    assert_eq!(graph.edges().unwrap().len(), 1);
}

#[test]
fn test_empty_group_request() {
    let clock = Arc::new(ManualClock::new());
    let protocol = Arc::new(Protocol::new());
    let server = peer(Role::Server, &protocol, &clock);
    let client = peer(Role::Client, &protocol, &clock);

    join(&server, &client);
    pump(&server, &[&client]);

    client.graphs.request(&client.endpoint, "").unwrap();
    let moved = pump(&server, &[&client]);
    assert_eq!(moved, 2, "request and empty response");
    assert!(client.store.is_empty());
}

#[test]
fn test_update_is_relayed_to_other_clients_only() {
    let clock = Arc::new(ManualClock::new());
    let protocol = Arc::new(Protocol::new());
    let server = peer(Role::Server, &protocol, &clock);
    let alice = peer(Role::Client, &protocol, &clock);
    let bob = peer(Role::Client, &protocol, &clock);

    join(&server, &alice);
    join(&server, &bob);
    pump(&server, &[&alice, &bob]);

    let graph = sample_graph();
    alice
        .graphs
        .publish(&alice.endpoint, "shaders", "water", graph.clone())
        .unwrap();

    let before = alice.endpoint.metrics().snapshot().frames_received;
    pump(&server, &[&alice, &bob]);
    let after = alice.endpoint.metrics().snapshot().frames_received;

    assert_eq!(server.store.get("shaders", "water").unwrap(), Some(graph.clone()));
    assert_eq!(bob.store.get("shaders", "water").unwrap(), Some(graph));
    assert_eq!(before, after, "publisher must not get its own update back");

    bob.graphs.delete(&bob.endpoint, "shaders", "water").unwrap();
    pump(&server, &[&alice, &bob]);
    assert!(server.store.is_empty());
    assert!(alice.store.is_empty());
}

#[test]
fn test_silent_client_is_evicted() {
    let clock = Arc::new(ManualClock::new());
    let protocol = Arc::new(Protocol::new());
    let server = peer(Role::Server, &protocol, &clock);
    let client = peer(Role::Client, &protocol, &clock);

    join(&server, &client);
    pump(&server, &[&client]);

    // Client keeps renewing: stays connected well past one lease.
    for tick in 1..=20 {
        clock.advance(Duration::from_millis(500));
        client.endpoint.tick(Duration::from_millis(500), tick).unwrap();
        server.endpoint.tick(Duration::from_millis(500), tick).unwrap();
        pump(&server, &[&client]);
    }
    assert!(server.endpoint.is_connected(client.endpoint.local_id()));

    // Client goes quiet: only the server keeps ticking.
    clock.advance(Duration::from_millis(5100));
    server.endpoint.tick(Duration::from_millis(5100), 21).unwrap();
    assert!(!server.endpoint.is_connected(client.endpoint.local_id()));

    // The disconnect notice reaches the client, which drops the server.
    pump(&server, &[&client]);
    assert!(!client.endpoint.is_connected(server.endpoint.local_id()));
    assert_eq!(server.endpoint.metrics().snapshot().heartbeats_expired, 1);
}

#[test]
fn test_departed_peer_claims_are_released() {
    let clock = Arc::new(ManualClock::new());
    let protocol = Arc::new(Protocol::new());
    let server = peer(Role::Server, &protocol, &clock);
    let alice = peer(Role::Client, &protocol, &clock);
    let bob = peer(Role::Client, &protocol, &clock);

    join(&server, &alice);
    join(&server, &bob);
    pump(&server, &[&alice, &bob]);

    let alice_id = alice.endpoint.local_id();
    let mut graph = Graph::new();
    let held = graph.upsert_node(Node::new("time")).unwrap();
    let free = graph.upsert_node(Node::new("sine")).unwrap();
    graph.claim(held, alice_id).unwrap();
    alice
        .graphs
        .publish(&alice.endpoint, "shaders", "water", graph.into_property())
        .unwrap();
    pump(&server, &[&alice, &bob]);

    let seen = Graph::from_property(bob.store.get("shaders", "water").unwrap().unwrap()).unwrap();
    assert_eq!(seen.owner_of(held).unwrap(), alice_id);

    server.endpoint.disconnect(alice_id).unwrap();
    pump(&server, &[&bob]);

    for store in [&server.store, &bob.store] {
        let graph = Graph::from_property(store.get("shaders", "water").unwrap().unwrap()).unwrap();
        assert!(graph.owner_of(held).unwrap().is_none());
        assert!(graph.owner_of(free).unwrap().is_none());
        assert_eq!(graph.links().unwrap().len(), 1);
    }
}
