//! Graph replication.
//!
//! The server is authoritative. A client asks for a group with a list request;
//! the server answers with the names in that group followed by one update per
//! graph. Updates and deletions from any peer are applied to the local store
//! and, on the server, relayed to every other peer.
//!
//! When a peer leaves, the server releases every node that peer had claimed and
//! relays the affected graphs to the peers that remain.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::property::Property;
use crate::error::Result;
use crate::graph::{Graph, GraphStore};
use crate::protocol::dispatcher::Listener;
use crate::protocol::endpoint::Endpoint;
use crate::protocol::message::{
    GraphDeletePacket, GraphListRequestPacket, GraphListResponsePacket, GraphUpdatePacket, Payload,
};
use crate::transport::PeerId;

pub struct GraphSyncListener {
    store: Arc<GraphStore>,
}

impl GraphSyncListener {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Ask the server for every graph in `group`.
    pub fn request(&self, endpoint: &Endpoint, group: &str) -> Result<()> {
        endpoint.send_to_all(
            &GraphListRequestPacket {
                group: group.to_string(),
            }
            .into(),
        )
    }

    /// Store a local edit and send it to every connected peer.
    pub fn publish(&self, endpoint: &Endpoint, group: &str, name: &str, graph: Property) -> Result<()> {
        self.store.put(group, name, graph.clone())?;
        endpoint.send_to_all(
            &GraphUpdatePacket {
                group: group.to_string(),
                name: name.to_string(),
                graph,
            }
            .into(),
        )
    }

    /// Delete locally and tell every connected peer.
    pub fn delete(&self, endpoint: &Endpoint, group: &str, name: &str) -> Result<()> {
        self.store.remove(group, name)?;
        endpoint.send_to_all(
            &GraphDeletePacket {
                group: group.to_string(),
                name: name.to_string(),
            }
            .into(),
        )
    }

    fn serve_list(&self, endpoint: &Endpoint, request: &GraphListRequestPacket, from: PeerId) -> Result<()> {
        let entries = self.store.entries(&request.group)?;
        debug!(peer = %from, group = %request.group, count = entries.len(), "Serving graph list");

        let response = GraphListResponsePacket {
            group: request.group.clone(),
            names: entries.iter().map(|(name, _)| name.clone()).collect(),
        };
        endpoint.send(&response.into(), from)?;

        for (name, graph) in entries {
            let update = GraphUpdatePacket {
                group: request.group.clone(),
                name,
                graph,
            };
            endpoint.send(&update.into(), from)?;
        }
        Ok(())
    }

    /// Release the claims `peer` holds in every stored graph and relay each
    /// graph that changed. Returns the number of claims released.
    pub fn release_claims(&self, endpoint: &Endpoint, peer: PeerId) -> Result<usize> {
        let mut released = 0;
        for group in self.store.groups()? {
            for (name, stored) in self.store.entries(&group)? {
                let mut graph = match Graph::from_property(stored) {
                    Ok(graph) => graph,
                    Err(e) => {
                        warn!(group = %group, name = %name, error = %e, "Skipping non-graph document");
                        continue;
                    }
                };
                let count = graph.release_all(peer)?;
                if count == 0 {
                    continue;
                }
                released += count;
                let graph = graph.into_property();
                self.store.put(&group, &name, graph.clone())?;
                endpoint.send_to_all(
                    &GraphUpdatePacket {
                        group: group.clone(),
                        name,
                        graph,
                    }
                    .into(),
                )?;
            }
        }
        Ok(released)
    }
}

impl Listener for GraphSyncListener {
    fn name(&self) -> &'static str {
        "graph-sync"
    }

    fn on_packet(&self, endpoint: &Endpoint, packet: &Payload, from: PeerId) -> Result<()> {
        match packet {
            Payload::GraphListRequest(request) => {
                if endpoint.is_server() {
                    self.serve_list(endpoint, request, from)?;
                }
                Ok(())
            }
            Payload::GraphListResponse(response) => {
                if endpoint.is_server() {
                    return Ok(());
                }
                let stale = self.store.retain(&response.group, &response.names)?;
                if !stale.is_empty() {
                    info!(group = %response.group, ?stale, "Dropped graphs absent on server");
                }
                Ok(())
            }
            Payload::GraphUpdate(update) => {
                self.store
                    .put(&update.group, &update.name, update.graph.clone())?;
                if endpoint.is_server() {
                    endpoint.send_to_all_except(packet, from)?;
                }
                Ok(())
            }
            Payload::GraphDelete(delete) => {
                let removed = self.store.remove(&delete.group, &delete.name)?;
                if removed.is_some() && endpoint.is_server() {
                    endpoint.send_to_all_except(packet, from)?;
                }
                Ok(())
            }
            Payload::Heartbeat(_) | Payload::Disconnect(_) | Payload::SchemaSync(_) => Ok(()),
        }
    }

    fn on_disconnect(&self, endpoint: &Endpoint, peer: PeerId) -> Result<()> {
        if !endpoint.is_server() {
            return Ok(());
        }
        let released = self.release_claims(endpoint, peer)?;
        if released > 0 {
            info!(peer = %peer, released, "Released claims of departed peer");
        }
        Ok(())
    }
}
