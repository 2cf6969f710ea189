//! Whole-graph view: lists of nodes, edges and links inside one Object.

use crate::core::property::{Property, PropertyMap};
use crate::error::{ProtocolError, Result};
use crate::graph::entity::{Edge, Link, Node};
use crate::graph::{EdgeId, NodeId};
use crate::transport::PeerId;

const NODES: &str = "nodes";
const EDGES: &str = "edges";
const LINKS: &str = "links";

/// A graph document. Converts to and from the [`Property`] carried in
/// graph update packets.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    inner: Property,
}

impl Default for Graph {
    fn default() -> Self {
        Self::with_defaults(Property::object())
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_property(inner: Property) -> Result<Self> {
        let graph = Self::with_defaults(inner);
        graph.inner.as_object()?;
        for key in [NODES, EDGES, LINKS] {
            graph.inner.field(key)?.as_list()?;
        }
        Ok(graph)
    }

    fn with_defaults(mut inner: Property) -> Self {
        if let Property::Object(map) = &mut inner {
            for key in [NODES, EDGES, LINKS] {
                map.entry(key.into()).or_insert_with(Property::list);
            }
        }
        Self { inner }
    }

    pub fn as_property(&self) -> &Property {
        &self.inner
    }

    pub fn into_property(self) -> Property {
        self.inner
    }

    fn items(&self, key: &str) -> Result<&[Property]> {
        self.inner.field(key)?.as_list()
    }

    fn items_mut(&mut self, key: &str) -> Result<&mut Vec<Property>> {
        self.inner.field_mut(key)?.as_list_mut()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn nodes(&self) -> Result<Vec<Node>> {
        self.items(NODES)?
            .iter()
            .cloned()
            .map(Node::from_property)
            .collect()
    }

    pub fn node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.nodes()?.into_iter().find(|n| n.id().ok() == Some(id)))
    }

    pub fn contains_node(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.is_some())
    }

    /// Insert `node`, replacing any node with the same id.
    pub fn upsert_node(&mut self, node: Node) -> Result<NodeId> {
        let id = node.id()?;
        let nodes = self.items_mut(NODES)?;
        nodes.retain(|p| p.get::<NodeId>("id").ok() != Some(&id));
        nodes.push(node.into_property());
        Ok(id)
    }

    /// Remove a node along with every edge and link that refers to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<bool> {
        let nodes = self.items_mut(NODES)?;
        let before = nodes.len();
        nodes.retain(|p| p.get::<NodeId>("id").ok() != Some(&id));
        if nodes.len() == before {
            return Ok(false);
        }

        let edges: Vec<Property> = self
            .edges()?
            .into_iter()
            .filter(|e| !e.touches(id).unwrap_or(false))
            .map(Edge::into_property)
            .collect();
        *self.items_mut(EDGES)? = edges;

        let links: Vec<Property> = self
            .links()?
            .into_iter()
            .filter(|l| l.node().ok() != Some(id))
            .map(Link::into_property)
            .collect();
        *self.items_mut(LINKS)? = links;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    pub fn edges(&self) -> Result<Vec<Edge>> {
        self.items(EDGES)?
            .iter()
            .cloned()
            .map(Edge::from_property)
            .collect()
    }

    /// Add `edge`. Both endpoints must already be in the graph.
    pub fn connect(&mut self, edge: Edge) -> Result<EdgeId> {
        for end in [edge.source()?, edge.target()?] {
            if !self.contains_node(end)? {
                return Err(ProtocolError::MissingField(format!("node {end}")));
            }
        }
        let id = edge.id()?;
        self.items_mut(EDGES)?.push(edge.into_property());
        Ok(id)
    }

    pub fn disconnect(&mut self, id: EdgeId) -> Result<bool> {
        let edges = self.items_mut(EDGES)?;
        let before = edges.len();
        edges.retain(|p| p.get::<EdgeId>("id").ok() != Some(&id));
        Ok(edges.len() != before)
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    pub fn links(&self) -> Result<Vec<Link>> {
        self.items(LINKS)?
            .iter()
            .cloned()
            .map(Link::from_property)
            .collect()
    }

    /// Current owner of `node`, or [`PeerId::NONE`].
    pub fn owner_of(&self, node: NodeId) -> Result<PeerId> {
        for link in self.links()? {
            if link.node()? == node {
                return link.owner();
            }
        }
        Ok(PeerId::NONE)
    }

    /// Claim `node` for `owner`, creating its link on first use.
    pub fn claim(&mut self, node: NodeId, owner: PeerId) -> Result<()> {
        if !self.contains_node(node)? {
            return Err(ProtocolError::MissingField(format!("node {node}")));
        }
        let mut links = self.links()?;
        match links.iter_mut().find(|l| l.node().ok() == Some(node)) {
            Some(link) => link.set_owner(owner)?,
            None => {
                let mut link = Link::new(node);
                link.set_owner(owner)?;
                links.push(link);
            }
        }
        *self.items_mut(LINKS)? = links.into_iter().map(Link::into_property).collect();
        Ok(())
    }

    /// Release every claim held by `owner`. Returns how many were released.
    pub fn release_all(&mut self, owner: PeerId) -> Result<usize> {
        let mut released = 0;
        let mut links = self.links()?;
        for link in links.iter_mut() {
            if link.owner()? == owner {
                link.release()?;
                released += 1;
            }
        }
        *self.items_mut(LINKS)? = links.into_iter().map(Link::into_property).collect();
        Ok(released)
    }
}

impl From<Graph> for Property {
    fn from(graph: Graph) -> Self {
        graph.inner
    }
}

impl TryFrom<Property> for Graph {
    type Error = ProtocolError;

    fn try_from(property: Property) -> Result<Self> {
        Graph::from_property(property)
    }
}

impl From<PropertyMap> for Graph {
    fn from(map: PropertyMap) -> Self {
        Self::with_defaults(Property::Object(map))
    }
}
