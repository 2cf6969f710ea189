//! Node, edge and link views.
//!
//! Each view owns an Object [`Property`] and exposes its fields by name.
//! Defaults are filled in once, when the view is created or adopted; the random
//! identifier in particular is generated only if the object has none yet.

use uuid::Uuid;

use crate::core::property::{Property, PropertyMap};
use crate::error::Result;
use crate::graph::{EdgeId, NodeId};
use crate::transport::PeerId;

const ID: &str = "id";
const KIND: &str = "kind";
const X: &str = "x";
const Y: &str = "y";
const PROPERTIES: &str = "properties";
const SOURCE: &str = "source";
const SOURCE_PIN: &str = "source_pin";
const TARGET: &str = "target";
const TARGET_PIN: &str = "target_pin";
const NODE: &str = "node";
const OWNER: &str = "owner";
const LABEL: &str = "label";

macro_rules! field {
    ($get:ident, $set:ident, $key:expr, $ty:ty) => {
        pub fn $get(&self) -> Result<$ty> {
            self.inner.get::<$ty>($key).cloned()
        }

        pub fn $set(&mut self, value: $ty) -> Result<()> {
            self.inner.put($key, value)
        }
    };
}

macro_rules! view {
    ($name:ident) => {
        impl $name {
            pub fn as_property(&self) -> &Property {
                &self.inner
            }

            pub fn into_property(self) -> Property {
                self.inner
            }
        }

        impl From<$name> for Property {
            fn from(view: $name) -> Self {
                view.inner
            }
        }

        impl TryFrom<Property> for $name {
            type Error = crate::error::ProtocolError;

            fn try_from(property: Property) -> Result<Self> {
                $name::from_property(property)
            }
        }
    };
}

/// A node: kind, canvas position and free-form properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    inner: Property,
}

impl Node {
    pub fn new(kind: impl Into<String>) -> Self {
        let mut map = PropertyMap::new();
        map.insert(KIND.into(), Property::literal(kind.into()));
        Self::with_defaults(Property::Object(map))
    }

    /// Adopt an existing object, filling any missing fields.
    pub fn from_property(inner: Property) -> Result<Self> {
        inner.as_object()?;
        Ok(Self::with_defaults(inner))
    }

    fn with_defaults(mut inner: Property) -> Self {
        if let Property::Object(map) = &mut inner {
            map.entry(ID.into())
                .or_insert_with(|| Property::literal(NodeId::random()));
            map.entry(KIND.into())
                .or_insert_with(|| Property::literal(String::new()));
            map.entry(X.into()).or_insert_with(|| Property::literal(0.0f64));
            map.entry(Y.into()).or_insert_with(|| Property::literal(0.0f64));
            map.entry(PROPERTIES.into()).or_insert_with(Property::object);
        }
        Self { inner }
    }

    field!(id, set_id, ID, NodeId);
    field!(kind, set_kind, KIND, String);
    field!(x, set_x, X, f64);
    field!(y, set_y, Y, f64);

    pub fn position(&self) -> Result<(f64, f64)> {
        Ok((self.x()?, self.y()?))
    }

    pub fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        self.set_x(x)?;
        self.set_y(y)
    }

    pub fn properties(&self) -> Result<&Property> {
        self.inner.field(PROPERTIES)
    }

    pub fn properties_mut(&mut self) -> Result<&mut Property> {
        self.inner.field_mut(PROPERTIES)
    }
}

view!(Node);

/// A directed connection from an output pin to an input pin.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    inner: Property,
}

impl Default for Edge {
    fn default() -> Self {
        Self::with_defaults(Property::object())
    }
}

impl Edge {
    pub fn new(
        source: NodeId,
        source_pin: impl Into<String>,
        target: NodeId,
        target_pin: impl Into<String>,
    ) -> Self {
        let mut map = PropertyMap::new();
        map.insert(SOURCE.into(), Property::literal(source));
        map.insert(SOURCE_PIN.into(), Property::literal(source_pin.into()));
        map.insert(TARGET.into(), Property::literal(target));
        map.insert(TARGET_PIN.into(), Property::literal(target_pin.into()));
        Self::with_defaults(Property::Object(map))
    }

    pub fn from_property(inner: Property) -> Result<Self> {
        inner.as_object()?;
        Ok(Self::with_defaults(inner))
    }

    fn with_defaults(mut inner: Property) -> Self {
        if let Property::Object(map) = &mut inner {
            map.entry(ID.into())
                .or_insert_with(|| Property::literal(EdgeId::random()));
            map.entry(SOURCE.into())
                .or_insert_with(|| Property::literal(NodeId::NONE));
            map.entry(SOURCE_PIN.into())
                .or_insert_with(|| Property::literal(String::new()));
            map.entry(TARGET.into())
                .or_insert_with(|| Property::literal(NodeId::NONE));
            map.entry(TARGET_PIN.into())
                .or_insert_with(|| Property::literal(String::new()));
        }
        Self { inner }
    }

    field!(id, set_id, ID, EdgeId);
    field!(source, set_source, SOURCE, NodeId);
    field!(source_pin, set_source_pin, SOURCE_PIN, String);
    field!(target, set_target, TARGET, NodeId);
    field!(target_pin, set_target_pin, TARGET_PIN, String);

    /// Whether either end is `node`.
    pub fn touches(&self, node: NodeId) -> Result<bool> {
        Ok(self.source()? == node || self.target()? == node)
    }
}

view!(Edge);

/// A peer's claim on a node. The nil owner means unclaimed.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    inner: Property,
}

impl Link {
    pub fn new(node: NodeId) -> Self {
        let mut map = PropertyMap::new();
        map.insert(NODE.into(), Property::literal(node));
        Self::with_defaults(Property::Object(map))
    }

    pub fn from_property(inner: Property) -> Result<Self> {
        inner.as_object()?;
        Ok(Self::with_defaults(inner))
    }

    fn with_defaults(mut inner: Property) -> Self {
        if let Property::Object(map) = &mut inner {
            map.entry(ID.into())
                .or_insert_with(|| Property::literal(Uuid::new_v4()));
            map.entry(NODE.into())
                .or_insert_with(|| Property::literal(NodeId::NONE));
            map.entry(OWNER.into())
                .or_insert_with(|| Property::literal(PeerId::NONE));
            map.entry(LABEL.into())
                .or_insert_with(|| Property::literal(String::new()));
        }
        Self { inner }
    }

    field!(id, set_id, ID, Uuid);
    field!(node, set_node, NODE, NodeId);
    field!(owner, set_owner, OWNER, PeerId);
    field!(label, set_label, LABEL, String);

    pub fn is_claimed(&self) -> Result<bool> {
        Ok(!self.owner()?.is_none())
    }

    pub fn release(&mut self) -> Result<()> {
        self.set_owner(PeerId::NONE)
    }
}

view!(Link);

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::error::ProtocolError;

    #[test]
    fn test_identifier_is_computed_once() {
        let edge = Edge::default();
        let first = edge.id().unwrap();
        assert_eq!(edge.id().unwrap(), first);
        assert!(!first.is_none());

        let adopted = Edge::from_property(edge.into_property()).unwrap();
        assert_eq!(adopted.id().unwrap(), first);
    }

    #[test]
    fn test_link_defaults_to_no_owner() {
        let node = NodeId::random();
        let mut link = Link::new(node);
        assert_eq!(link.node().unwrap(), node);
        assert_eq!(link.owner().unwrap(), PeerId::NONE);
        assert!(!link.is_claimed().unwrap());

        let peer = PeerId::random();
        link.set_owner(peer).unwrap();
        assert!(link.is_claimed().unwrap());
        link.release().unwrap();
        assert!(!link.is_claimed().unwrap());
    }

    #[test]
    fn test_adopt_fills_missing_fields_only() {
        let mut raw = Property::object();
        raw.put("kind", String::from("add")).unwrap();
        raw.put("x", 12.5f64).unwrap();
        let node = Node::from_property(raw).unwrap();
        assert_eq!(node.kind().unwrap(), "add");
        assert_eq!(node.position().unwrap(), (12.5, 0.0));
        assert!(node.properties().unwrap().as_object().unwrap().is_empty());
    }

    #[test]
    fn test_wrong_field_type_is_mismatch() {
        let mut raw = Property::object();
        raw.put("source", String::from("not-an-id")).unwrap();
        let edge = Edge::from_property(raw).unwrap();
        assert!(matches!(
            edge.source(),
            Err(ProtocolError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(Node::from_property(Property::list()).is_err());
        assert!(Link::try_from(Property::Null).is_err());
    }

    #[test]
    fn test_edge_touches_endpoints() {
        let a = NodeId::random();
        let b = NodeId::random();
        let edge = Edge::new(a, "out", b, "in");
        assert!(edge.touches(a).unwrap());
        assert!(edge.touches(b).unwrap());
        assert!(!edge.touches(NodeId::random()).unwrap());
        assert_eq!(edge.source_pin().unwrap(), "out");
    }
}
