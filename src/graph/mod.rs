//! # Graph Documents
//!
//! Named-field views over [`Property`](crate::core::property::Property) objects
//! for the shared node graph, plus the store that holds every open document.
//!
//! Identifiers are written on the wire through the [`Uuid`] serializer; see
//! [`register_types`].

pub mod document;
pub mod entity;
pub mod store;

pub use document::Graph;
pub use entity::{Edge, Link, Node};
pub use store::GraphStore;

use std::fmt;

use uuid::Uuid;

use crate::core::serializer::{SerializerRegistry, Subtype};
use crate::error::Result;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(Uuid);

        impl $name {
            pub const NONE: $name = $name(Uuid::nil());

            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            pub fn is_none(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Subtype<Uuid> for $name {
            fn upcast(&self) -> Uuid {
                self.0
            }

            fn downcast(value: Uuid) -> Result<Self> {
                Ok(Self(value))
            }
        }
    };
}

uuid_newtype!(
    /// Identity of a node within a graph.
    NodeId
);

uuid_newtype!(
    /// Identity of an edge within a graph.
    EdgeId
);

/// Declare the graph identifier types on `registry`.
pub fn register_types(registry: &mut SerializerRegistry) {
    registry.declare_subtype::<NodeId, Uuid>("node_id");
    registry.declare_subtype::<EdgeId, Uuid>("edge_id");
}
