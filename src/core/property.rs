//! # Property Tree
//!
//! Recursive, type-erased value model shared by packets, graph documents and
//! schema descriptors.
//!
//! A [`Property`] is a literal value, a string-keyed object, an ordered list, or
//! null. Typed accessors never coerce: asking for the wrong variant or the wrong
//! literal type returns [`ProtocolError::TypeMismatch`].
//!
//! ## Wire Format
//! ```text
//! Null    [0]
//! Literal [1] [wire name: string] [serializer payload]
//! Object  [2] [count: i32] ([key: string] [property])*
//! List    [3] [count: i32] ([property])*
//! ```
//! Object keys are written in sorted order so equal trees encode identically.
//! A literal's wire name is the one bound to its type in the
//! [`SerializerRegistry`].
//!
//! Containers may nest at most [`MAX_PROPERTY_DEPTH`] levels. Deeper trees fail
//! with [`ProtocolError::NestingTooDeep`] on both write and read.

use std::collections::HashMap;
use std::fmt;

use crate::core::buffer::Buffer;
use crate::core::serializer::{SerializerRegistry, Value};
use crate::error::{ProtocolError, Result};

const TAG_NULL: i8 = 0;
const TAG_LITERAL: i8 = 1;
const TAG_OBJECT: i8 = 2;
const TAG_LIST: i8 = 3;

/// Deepest container nesting accepted by the codec.
pub const MAX_PROPERTY_DEPTH: usize = 64;

/// Keyed children of an object property.
pub type PropertyMap = HashMap<String, Property>;

/// Node in a property tree.
#[derive(Default)]
pub enum Property {
    Literal(Box<dyn Value>),
    Object(PropertyMap),
    List(Vec<Property>),
    #[default]
    Null,
}

impl Clone for Property {
    fn clone(&self) -> Self {
        match self {
            Property::Literal(value) => Property::Literal(value.clone_value()),
            Property::Object(map) => Property::Object(map.clone()),
            Property::List(items) => Property::List(items.clone()),
            Property::Null => Property::Null,
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Property::Literal(a), Property::Literal(b)) => a.eq_value(b.as_ref()),
            (Property::Object(a), Property::Object(b)) => a == b,
            (Property::List(a), Property::List(b)) => a == b,
            (Property::Null, Property::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Literal(value) => write!(f, "Literal({value:?})"),
            Property::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Property::List(items) => f.debug_list().entries(items.iter()).finish(),
            Property::Null => f.write_str("Null"),
        }
    }
}

impl Property {
    pub fn literal<T: Value>(value: T) -> Self {
        Property::Literal(Box::new(value))
    }

    /// Empty object.
    pub fn object() -> Self {
        Property::Object(PropertyMap::new())
    }

    /// Empty list.
    pub fn list() -> Self {
        Property::List(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null)
    }

    /// Variant name, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Property::Literal(value) => value.type_key().name(),
            Property::Object(_) => "object",
            Property::List(_) => "list",
            Property::Null => "null",
        }
    }

    // ------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------

    /// Borrow the literal as `T`.
    pub fn as_literal<T: Value>(&self) -> Result<&T> {
        match self {
            Property::Literal(value) => value
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| ProtocolError::mismatch(std::any::type_name::<T>(), self.kind())),
            other => Err(ProtocolError::mismatch(
                std::any::type_name::<T>(),
                other.kind(),
            )),
        }
    }

    pub fn as_object(&self) -> Result<&PropertyMap> {
        match self {
            Property::Object(map) => Ok(map),
            other => Err(ProtocolError::mismatch("object", other.kind())),
        }
    }

    pub fn as_object_mut(&mut self) -> Result<&mut PropertyMap> {
        match self {
            Property::Object(map) => Ok(map),
            other => Err(ProtocolError::mismatch("object", other.kind())),
        }
    }

    pub fn as_list(&self) -> Result<&[Property]> {
        match self {
            Property::List(items) => Ok(items),
            other => Err(ProtocolError::mismatch("list", other.kind())),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut Vec<Property>> {
        match self {
            Property::List(items) => Ok(items),
            other => Err(ProtocolError::mismatch("list", other.kind())),
        }
    }

    /// Child of an object by key.
    pub fn field(&self, key: &str) -> Result<&Property> {
        self.as_object()?
            .get(key)
            .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
    }

    pub fn field_mut(&mut self, key: &str) -> Result<&mut Property> {
        self.as_object_mut()?
            .get_mut(key)
            .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
    }

    /// Literal child of an object, as `T`.
    pub fn get<T: Value>(&self, key: &str) -> Result<&T> {
        self.field(key)?.as_literal::<T>()
    }

    /// Insert or replace an object child.
    pub fn set(&mut self, key: impl Into<String>, value: Property) -> Result<()> {
        self.as_object_mut()?.insert(key.into(), value);
        Ok(())
    }

    /// Insert or replace a literal object child.
    pub fn put<T: Value>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.set(key, Property::literal(value))
    }

    /// Insert `init()` under `key` only when the key is absent.
    pub fn ensure(&mut self, key: &str, init: impl FnOnce() -> Property) -> Result<&mut Property> {
        Ok(self
            .as_object_mut()?
            .entry(key.to_string())
            .or_insert_with(init))
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Property>> {
        Ok(self.as_object_mut()?.remove(key))
    }

    /// Element of a list by index.
    pub fn item(&self, index: usize) -> Result<&Property> {
        let items = self.as_list()?;
        items.get(index).ok_or(ProtocolError::IndexOutOfBounds {
            index,
            len: items.len(),
        })
    }

    /// Literal element of a list, as `T`.
    pub fn index<T: Value>(&self, index: usize) -> Result<&T> {
        self.item(index)?.as_literal::<T>()
    }

    pub fn push(&mut self, value: Property) -> Result<()> {
        self.as_list_mut()?.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            Property::Object(map) => map.len(),
            Property::List(items) => items.len(),
            Property::Literal(_) => 1,
            Property::Null => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Codec
    // ------------------------------------------------------------------

    pub fn write(&self, buffer: &mut Buffer, registry: &SerializerRegistry) -> Result<()> {
        self.write_nested(buffer, registry, 0)
    }

    fn write_nested(
        &self,
        buffer: &mut Buffer,
        registry: &SerializerRegistry,
        depth: usize,
    ) -> Result<()> {
        match self {
            Property::Null => buffer.write_byte(TAG_NULL),
            Property::Literal(value) => {
                buffer.write_byte(TAG_LITERAL)?;
                buffer.write_string(registry.wire_name(value.type_key())?)?;
                registry.write_value(buffer, value.as_ref())
            }
            Property::Object(map) => {
                check_depth(depth)?;
                buffer.write_byte(TAG_OBJECT)?;
                buffer.write_length(map.len())?;
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    buffer.write_string(key)?;
                    map[key].write_nested(buffer, registry, depth + 1)?;
                }
                Ok(())
            }
            Property::List(items) => {
                check_depth(depth)?;
                buffer.write_byte(TAG_LIST)?;
                buffer.write_length(items.len())?;
                for item in items {
                    item.write_nested(buffer, registry, depth + 1)?;
                }
                Ok(())
            }
        }
    }

    pub fn read(buffer: &mut Buffer, registry: &SerializerRegistry) -> Result<Self> {
        Self::read_nested(buffer, registry, 0)
    }

    fn read_nested(
        buffer: &mut Buffer,
        registry: &SerializerRegistry,
        depth: usize,
    ) -> Result<Self> {
        match buffer.read_byte()? {
            TAG_NULL => Ok(Property::Null),
            TAG_LITERAL => {
                let name = buffer.read_string()?;
                let key = registry
                    .key_by_name(&name)
                    .ok_or(ProtocolError::MissingSerializer(name))?;
                Ok(Property::Literal(registry.read_value(buffer, key)?))
            }
            TAG_OBJECT => {
                check_depth(depth)?;
                let count = buffer.read_length()?;
                let mut map = PropertyMap::with_capacity(count.min(buffer.remaining()));
                for _ in 0..count {
                    let key = buffer.read_string()?;
                    let value = Property::read_nested(buffer, registry, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(Property::Object(map))
            }
            TAG_LIST => {
                check_depth(depth)?;
                let count = buffer.read_length()?;
                let mut items = Vec::with_capacity(count.min(buffer.remaining()));
                for _ in 0..count {
                    items.push(Property::read_nested(buffer, registry, depth + 1)?);
                }
                Ok(Property::List(items))
            }
            tag => Err(ProtocolError::mismatch("property tag", format!("tag {tag}"))),
        }
    }
}

fn check_depth(depth: usize) -> Result<()> {
    if depth >= MAX_PROPERTY_DEPTH {
        return Err(ProtocolError::NestingTooDeep(depth + 1));
    }
    Ok(())
}
