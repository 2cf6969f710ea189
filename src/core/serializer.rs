//! # Serializer Registry
//!
//! Maps concrete value types to serializer strategies.
//!
//! Lookup order for a type `K`:
//! 1. a serializer registered for exactly `K`;
//! 2. a resolution previously memoized for `K`;
//! 3. a scan, in registration order, for the first serializer bound to a declared
//!    supertype of `K`. The winner is adapted through the declared
//!    [`Subtype`] conversions and memoized for `K`.
//!
//! Every bound type carries an explicit wire name, chosen at registration. Property
//! literals are tagged with that name, never with the Rust type name, so peers built
//! with different toolchains agree on it.
//!
//! The memoization table lives as long as the registry and is never invalidated.
//! Re-registering the serializer of a supertype after one of its subtypes was
//! resolved does not change that subtype's cached resolution.
//!
//! ## Usage
//! ```rust
//! use nodegraph_sync::core::buffer::Buffer;
//! use nodegraph_sync::core::serializer::SerializerRegistry;
//!
//! let registry = SerializerRegistry::with_defaults();
//! let mut out = Buffer::allocate();
//! registry.write(&mut out, &42i32).unwrap();
//!
//! let mut input = Buffer::wrap(&out.finish());
//! assert_eq!(registry.read::<i32>(&mut input).unwrap(), 42);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::buffer::Buffer;
use crate::error::{constants, ProtocolError, Result};

/// Upper bound on supertype chains followed during resolution.
const MAX_LINEAGE_DEPTH: usize = 16;

/// Runtime identity of a serializable type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Rust type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased value held in a property literal.
pub trait Value: Any + fmt::Debug + Send + Sync {
    fn type_key(&self) -> TypeKey;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_value(&self) -> Box<dyn Value>;
    fn eq_value(&self, other: &dyn Value) -> bool;
}

impl<T> Value for T
where
    T: Any + fmt::Debug + Clone + PartialEq + Send + Sync,
{
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_value(&self) -> Box<dyn Value> {
        Box::new(self.clone())
    }

    fn eq_value(&self, other: &dyn Value) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }
}

/// Strongly-typed serializer for `T`.
pub trait Serializer<T>: Send + Sync {
    fn write(&self, buffer: &mut Buffer, value: &T) -> Result<()>;
    fn read(&self, buffer: &mut Buffer) -> Result<T>;
}

/// Serializer built from a pair of plain functions.
pub struct FnSerializer<T> {
    write: fn(&mut Buffer, &T) -> Result<()>,
    read: fn(&mut Buffer) -> Result<T>,
}

impl<T> FnSerializer<T> {
    pub fn new(write: fn(&mut Buffer, &T) -> Result<()>, read: fn(&mut Buffer) -> Result<T>) -> Self {
        Self { write, read }
    }
}

impl<T: Send + Sync> Serializer<T> for FnSerializer<T> {
    fn write(&self, buffer: &mut Buffer, value: &T) -> Result<()> {
        (self.write)(buffer, value)
    }

    fn read(&self, buffer: &mut Buffer) -> Result<T> {
        (self.read)(buffer)
    }
}

/// Declares that `Self` is written on the wire as its supertype `S`.
pub trait Subtype<S>: Sized {
    fn upcast(&self) -> S;
    fn downcast(value: S) -> Result<Self>;
}

/// Serializer operating on type-erased values.
pub trait ErasedSerializer: Send + Sync {
    fn write_value(&self, buffer: &mut Buffer, value: &dyn Value) -> Result<()>;
    fn read_value(&self, buffer: &mut Buffer) -> Result<Box<dyn Value>>;
}

struct Typed<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> ErasedSerializer for Typed<T, S>
where
    T: Value,
    S: Serializer<T>,
{
    fn write_value(&self, buffer: &mut Buffer, value: &dyn Value) -> Result<()> {
        let typed = value
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| ProtocolError::mismatch(TypeKey::of::<T>().name(), value.type_key().name()))?;
        self.inner.write(buffer, typed)
    }

    fn read_value(&self, buffer: &mut Buffer) -> Result<Box<dyn Value>> {
        Ok(Box::new(self.inner.read(buffer)?))
    }
}

/// Adapts a supertype's serializer to one of its subtypes.
struct Upcasting<Sub, Super> {
    inner: Arc<dyn ErasedSerializer>,
    _marker: PhantomData<fn() -> (Sub, Super)>,
}

impl<Sub, Super> ErasedSerializer for Upcasting<Sub, Super>
where
    Sub: Value + Subtype<Super>,
    Super: Value,
{
    fn write_value(&self, buffer: &mut Buffer, value: &dyn Value) -> Result<()> {
        let sub = value
            .as_any()
            .downcast_ref::<Sub>()
            .ok_or_else(|| ProtocolError::mismatch(TypeKey::of::<Sub>().name(), value.type_key().name()))?;
        self.inner.write_value(buffer, &sub.upcast())
    }

    fn read_value(&self, buffer: &mut Buffer) -> Result<Box<dyn Value>> {
        let found = self.inner.read_value(buffer)?;
        let found_name = found.type_key().name();
        let parent = found
            .into_any()
            .downcast::<Super>()
            .map_err(|_| ProtocolError::mismatch(TypeKey::of::<Super>().name(), found_name))?;
        Ok(Box::new(Sub::downcast(*parent)?))
    }
}

type Adapter = fn(Arc<dyn ErasedSerializer>) -> Arc<dyn ErasedSerializer>;

fn adapt<Sub, Super>(inner: Arc<dyn ErasedSerializer>) -> Arc<dyn ErasedSerializer>
where
    Sub: Value + Subtype<Super>,
    Super: Value,
{
    Arc::new(Upcasting::<Sub, Super> {
        inner,
        _marker: PhantomData,
    })
}

#[derive(Clone, Copy)]
struct Parent {
    key: TypeKey,
    adapter: Adapter,
}

/// Registry of serializers, populated once at startup.
pub struct SerializerRegistry {
    exact: HashMap<TypeKey, Arc<dyn ErasedSerializer>>,
    /// Bound types in first-registration order, scanned for supertype fallback.
    order: Vec<TypeKey>,
    parents: HashMap<TypeKey, Vec<Parent>>,
    wire: HashMap<TypeKey, &'static str>,
    names: HashMap<&'static str, TypeKey>,
    resolved: RwLock<HashMap<TypeKey, Arc<dyn ErasedSerializer>>>,
    scans: AtomicU64,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("types", &self.order)
            .field("scans", &self.scan_count())
            .finish()
    }
}

impl SerializerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            order: Vec::new(),
            parents: HashMap::new(),
            wire: HashMap::new(),
            names: HashMap::new(),
            resolved: RwLock::new(HashMap::new()),
            scans: AtomicU64::new(0),
        }
    }

    /// Registry preloaded with the primitive serializers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    fn register_defaults(&mut self) {
        self.register_fn::<bool>("boolean", |b, v| b.write_boolean(*v), |b| b.read_boolean());
        self.register_fn::<i8>("byte", |b, v| b.write_byte(*v), |b| b.read_byte());
        self.register_fn::<i16>("short", |b, v| b.write_short(*v), |b| b.read_short());
        self.register_fn::<i32>("int", |b, v| b.write_int(*v), |b| b.read_int());
        self.register_fn::<i64>("long", |b, v| b.write_long(*v), |b| b.read_long());
        self.register_fn::<f32>("float", |b, v| b.write_float(*v), |b| b.read_float());
        self.register_fn::<f64>("double", |b, v| b.write_double(*v), |b| b.read_double());
        self.register_fn::<String>("string", |b, v| b.write_string(v), |b| b.read_string());
        self.register_fn::<Uuid>("uuid", |b, v| b.write_uuid(*v), |b| b.read_uuid());
    }

    /// Shorthand for registering a [`FnSerializer`].
    pub fn register_fn<T: Value>(
        &mut self,
        name: &'static str,
        write: fn(&mut Buffer, &T) -> Result<()>,
        read: fn(&mut Buffer) -> Result<T>,
    ) {
        self.register::<T, _>(name, FnSerializer::new(write, read));
    }

    /// Bind `serializer` to `T` under the wire name `name`. Last write wins.
    pub fn register<T, S>(&mut self, name: &'static str, serializer: S)
    where
        T: Value,
        S: Serializer<T> + 'static,
    {
        let key = TypeKey::of::<T>();
        let erased: Arc<dyn ErasedSerializer> = Arc::new(Typed::<T, S> {
            inner: serializer,
            _marker: PhantomData,
        });
        if self.exact.insert(key, erased).is_some() {
            warn!(type_name = key.name(), "Serializer re-registered, replacing previous");
        } else {
            self.order.push(key);
        }
        self.bind_name(key, name);
    }

    /// Declare `Sub` as a subtype of `Super` for fallback resolution, tagged `name` on the wire.
    pub fn declare_subtype<Sub, Super>(&mut self, name: &'static str)
    where
        Sub: Value + Subtype<Super>,
        Super: Value,
    {
        let key = TypeKey::of::<Sub>();
        let parent = Parent {
            key: TypeKey::of::<Super>(),
            adapter: adapt::<Sub, Super>,
        };
        let parents = self.parents.entry(key).or_default();
        parents.retain(|p| p.key != parent.key);
        parents.push(parent);
        self.bind_name(key, name);
    }

    fn bind_name(&mut self, key: TypeKey, name: &'static str) {
        if let Some(previous) = self.wire.insert(key, name) {
            if previous != name {
                self.names.remove(previous);
            }
        }
        if let Some(other) = self.names.insert(name, key) {
            if other != key {
                warn!(wire_name = name, "Wire name rebound to another type");
                self.wire.remove(&other);
            }
        }
    }

    /// Resolve the key for a wire name read off the wire.
    pub fn key_by_name(&self, name: &str) -> Option<TypeKey> {
        self.names.get(name).copied()
    }

    /// Wire name bound to `key`.
    pub fn wire_name(&self, key: TypeKey) -> Result<&'static str> {
        self.wire
            .get(&key)
            .copied()
            .ok_or_else(|| ProtocolError::MissingSerializer(key.name().to_string()))
    }

    /// Number of supertype scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Resolve the serializer for `key`.
    pub fn get(&self, key: TypeKey) -> Result<Arc<dyn ErasedSerializer>> {
        if let Some(found) = self.exact.get(&key) {
            return Ok(found.clone());
        }

        {
            let resolved = self
                .resolved
                .read()
                .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_RESOLVED_LOCK))?;
            if let Some(found) = resolved.get(&key) {
                return Ok(found.clone());
            }
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let found = self
            .order
            .iter()
            .find_map(|bound| {
                let chain = self.chain(key, *bound, 0)?;
                let base = self.exact.get(bound)?.clone();
                Some(chain.into_iter().rev().fold(base, |inner, adapter| adapter(inner)))
            })
            .ok_or_else(|| ProtocolError::MissingSerializer(key.name().to_string()))?;

        debug!(type_name = key.name(), "Memoized supertype serializer");
        self.resolved
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_RESOLVED_LOCK))?
            .insert(key, found.clone());
        Ok(found)
    }

    /// Adapters leading from `from` up to `to`, nearest first.
    fn chain(&self, from: TypeKey, to: TypeKey, depth: usize) -> Option<Vec<Adapter>> {
        if depth >= MAX_LINEAGE_DEPTH {
            return None;
        }
        self.parents.get(&from)?.iter().find_map(|parent| {
            if parent.key == to {
                return Some(vec![parent.adapter]);
            }
            let mut rest = self.chain(parent.key, to, depth + 1)?;
            rest.insert(0, parent.adapter);
            Some(rest)
        })
    }

    /// Write `value` using the serializer resolved for its runtime type.
    pub fn write_value(&self, buffer: &mut Buffer, value: &dyn Value) -> Result<()> {
        self.get(value.type_key())?.write_value(buffer, value)
    }

    pub fn read_value(&self, buffer: &mut Buffer, key: TypeKey) -> Result<Box<dyn Value>> {
        self.get(key)?.read_value(buffer)
    }

    pub fn write<T: Value>(&self, buffer: &mut Buffer, value: &T) -> Result<()> {
        self.write_value(buffer, value)
    }

    pub fn read<T: Value>(&self, buffer: &mut Buffer) -> Result<T> {
        let value = self.read_value(buffer, TypeKey::of::<T>())?;
        let found = value.type_key().name();
        value
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| ProtocolError::mismatch(TypeKey::of::<T>().name(), found))
    }
}
