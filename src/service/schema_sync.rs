//! Type library replication.
//!
//! Node schemas are Object properties keyed by their `name` field. The server
//! pushes its whole library to each client on connect; a client replaces its
//! local library with whatever it receives.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::core::property::{Property, PropertyMap};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::Listener;
use crate::protocol::endpoint::Endpoint;
use crate::protocol::message::{Payload, SchemaSyncPacket};
use crate::transport::PeerId;

const NAME: &str = "name";

/// Source and sink for node type schemas.
pub trait TypeLibrary: Send + Sync {
    /// Load schema files from `path` (a file or a directory). Returns how many
    /// schemas were loaded.
    fn load_path(&self, path: &Path) -> Result<usize>;

    /// Load schemas already in property form.
    fn load_properties(&self, schemas: Vec<Property>) -> Result<usize>;

    fn clear(&self) -> Result<()>;

    fn count(&self) -> usize;

    /// Every loaded schema, in name order.
    fn schemas(&self) -> Result<Vec<Property>>;
}

/// In-memory library that reads TOML schema files.
#[derive(Debug, Default)]
pub struct MemoryTypeLibrary {
    schemas: RwLock<BTreeMap<String, Property>>,
}

impl MemoryTypeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Result<Option<Property>> {
        Ok(self
            .schemas
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LIBRARY_LOCK))?
            .get(name)
            .cloned())
    }

    fn insert(&self, schema: Property) -> Result<()> {
        let name = schema.get::<String>(NAME)?.clone();
        self.schemas
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LIBRARY_LOCK))?
            .insert(name, schema);
        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        let table = toml::from_str::<toml::Table>(&text).map_err(|e| {
            ProtocolError::ConfigError(format!("Failed to parse schema {}: {e}", path.display()))
        })?;

        let mut schema = from_toml_table(table);
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            schema.ensure(NAME, || Property::literal(stem.to_string()))?;
        }
        self.insert(schema)
    }
}

impl TypeLibrary for MemoryTypeLibrary {
    fn load_path(&self, path: &Path) -> Result<usize> {
        if path.is_file() {
            self.load_file(path)?;
            return Ok(1);
        }

        let mut files: Vec<_> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for file in &files {
            self.load_file(file)?;
        }
        info!(path = %path.display(), count = files.len(), "Loaded type library");
        Ok(files.len())
    }

    fn load_properties(&self, schemas: Vec<Property>) -> Result<usize> {
        let count = schemas.len();
        for schema in schemas {
            self.insert(schema)?;
        }
        Ok(count)
    }

    fn clear(&self) -> Result<()> {
        self.schemas
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LIBRARY_LOCK))?
            .clear();
        Ok(())
    }

    fn count(&self) -> usize {
        self.schemas.read().map(|s| s.len()).unwrap_or(0)
    }

    fn schemas(&self) -> Result<Vec<Property>> {
        Ok(self
            .schemas
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LIBRARY_LOCK))?
            .values()
            .cloned()
            .collect())
    }
}

fn from_toml_table(table: toml::Table) -> Property {
    let map: PropertyMap = table
        .into_iter()
        .map(|(key, value)| (key, from_toml(value)))
        .collect();
    Property::Object(map)
}

fn from_toml(value: toml::Value) -> Property {
    match value {
        toml::Value::String(s) => Property::literal(s),
        toml::Value::Integer(i) => Property::literal(i),
        toml::Value::Float(f) => Property::literal(f),
        toml::Value::Boolean(b) => Property::literal(b),
        toml::Value::Datetime(d) => Property::literal(d.to_string()),
        toml::Value::Array(items) => Property::List(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => from_toml_table(table),
    }
}

/// Pushes the server's library on connect and installs it on clients.
pub struct SchemaSyncListener {
    library: Arc<dyn TypeLibrary>,
}

impl SchemaSyncListener {
    pub fn new(library: Arc<dyn TypeLibrary>) -> Self {
        Self { library }
    }
}

impl Listener for SchemaSyncListener {
    fn name(&self) -> &'static str {
        "schema-sync"
    }

    fn on_connect(&self, endpoint: &Endpoint, peer: PeerId) -> Result<()> {
        if !endpoint.is_server() {
            return Ok(());
        }
        let schemas = self.library.schemas()?;
        debug!(peer = %peer, count = schemas.len(), "Pushing type library");
        endpoint.send(&SchemaSyncPacket { schemas }.into(), peer)
    }

    fn on_packet(&self, endpoint: &Endpoint, packet: &Payload, from: PeerId) -> Result<()> {
        match packet {
            Payload::SchemaSync(sync) => {
                if endpoint.is_server() {
                    warn!(peer = %from, "Ignoring type library pushed by a client");
                    return Ok(());
                }
                self.library.clear()?;
                let count = self.library.load_properties(sync.schemas.clone())?;
                info!(peer = %from, count, "Installed type library from server");
                Ok(())
            }
            Payload::Heartbeat(_)
            | Payload::Disconnect(_)
            | Payload::GraphListRequest(_)
            | Payload::GraphListResponse(_)
            | Payload::GraphUpdate(_)
            | Payload::GraphDelete(_) => Ok(()),
        }
    }
}
