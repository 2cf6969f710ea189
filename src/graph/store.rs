use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::core::property::Property;
use crate::error::{constants, ProtocolError, Result};

/// Graph documents keyed by group and name.
///
/// Shared between the graph sync listener and the host.
#[derive(Debug, Default)]
pub struct GraphStore {
    groups: RwLock<HashMap<String, BTreeMap<String, Property>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&HashMap<String, BTreeMap<String, Property>>) -> T,
    ) -> Result<T> {
        let groups = self
            .groups
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_STORE_LOCK))?;
        Ok(f(&groups))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, BTreeMap<String, Property>>) -> T,
    ) -> Result<T> {
        let mut groups = self
            .groups
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_STORE_LOCK))?;
        Ok(f(&mut groups))
    }

    /// Names in `group`, sorted.
    pub fn list(&self, group: &str) -> Result<Vec<String>> {
        self.read(|groups| {
            groups
                .get(group)
                .map(|graphs| graphs.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn get(&self, group: &str, name: &str) -> Result<Option<Property>> {
        self.read(|groups| groups.get(group).and_then(|graphs| graphs.get(name)).cloned())
    }

    /// Every `(name, graph)` pair in `group`.
    pub fn entries(&self, group: &str) -> Result<Vec<(String, Property)>> {
        self.read(|groups| {
            groups
                .get(group)
                .map(|graphs| {
                    graphs
                        .iter()
                        .map(|(name, graph)| (name.clone(), graph.clone()))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Store `graph`, returning the document it replaced.
    pub fn put(&self, group: &str, name: &str, graph: Property) -> Result<Option<Property>> {
        self.write(|groups| {
            groups
                .entry(group.to_string())
                .or_default()
                .insert(name.to_string(), graph)
        })
    }

    pub fn remove(&self, group: &str, name: &str) -> Result<Option<Property>> {
        self.write(|groups| {
            let graphs = groups.get_mut(group)?;
            let removed = graphs.remove(name);
            if graphs.is_empty() {
                groups.remove(group);
            }
            removed
        })
    }

    /// Drop every graph in `group` whose name is not in `names`.
    pub fn retain(&self, group: &str, names: &[String]) -> Result<Vec<String>> {
        self.write(|groups| {
            let Some(graphs) = groups.get_mut(group) else {
                return Vec::new();
            };
            let stale: Vec<String> = graphs
                .keys()
                .filter(|name| !names.contains(*name))
                .cloned()
                .collect();
            for name in &stale {
                graphs.remove(name);
            }
            stale
        })
    }

    pub fn groups(&self) -> Result<Vec<String>> {
        self.read(|groups| {
            let mut names: Vec<String> = groups.keys().cloned().collect();
            names.sort();
            names
        })
    }

    pub fn len(&self) -> usize {
        self.read(|groups| groups.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
