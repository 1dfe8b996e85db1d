//! State store - last-known attributes per node
//!
//! The store is read at plan time and written at apply time, always one
//! node record at a time. Implementations only need per-record mutual
//! exclusion: independent nodes never touch each other's records.

use crate::error::StateError;
use crate::types::NodeId;
use crate::value::{Attributes, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// What the store remembers about one applied node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Resolved attributes as last applied
    pub attributes: Attributes,
    /// Provider-assigned fields returned by the last apply
    #[serde(default)]
    pub outputs: Attributes,
    /// Nodes this one depended on when last applied
    ///
    /// Kept so a node that is no longer declared can still be torn down
    /// after its dependents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<NodeId>,
}

impl NodeRecord {
    pub fn new(attributes: Attributes, outputs: Attributes) -> Self {
        Self {
            attributes,
            outputs,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<NodeId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Look up a referenced field: provider outputs win over attributes
    pub fn lookup(&self, field: &str) -> Option<&Value> {
        let (head, rest) = match field.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (field, None),
        };
        let value = self.outputs.get(head).or_else(|| self.attributes.get(head))?;
        match rest {
            Some(path) => value.lookup(path),
            None => Some(value),
        }
    }
}

/// Backend holding one record per node
pub trait StateStore: Send + Sync {
    /// Last recorded state of a node, if any
    fn get(&self, id: &NodeId) -> Result<Option<NodeRecord>, StateError>;

    /// Record the state of a node after a successful apply
    fn put(&self, id: &NodeId, record: NodeRecord) -> Result<(), StateError>;

    /// Forget a node (after teardown)
    fn remove(&self, id: &NodeId) -> Result<(), StateError>;

    /// All nodes with a record, sorted
    fn ids(&self) -> Result<Vec<NodeId>, StateError>;
}

type Slot = Arc<Mutex<Option<NodeRecord>>>;

/// In-memory store with one lock per node record
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    slots: RwLock<HashMap<NodeId, Slot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from a previous run
    pub fn with_records(records: impl IntoIterator<Item = (NodeId, NodeRecord)>) -> Self {
        let slots = records
            .into_iter()
            .map(|(id, record)| (id, Arc::new(Mutex::new(Some(record)))))
            .collect();
        Self {
            slots: RwLock::new(slots),
        }
    }

    fn slot(&self, id: &NodeId) -> Slot {
        let existing = match self.slots.read() {
            Ok(slots) => slots.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        };
        if let Some(slot) = existing {
            return slot;
        }

        let mut slots = match self.slots.write() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(id.clone()).or_default())
    }
}

fn lock(slot: &Mutex<Option<NodeRecord>>) -> MutexGuard<'_, Option<NodeRecord>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, id: &NodeId) -> Result<Option<NodeRecord>, StateError> {
        let slot = self.slot(id);
        let guard = lock(&slot);
        Ok(guard.clone())
    }

    fn put(&self, id: &NodeId, record: NodeRecord) -> Result<(), StateError> {
        let slot = self.slot(id);
        *lock(&slot) = Some(record);
        log::trace!("Recorded state for {id}");
        Ok(())
    }

    fn remove(&self, id: &NodeId) -> Result<(), StateError> {
        let slot = self.slot(id);
        *lock(&slot) = None;
        Ok(())
    }

    fn ids(&self) -> Result<Vec<NodeId>, StateError> {
        let slots = match self.slots.read() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ids: Vec<NodeId> = slots
            .iter()
            .filter(|(_, slot)| lock(slot).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, value: &str) -> NodeRecord {
        let mut attributes = Attributes::new();
        attributes.insert(key.into(), Value::from(value));
        NodeRecord::new(attributes, Attributes::new())
    }

    #[test]
    fn test_put_get_remove() {
        let store = MemoryStateStore::new();
        let id = NodeId::new("storage_account", "s");

        assert_eq!(store.get(&id).unwrap(), None);
        store.put(&id, record("sku", "Standard_LRS")).unwrap();
        assert_eq!(store.get(&id).unwrap(), Some(record("sku", "Standard_LRS")));
        assert_eq!(store.ids().unwrap(), vec![id.clone()]);

        store.remove(&id).unwrap();
        assert_eq!(store.get(&id).unwrap(), None);
        assert!(store.ids().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_writes_to_independent_nodes() {
        let store = Arc::new(MemoryStateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = NodeId::new("compute", format!("c{i}"));
                    store.put(&id, record("index", &i.to_string())).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.ids().unwrap().len(), 8);
        let c3 = store.get(&NodeId::new("compute", "c3")).unwrap().unwrap();
        assert_eq!(c3.attributes["index"], Value::from("3"));
    }

    #[test]
    fn test_lookup_prefers_outputs() {
        let mut outputs = Attributes::new();
        outputs.insert("id".into(), Value::from("/generated/id"));
        let mut attributes = Attributes::new();
        attributes.insert("id".into(), Value::from("declared"));
        attributes.insert("sku".into(), Value::from("basic"));
        let rec = NodeRecord::new(attributes, outputs);

        assert_eq!(rec.lookup("id"), Some(&Value::from("/generated/id")));
        assert_eq!(rec.lookup("sku"), Some(&Value::from("basic")));
        assert_eq!(rec.lookup("missing"), None);
    }

    #[test]
    fn test_record_dependencies_are_optional_in_json() {
        let legacy: NodeRecord =
            serde_json::from_str(r#"{"attributes":{"sku":"basic"}}"#).unwrap();
        assert!(legacy.dependencies.is_empty());
        assert!(!serde_json::to_string(&legacy).unwrap().contains("dependencies"));

        let rec = record("sku", "basic")
            .with_dependencies(vec![NodeId::new("storage_account", "s")]);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains(r#""dependencies":["storage_account.s"]"#));
        assert_eq!(serde_json::from_str::<NodeRecord>(&json).unwrap(), rec);
    }
}
