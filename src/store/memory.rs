use super::{Collection, DocumentStore, Filter};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// In-memory [`DocumentStore`]. Reads see every completed write; results are
/// ordered by document id like the SQLite backend.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<T>(
        &self,
        f: impl FnOnce(&mut HashMap<Collection, BTreeMap<String, Value>>) -> T,
    ) -> Result<T> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl DocumentStore for MemoryStore {
    fn put(&self, collection: Collection, id: &str, doc: &Value) -> Result<()> {
        self.with_collections(|c| {
            c.entry(collection).or_default().insert(id.to_string(), doc.clone());
        })
    }

    fn insert_new(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool> {
        self.with_collections(|c| {
            let docs = c.entry(collection).or_default();
            if docs.contains_key(id) {
                false
            } else {
                docs.insert(id.to_string(), doc.clone());
                true
            }
        })
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        self.with_collections(|c| c.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        self.with_collections(|c| {
            c.get(&collection)
                .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
                .unwrap_or_default()
        })
    }
}
