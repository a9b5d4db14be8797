//! In-memory KV store

use crate::kv::{KvStore, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Process-local KV store
///
/// Used by tests and for ephemeral runs; nothing survives the process.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryKvStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    fn scan(&self, prefix: &str) -> Vec<(String, Value)> {
        self.entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Value>> {
        Ok(self.scan(prefix).into_iter().map(|(_, v)| v).collect())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self.scan(prefix).into_iter().map(|(k, _)| k).collect())
    }

    async fn entries_by_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        Ok(self.scan(prefix))
    }

    async fn del_by_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}
