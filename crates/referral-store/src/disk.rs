//! Durable KV store backed by redb.
//!
//! One table holds every namespace; values are JSON bytes. Each mutation is
//! its own write transaction. redb calls block, so they run on the tokio
//! blocking pool.

use crate::kv::{KvStore, StoreResult};
use crate::tables;
use async_trait::async_trait;
use redb::{Database, ReadableTable};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Durable KV store backed by a redb database file
#[derive(Clone)]
pub struct RedbKvStore {
    db: Arc<Database>,
}

impl RedbKvStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::KV)?;
        }
        write_txn.commit()?;

        debug!("Opened KV database at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn scan(db: &Database, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(tables::KV)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let k = entry.0.value();
            if k.starts_with(prefix) {
                result.push((k.to_string(), entry.1.value().to_vec()));
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl KvStore for RedbKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let key = key.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(tables::KV)?;
            match table.get(key.as_str())? {
                Some(val) => Ok(Some(serde_json::from_slice(val.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let key = key.to_string();
        let bytes = serde_json::to_vec(&value)?;
        self.blocking(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::KV)?;
                table.insert(key.as_str(), bytes.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::KV)?;
                table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .entries_by_prefix(prefix)
            .await?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    async fn entries_by_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        let prefix = prefix.to_string();
        self.blocking(move |db| {
            let mut result = Vec::new();
            for (key, bytes) in Self::scan(db, &prefix)? {
                match serde_json::from_slice(&bytes) {
                    Ok(value) => result.push((key, value)),
                    Err(e) => warn!("Failed to decode value '{}': {}", key, e),
                }
            }
            Ok(result)
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();
        self.blocking(move |db| Ok(Self::scan(db, &prefix)?.into_iter().map(|(k, _)| k).collect()))
            .await
    }

    async fn del_by_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let prefix = prefix.to_string();
        self.blocking(move |db| {
            // Collect keys first (read txn)
            let keys_to_delete: Vec<String> =
                Self::scan(db, &prefix)?.into_iter().map(|(k, _)| k).collect();
            // Delete in write txn
            if !keys_to_delete.is_empty() {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(tables::KV)?;
                    for key in &keys_to_delete {
                        table.remove(key.as_str())?;
                    }
                }
                write_txn.commit()?;
            }
            Ok(keys_to_delete.len())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.redb");
        {
            let store = RedbKvStore::open(&path).unwrap();
            store.set("user:id:a", json!({"id": "a"})).await.unwrap();
            store.set("rank:user:a", json!(2)).await.unwrap();
        }
        let store = RedbKvStore::open(&path).unwrap();
        assert_eq!(store.get("rank:user:a").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbKvStore::open(dir.path().join("kv.redb")).unwrap();
        store.set("users_page:1:all:rank", json!([])).await.unwrap();
        store.set("users_page:2:all:rank", json!([])).await.unwrap();
        store.set("user_metrics:a", json!({})).await.unwrap();

        let keys = store.keys_with_prefix("users_page:").await.unwrap();
        assert_eq!(keys, vec!["users_page:1:all:rank", "users_page:2:all:rank"]);

        assert_eq!(store.del_by_prefix("users_page:").await.unwrap(), 2);
        assert!(store.get_by_prefix("users_page:").await.unwrap().is_empty());
        assert_eq!(store.get_by_prefix("user_metrics:").await.unwrap().len(), 1);
        assert_eq!(
            store.entries_by_prefix("user_metrics:").await.unwrap(),
            vec![("user_metrics:a".to_string(), json!({}))]
        );

        store.del("user_metrics:a").await.unwrap();
        store.del("user_metrics:a").await.unwrap();
        assert_eq!(store.get("user_metrics:a").await.unwrap(), None);
    }
}
