//! Key-value store contract
//!
//! Values are arbitrary JSON records. There are no transactions; every
//! write is an upsert and the last write wins.

use async_trait::async_trait;
use serde_json::Value;

/// Error type for KV store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for referral_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Json(e) => e.into(),
            other => Self::Store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Asynchronous key-value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the value stored under `key`
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Insert or replace the value stored under `key`
    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// All values whose key starts with `prefix`, in key order
    async fn get_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Value>>;

    /// All keys starting with `prefix`, in key order
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// All key/value pairs whose key starts with `prefix`, in key order.
    /// Keys deleted between listing and reading are skipped.
    async fn entries_by_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        let keys = self.keys_with_prefix(prefix).await?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(&key).await? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn del_by_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let keys = self.keys_with_prefix(prefix).await?;
        for key in &keys {
            self.del(key).await?;
        }
        Ok(keys.len())
    }
}
