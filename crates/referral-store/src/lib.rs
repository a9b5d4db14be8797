//! Referral Store - key-value persistence for the metrics engine
//!
//! The engine only needs get/set/delete/prefix-scan over JSON values. This
//! crate defines that contract, ships an in-memory and a redb-backed
//! implementation, and wraps both in a [`Repository`] with typed accessors
//! for each key namespace.

pub mod disk;
pub mod kv;
pub mod memory;
pub mod repository;
mod tables;

// Re-exports
pub use disk::RedbKvStore;
pub use kv::{KvStore, StoreError, StoreResult};
pub use memory::MemoryKvStore;
pub use repository::Repository;
