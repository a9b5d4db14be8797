//! Redb table definitions for the durable KV store.

use redb::TableDefinition;

// Key: full namespaced key (e.g. "user:id:abc"), Value: JSON bytes
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");
