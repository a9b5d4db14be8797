//! Configuration types for the referral metrics engine
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store configuration
    pub store: StoreConfig,
    /// Metrics engine configuration
    pub metrics: MetricsConfig,
}

/// Which KV backend to open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map, lost on exit
    #[default]
    Memory,
    /// Durable redb database file
    Redb,
}

/// Backing store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind
    pub backend: StoreBackend,
    /// Database file (redb backend only)
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("/var/lib/referral/kv.redb"),
        }
    }
}

/// Rank and metrics computation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How long a cached metrics snapshot is served without recomputation
    pub snapshot_ttl_secs: u64,
    /// Trailing window used for order count and average order value
    pub sales_window_secs: u64,
    /// Partners processed concurrently per batch during a bulk sweep
    pub batch_size: usize,
    /// Maximum sponsors visited when propagating rank updates upward
    pub max_upline_hops: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 60 * 60,           // 1 hour
            sales_window_secs: 30 * 24 * 60 * 60, // 30 days
            batch_size: 20,
            max_upline_hops: 100,
        }
    }
}

impl MetricsConfig {
    /// Snapshot freshness window
    #[must_use]
    pub const fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    /// Trailing sales window
    #[must_use]
    pub const fn sales_window(&self) -> Duration {
        Duration::from_secs(self.sales_window_secs)
    }

    /// Batch size, never zero
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
