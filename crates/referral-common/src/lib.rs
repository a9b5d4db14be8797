//! Referral Common - Shared types and utilities
//!
//! This crate provides the partner, order and metrics snapshot records,
//! the key namespace, error definitions and configuration used across
//! all referral components.

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

pub use config::{Config, MetricsConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result};
pub use types::*;
