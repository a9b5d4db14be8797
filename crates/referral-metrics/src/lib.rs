//! Referral Metrics - rank and performance figures for partner graphs
//!
//! This crate provides:
//! - [`RankCalculator`]: maximum downline depth per partner, cached, with
//!   upline propagation and invalidation
//! - [`MetricsAggregator`]: composite per-partner snapshots (rank, team
//!   size, sales) with time-based freshness and bulk recomputation
//!
//! The recruitment graph is expected to be a forest but is never trusted to
//! be one: every traversal guards the current path and terminates on cyclic
//! or dangling data.
//!
//! # Example
//!
//! ```rust,ignore
//! use referral_common::MetricsConfig;
//! use referral_metrics::MetricsAggregator;
//! use referral_store::{MemoryKvStore, Repository};
//! use std::sync::Arc;
//!
//! let repo = Repository::new(Arc::new(MemoryKvStore::new()));
//! let engine = MetricsAggregator::new(repo, MetricsConfig::default());
//! let snapshot = engine.get_user_metrics("partner-1").await?;
//! let summary = engine.recalculate_all_metrics().await;
//! ```

pub mod aggregator;
pub mod rank;
pub mod sales;
pub mod team;
pub mod telemetry;

pub use aggregator::{MetricsAggregator, Population, RecalculateSummary};
pub use rank::RankCalculator;
pub use sales::SalesSummary;
pub use team::total_team_size;
