//! Per-partner metrics snapshots
//!
//! A snapshot merges rank, team size and sales figures. Snapshots are cached
//! under `user_metrics:{id}` and served until they are older than the
//! configured TTL. Each figure is computed independently: one failing
//! degrades to 0 without affecting the others.

use crate::rank::RankCalculator;
use crate::sales::SalesSummary;
use crate::team::total_team_size;
use crate::telemetry;
use chrono::Utc;
use futures::future::join_all;
use referral_common::{Error, MetricsConfig, MetricsSnapshot, Order, Partner, Result};
use referral_store::Repository;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Every partner and order, loaded once and shared across a bulk sweep
#[derive(Debug, Clone, Default)]
pub struct Population {
    /// Partners indexed by id
    pub partners: HashMap<String, Partner>,
    /// All orders
    pub orders: Vec<Order>,
}

impl Population {
    /// Build from loaded records
    pub fn new(partners: Vec<Partner>, orders: Vec<Order>) -> Self {
        Self {
            partners: partners.into_iter().map(|p| (p.id.clone(), p)).collect(),
            orders,
        }
    }

    /// Scan every partner and order from the store
    pub async fn load(repo: &Repository) -> Result<Self> {
        let partners = repo.list_partners().await?;
        let orders = repo.list_orders().await?;
        Ok(Self::new(partners, orders))
    }
}

/// Outcome of a bulk recompute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecalculateSummary {
    /// The sweep ran to completion
    pub success: bool,
    /// Partners whose snapshot was recomputed
    pub updated: usize,
    /// Partners whose recomputation failed
    pub errors: usize,
}

/// Computes and caches metrics snapshots
pub struct MetricsAggregator {
    repo: Repository,
    ranks: RankCalculator,
    config: MetricsConfig,
}

impl MetricsAggregator {
    /// Create an aggregator over `repo`
    pub fn new(repo: Repository, config: MetricsConfig) -> Self {
        let ranks = RankCalculator::new(repo.clone(), config.max_upline_hops);
        Self {
            repo,
            ranks,
            config,
        }
    }

    /// Rank calculator sharing this aggregator's store
    #[must_use]
    pub const fn ranks(&self) -> &RankCalculator {
        &self.ranks
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Compute, cache and return a fresh snapshot for `partner_id`.
    ///
    /// `population` amortises loading across a bulk sweep; without it the
    /// full partner and order sets are scanned. A missing partner is an
    /// error. Administrative accounts get an all-zero snapshot.
    pub async fn calculate_and_cache_user_metrics(
        &self,
        partner_id: &str,
        population: Option<&Population>,
    ) -> Result<MetricsSnapshot> {
        let partner = self
            .repo
            .get_partner(partner_id)
            .await?
            .ok_or_else(|| Error::PartnerNotFound(partner_id.to_string()))?;
        let now = Utc::now();

        if partner.is_admin {
            let snapshot = MetricsSnapshot::zeroed(partner_id, now);
            self.repo.set_metrics_cache(&snapshot).await?;
            return Ok(snapshot);
        }

        let rank = self.ranks.get_user_rank(partner_id, true).await;

        let total_team_size = match self.team_size(&partner, population).await {
            Ok(size) => size,
            Err(e) => {
                error!("Failed to compute team size for '{}': {}", partner_id, e);
                0
            }
        };

        let sales = match self.sales(partner_id, population, now).await {
            Ok(sales) => sales,
            Err(e) => {
                error!("Failed to compute sales for '{}': {}", partner_id, e);
                SalesSummary::default()
            }
        };

        let snapshot = MetricsSnapshot {
            partner_id: partner_id.to_string(),
            rank,
            direct_team_size: partner.valid_team().count() as u64,
            total_team_size,
            personal_sales: sales.personal_sales,
            team_sales: 0.0,
            order_count: sales.order_count,
            average_order_value: sales.average_order_value,
            computed_at: now,
        };

        self.repo.set_metrics_cache(&snapshot).await?;
        telemetry::record_metrics_computed();
        debug!("Cached metrics for '{}'", partner_id);
        Ok(snapshot)
    }

    /// Cached snapshot if younger than the TTL, otherwise a fresh one
    pub async fn get_user_metrics(&self, partner_id: &str) -> Result<MetricsSnapshot> {
        match self.repo.get_metrics_cache(partner_id).await {
            Ok(Some(snapshot)) if snapshot.is_fresh(Utc::now(), self.config.snapshot_ttl()) => {
                debug!("Metrics cache hit for '{}'", partner_id);
                return Ok(snapshot);
            }
            Ok(_) => {}
            Err(e) => warn!("Metrics cache read failed for '{}': {}", partner_id, e),
        }
        self.calculate_and_cache_user_metrics(partner_id, None).await
    }

    /// Recompute every non-administrative partner's snapshot.
    ///
    /// Partners run concurrently within a batch and batches run one after
    /// another, bounding outstanding store requests. A failing partner is
    /// logged and counted; the sweep carries on. Listing caches are dropped
    /// afterwards.
    pub async fn recalculate_all_metrics(&self) -> RecalculateSummary {
        let started = Instant::now();
        let population = match Population::load(&self.repo).await {
            Ok(population) => population,
            Err(e) => {
                error!("Bulk recompute aborted, cannot load population: {}", e);
                return RecalculateSummary::default();
            }
        };

        let mut targets: Vec<&str> = population
            .partners
            .values()
            .filter(|p| !p.is_admin)
            .map(|p| p.id.as_str())
            .collect();
        targets.sort_unstable();

        let batch_size = self.config.effective_batch_size();
        info!(
            "Recomputing metrics for {} partners in batches of {}",
            targets.len(),
            batch_size
        );

        let population = &population;
        let mut summary = RecalculateSummary {
            success: true,
            ..RecalculateSummary::default()
        };
        for batch in targets.chunks(batch_size) {
            let results = join_all(batch.iter().map(|id| async move {
                (
                    *id,
                    self.calculate_and_cache_user_metrics(id, Some(population))
                        .await,
                )
            }))
            .await;

            for (id, result) in results {
                match result {
                    Ok(_) => summary.updated += 1,
                    Err(e) => {
                        error!("Failed to recompute metrics for '{}': {}", id, e);
                        summary.errors += 1;
                    }
                }
            }
        }

        if let Err(e) = self.invalidate_page_cache().await {
            warn!("Failed to invalidate listing caches after recompute: {}", e);
        }

        let elapsed = started.elapsed();
        telemetry::record_sweep(summary.errors, elapsed);
        info!(
            "Recomputed metrics: {} updated, {} errors in {:?}",
            summary.updated, summary.errors, elapsed
        );
        summary
    }

    /// Drop one partner's cached snapshot
    pub async fn invalidate_user_metrics(&self, partner_id: &str) -> Result<()> {
        self.repo.delete_metrics_cache(partner_id).await
    }

    /// Drop every cached listing page and the full-listing cache
    pub async fn invalidate_page_cache(&self) -> Result<usize> {
        self.repo.invalidate_page_cache().await
    }

    /// Refresh derived state after `partner_id`'s team changed: ranks and
    /// snapshots of the partner and its whole upline, then listing caches.
    pub async fn on_team_changed(&self, partner_id: &str) -> Result<()> {
        let chain = self.ranks.invalidate_rank_cache(partner_id).await;
        for id in &chain {
            self.invalidate_user_metrics(id).await?;
        }
        let updated = self.ranks.update_upline_ranks(partner_id).await;
        self.invalidate_page_cache().await?;
        debug!(
            "Team change at '{}': {} snapshots dropped, {} ranks refreshed",
            partner_id,
            chain.len(),
            updated
        );
        Ok(())
    }

    /// Drop derived state after an order was recorded for `buyer_id`
    pub async fn on_order_recorded(&self, buyer_id: &str) -> Result<()> {
        self.invalidate_user_metrics(buyer_id).await?;
        self.invalidate_page_cache().await?;
        Ok(())
    }

    async fn team_size(&self, partner: &Partner, population: Option<&Population>) -> Result<u64> {
        if let Some(population) = population {
            return Ok(total_team_size(partner, &population.partners));
        }
        let partners = Population::new(self.repo.list_partners().await?, Vec::new()).partners;
        Ok(total_team_size(partner, &partners))
    }

    async fn sales(
        &self,
        partner_id: &str,
        population: Option<&Population>,
        now: chrono::DateTime<Utc>,
    ) -> Result<SalesSummary> {
        let window = self.config.sales_window();
        if let Some(population) = population {
            return Ok(SalesSummary::compute(partner_id, &population.orders, now, window));
        }
        let orders = self.repo.list_orders().await?;
        Ok(SalesSummary::compute(partner_id, &orders, now, window))
    }
}
