//! Rank calculation
//!
//! A partner's rank is the depth of its deepest downline branch: 0 for a
//! partner with no recruits, otherwise one more than the highest-ranked
//! direct recruit. Ranks are cached under `rank:user:{id}` without expiry
//! and invalidated explicitly when the graph below a partner changes.

use crate::telemetry;
use referral_common::{Partner, Result};
use referral_store::Repository;
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// One partner on the current traversal path
struct Frame {
    id: String,
    children: std::vec::IntoIter<String>,
    deepest: Option<u32>,
}

impl Frame {
    fn new(id: String, partner: &Partner) -> Self {
        let children: Vec<String> = partner.valid_team().map(str::to_string).collect();
        Self {
            id,
            children: children.into_iter(),
            deepest: None,
        }
    }

    fn record(&mut self, child_depth: u32) {
        self.deepest = Some(self.deepest.map_or(child_depth, |d| d.max(child_depth)));
    }

    fn depth(&self) -> u32 {
        self.deepest.map_or(0, |d| d.saturating_add(1))
    }
}

fn record_on_top(stack: &mut [Frame], depth: u32) {
    if let Some(top) = stack.last_mut() {
        top.record(depth);
    }
}

/// Computes, caches and invalidates partner ranks
#[derive(Clone)]
pub struct RankCalculator {
    repo: Repository,
    max_upline_hops: usize,
}

impl RankCalculator {
    /// Create a calculator; `max_upline_hops` caps upward rank propagation
    pub fn new(repo: Repository, max_upline_hops: usize) -> Self {
        Self {
            repo,
            max_upline_hops,
        }
    }

    /// Depth of the downline below `partner_id`.
    ///
    /// `visited` holds ids already on the path above this partner. Only the
    /// current path is guarded: siblings may share descendants and each
    /// sees them afresh. A partner met again on its own path contributes 0
    /// and ends that branch; a missing partner is a leaf. Administrative
    /// accounts rank 0 but are walked through as anyone's recruit.
    ///
    /// Walks with an explicit stack, so deep chains cannot exhaust the
    /// call stack.
    pub async fn compute_depth(&self, partner_id: &str, visited: &HashSet<String>) -> Result<u32> {
        if visited.contains(partner_id) {
            warn!("Cycle in recruitment graph at '{}'", partner_id);
            telemetry::record_cycle();
            return Ok(0);
        }
        let Some(root) = self.repo.get_partner(partner_id).await? else {
            return Ok(0);
        };
        if root.is_admin {
            return Ok(0);
        }

        let mut on_path = visited.clone();
        on_path.insert(partner_id.to_string());
        let mut stack = vec![Frame::new(partner_id.to_string(), &root)];

        loop {
            let next = match stack.last_mut() {
                Some(top) => top.children.next(),
                None => return Ok(0),
            };
            match next {
                Some(child) => {
                    if on_path.contains(&child) {
                        warn!("Cycle in recruitment graph at '{}'", child);
                        telemetry::record_cycle();
                        record_on_top(&mut stack, 0);
                        continue;
                    }
                    match self.repo.get_partner(&child).await? {
                        Some(partner) => {
                            let frame = Frame::new(child.clone(), &partner);
                            on_path.insert(child);
                            stack.push(frame);
                        }
                        None => record_on_top(&mut stack, 0),
                    }
                }
                None => {
                    let Some(done) = stack.pop() else {
                        return Ok(0);
                    };
                    on_path.remove(&done.id);
                    let depth = done.depth();
                    if stack.is_empty() {
                        return Ok(depth);
                    }
                    record_on_top(&mut stack, depth);
                }
            }
        }
    }

    /// Fresh rank for `partner_id`; any failure is logged and reads as 0.
    pub async fn calculate_user_rank(&self, partner_id: &str) -> u32 {
        match self.compute_depth(partner_id, &HashSet::new()).await {
            Ok(rank) => rank,
            Err(e) => {
                error!("Failed to calculate rank for '{}': {}", partner_id, e);
                0
            }
        }
    }

    /// Recompute the rank and persist it into both the partner record and
    /// the rank cache. Returns 0 without writing if the partner is missing
    /// or administrative.
    pub async fn update_user_rank(&self, partner_id: &str) -> u32 {
        self.refresh(partner_id).await.map_or(0, |(rank, _)| rank)
    }

    /// Update `partner_id` and then each sponsor above it, following at
    /// most `max_upline_hops` sponsor links. Returns how many partners were
    /// updated.
    pub async fn update_upline_ranks(&self, partner_id: &str) -> usize {
        let mut current = Some(partner_id.to_string());
        let mut updated = 0;
        let mut hops = 0;

        while let Some(id) = current.take() {
            let Some((_, partner)) = self.refresh(&id).await else {
                break;
            };
            updated += 1;

            let Some(sponsor) = partner.sponsor() else {
                break;
            };
            if hops == self.max_upline_hops {
                warn!(
                    "Upline walk from '{}' stopped after {} hops at '{}'",
                    partner_id, hops, id
                );
                break;
            }
            hops += 1;
            current = Some(sponsor.to_string());
        }

        debug!("Updated {} upline ranks from '{}'", updated, partner_id);
        updated
    }

    /// Rank for `partner_id`, served from the cache when `use_cache` is set
    /// and an entry exists (a cached 0 is a hit). Fresh values are cached.
    pub async fn get_user_rank(&self, partner_id: &str, use_cache: bool) -> u32 {
        if use_cache {
            match self.repo.get_rank_cache(partner_id).await {
                Ok(Some(rank)) => {
                    debug!("Rank cache hit for '{}': {}", partner_id, rank);
                    return rank;
                }
                Ok(None) => {}
                Err(e) => warn!("Rank cache read failed for '{}': {}", partner_id, e),
            }
        }

        let rank = match self.compute_depth(partner_id, &HashSet::new()).await {
            Ok(rank) => rank,
            Err(e) => {
                error!("Failed to calculate rank for '{}': {}", partner_id, e);
                return 0;
            }
        };
        if let Err(e) = self.repo.set_rank_cache(partner_id, rank).await {
            warn!("Failed to cache rank for '{}': {}", partner_id, e);
        }
        rank
    }

    /// Drop the cached rank of `partner_id` and of every sponsor above it.
    /// Stops when a sponsor repeats. Returns the ids whose entries were
    /// dropped, starting with `partner_id`.
    pub async fn invalidate_rank_cache(&self, partner_id: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(partner_id.to_string());

        while let Some(id) = current.take() {
            if !visited.insert(id.clone()) {
                warn!("Cycle in sponsor chain at '{}'", id);
                telemetry::record_cycle();
                break;
            }
            if let Err(e) = self.repo.delete_rank_cache(&id).await {
                warn!("Failed to invalidate rank cache for '{}': {}", id, e);
            }
            current = match self.repo.get_partner(&id).await {
                Ok(partner) => partner.and_then(|p| p.sponsor().map(str::to_string)),
                Err(e) => {
                    warn!("Failed to load '{}' while invalidating ranks: {}", id, e);
                    None
                }
            };
            chain.push(id);
        }

        chain
    }

    /// Recompute and persist one partner's rank, returning it with the
    /// updated record
    async fn refresh(&self, partner_id: &str) -> Option<(u32, Partner)> {
        let mut partner = match self.repo.get_partner(partner_id).await {
            Ok(Some(partner)) => partner,
            Ok(None) => {
                warn!("Cannot update rank: partner '{}' not found", partner_id);
                return None;
            }
            Err(e) => {
                error!("Cannot update rank for '{}': {}", partner_id, e);
                return None;
            }
        };

        if partner.is_admin {
            debug!("Skipping rank write for administrative account '{}'", partner_id);
            return Some((0, partner));
        }

        let rank = self.calculate_user_rank(partner_id).await;
        partner.rank = rank;
        if let Err(e) = self.repo.put_partner(&partner).await {
            error!("Failed to persist rank for '{}': {}", partner_id, e);
        }
        if let Err(e) = self.repo.set_rank_cache(partner_id, rank).await {
            warn!("Failed to cache rank for '{}': {}", partner_id, e);
        }
        Some((rank, partner))
    }
}
