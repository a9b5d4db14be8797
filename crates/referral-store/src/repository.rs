//! Typed accessors over the shared key namespace
//!
//! Everything above this layer works with [`Partner`], [`Order`] and
//! [`MetricsSnapshot`] values; key formats live in
//! [`referral_common::keys`] and are only touched here.

use crate::kv::KvStore;
use referral_common::{Error, MetricsSnapshot, Order, Partner, Result, is_valid_id, keys};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed view of the KV store used by the rank and metrics engines
#[derive(Clone)]
pub struct Repository {
    kv: Arc<dyn KvStore>,
}

impl Repository {
    /// Wrap a KV store handle
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Underlying KV store
    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    // =========== Partners ===========

    /// Load a partner record. Records that cannot be decoded read as absent.
    pub async fn get_partner(&self, id: &str) -> Result<Option<Partner>> {
        let Some(value) = self.kv.get(&keys::partner(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<Partner>(value) {
            Ok(mut partner) => {
                if !is_valid_id(&partner.id) {
                    partner.id = id.to_string();
                }
                Ok(Some(partner))
            }
            Err(e) => {
                warn!("Malformed partner record '{}': {}", id, e);
                Ok(None)
            }
        }
    }

    /// Insert or replace a partner record
    pub async fn put_partner(&self, partner: &Partner) -> Result<()> {
        if !is_valid_id(&partner.id) {
            return Err(Error::InvalidPartnerId(partner.id.clone()));
        }
        let value = serde_json::to_value(partner)?;
        self.kv.set(&keys::partner(&partner.id), value).await?;
        Ok(())
    }

    /// Every decodable partner record, first occurrence of each id wins.
    /// A record without an id takes it from its key, as in [`Self::get_partner`].
    pub async fn list_partners(&self) -> Result<Vec<Partner>> {
        let entries = self.kv.entries_by_prefix(keys::PARTNER_PREFIX).await?;
        let mut seen = HashSet::new();
        let mut partners = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(mut partner) = decode_scanned::<Partner>(value, "partner") else {
                continue;
            };
            if !is_valid_id(&partner.id) {
                match keys::partner_id(&key).filter(|id| is_valid_id(id)) {
                    Some(id) => partner.id = id.to_string(),
                    None => {
                        debug!("Skipping partner record without id at '{}'", key);
                        continue;
                    }
                }
            }
            if seen.insert(partner.id.clone()) {
                partners.push(partner);
            }
        }
        Ok(partners)
    }

    // =========== Orders ===========

    /// Insert or replace an order record
    pub async fn put_order(&self, order: &Order) -> Result<()> {
        let value = serde_json::to_value(order)?;
        self.kv.set(&keys::order(&order.id), value).await?;
        Ok(())
    }

    /// Every decodable order record
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        let values = self.kv.get_by_prefix(keys::ORDER_PREFIX).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| decode_scanned::<Order>(value, "order"))
            .collect())
    }

    // =========== Rank cache ===========

    /// Cached rank; a malformed entry reads as a miss
    pub async fn get_rank_cache(&self, id: &str) -> Result<Option<u32>> {
        let Some(value) = self.kv.get(&keys::rank(id)).await? else {
            return Ok(None);
        };
        let rank = value.as_u64().and_then(|r| u32::try_from(r).ok());
        if rank.is_none() {
            warn!("Ignoring malformed rank cache entry for '{}': {}", id, value);
        }
        Ok(rank)
    }

    pub async fn set_rank_cache(&self, id: &str, rank: u32) -> Result<()> {
        self.kv.set(&keys::rank(id), Value::from(rank)).await?;
        Ok(())
    }

    pub async fn delete_rank_cache(&self, id: &str) -> Result<()> {
        self.kv.del(&keys::rank(id)).await?;
        Ok(())
    }

    // =========== Metrics cache ===========

    /// Cached metrics snapshot; a malformed entry reads as a miss
    pub async fn get_metrics_cache(&self, id: &str) -> Result<Option<MetricsSnapshot>> {
        let Some(value) = self.kv.get(&keys::metrics(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Ignoring malformed metrics snapshot for '{}': {}", id, e);
                Ok(None)
            }
        }
    }

    pub async fn set_metrics_cache(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let value = serde_json::to_value(snapshot)?;
        self.kv.set(&keys::metrics(&snapshot.partner_id), value).await?;
        Ok(())
    }

    pub async fn delete_metrics_cache(&self, id: &str) -> Result<()> {
        self.kv.del(&keys::metrics(id)).await?;
        Ok(())
    }

    // =========== Listing caches ===========

    /// Drop every cached listing page and the full-listing cache.
    /// Returns the number of keys removed.
    pub async fn invalidate_page_cache(&self) -> Result<usize> {
        let mut removed = self.kv.del_by_prefix(keys::PAGE_PREFIX).await?;
        if self.kv.get(keys::ALL_USERS_LIST).await?.is_some() {
            self.kv.del(keys::ALL_USERS_LIST).await?;
            removed += 1;
        }
        debug!("Invalidated {} listing cache entries", removed);
        Ok(removed)
    }

    // =========== Graph mutations ===========

    /// Place `recruit_id` under `sponsor_id`, keeping both sides of the
    /// edge in step. A recruit moved away from a previous sponsor is
    /// removed from that sponsor's team; the previous sponsor is returned
    /// so callers can refresh its upline too.
    ///
    /// The two or three writes are not atomic.
    pub async fn add_recruit(&self, sponsor_id: &str, recruit_id: &str) -> Result<Option<String>> {
        if sponsor_id == recruit_id {
            return Err(Error::InvalidRelationship(format!(
                "partner '{sponsor_id}' cannot recruit itself"
            )));
        }
        let mut sponsor = self.require_partner(sponsor_id).await?;
        let mut recruit = self.require_partner(recruit_id).await?;

        let previous = recruit
            .sponsor()
            .filter(|prev| *prev != sponsor_id)
            .map(str::to_string);
        if let Some(prev_id) = &previous {
            if let Some(mut prev) = self.get_partner(prev_id).await? {
                prev.team.retain(|id| id != recruit_id);
                self.put_partner(&prev).await?;
            } else {
                warn!("Previous sponsor '{}' of '{}' not found", prev_id, recruit_id);
            }
        }

        if !sponsor.team.iter().any(|id| id == recruit_id) {
            sponsor.team.push(recruit_id.to_string());
            self.put_partner(&sponsor).await?;
        }
        recruit.sponsor_id = Some(sponsor_id.to_string());
        self.put_partner(&recruit).await?;

        Ok(previous)
    }

    /// Detach `recruit_id` from `sponsor_id`'s team. The recruit's sponsor
    /// pointer is cleared only if it still names `sponsor_id`.
    pub async fn remove_recruit(&self, sponsor_id: &str, recruit_id: &str) -> Result<()> {
        let mut sponsor = self.require_partner(sponsor_id).await?;
        let before = sponsor.team.len();
        sponsor.team.retain(|id| id != recruit_id);
        if sponsor.team.len() != before {
            self.put_partner(&sponsor).await?;
        }

        if let Some(mut recruit) = self.get_partner(recruit_id).await?
            && recruit.sponsor() == Some(sponsor_id)
        {
            recruit.sponsor_id = None;
            self.put_partner(&recruit).await?;
        }
        Ok(())
    }

    /// Move `partner_id` under `new_sponsor_id`; returns the previous sponsor
    pub async fn relocate(&self, partner_id: &str, new_sponsor_id: &str) -> Result<Option<String>> {
        self.add_recruit(new_sponsor_id, partner_id).await
    }

    async fn require_partner(&self, id: &str) -> Result<Partner> {
        self.get_partner(id)
            .await?
            .ok_or_else(|| Error::PartnerNotFound(id.to_string()))
    }
}

/// Decode one value from a prefix scan, logging and skipping failures
fn decode_scanned<T: serde::de::DeserializeOwned>(value: Value, kind: &str) -> Option<T> {
    if !value.is_object() {
        // Index entries (e.g. email -> id) share the prefix
        return None;
    }
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping malformed {} record: {}", kind, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;
    use chrono::Utc;
    use serde_json::json;

    fn repo() -> (Arc<MemoryKvStore>, Repository) {
        let kv = Arc::new(MemoryKvStore::new());
        (kv.clone(), Repository::new(kv))
    }

    #[tokio::test]
    async fn test_partner_roundtrip_and_id_fill() {
        let (kv, repo) = repo();
        kv.set("user:id:a", json!({"team": ["b"]})).await.unwrap();
        let partner = repo.get_partner("a").await.unwrap().unwrap();
        assert_eq!(partner.id, "a");
        assert_eq!(partner.team, vec!["b"]);
        assert!(repo.get_partner("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_partner_reads_as_absent() {
        let (kv, repo) = repo();
        kv.set("user:id:a", json!("not a record")).await.unwrap();
        assert!(repo.get_partner("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_partner_rejects_blank_id() {
        let (_, repo) = repo();
        let result = repo.put_partner(&Partner::new(" ")).await;
        assert!(matches!(result, Err(Error::InvalidPartnerId(_))));
    }

    #[tokio::test]
    async fn test_list_partners_skips_index_entries_and_duplicates() {
        let (kv, repo) = repo();
        repo.put_partner(&Partner::new("a")).await.unwrap();
        repo.put_partner(&Partner::new("b")).await.unwrap();
        kv.set("user:email:a@example.com", json!("a")).await.unwrap();
        kv.set("user:legacy:a", json!({"id": "a"})).await.unwrap();
        kv.set("user:broken", json!({"team": "oops"})).await.unwrap();

        let mut ids: Vec<_> = repo
            .list_partners()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_partners_fills_id_from_key() {
        let (kv, repo) = repo();
        kv.set("user:id:a", json!({"id": "a", "team": ["b"]})).await.unwrap();
        kv.set("user:id:b", json!({"team": ["c"]})).await.unwrap();
        kv.set("user:id:c", json!({"id": "c"})).await.unwrap();
        kv.set("user:orphan", json!({"team": ["a"]})).await.unwrap();

        let partners = repo.list_partners().await.unwrap();
        let ids: Vec<_> = partners.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(partners[1].team, vec!["c"]);
    }

    #[tokio::test]
    async fn test_rank_cache_zero_is_a_hit() {
        let (kv, repo) = repo();
        repo.set_rank_cache("a", 0).await.unwrap();
        assert_eq!(repo.get_rank_cache("a").await.unwrap(), Some(0));
        kv.set("rank:user:b", json!("x")).await.unwrap();
        assert_eq!(repo.get_rank_cache("b").await.unwrap(), None);
        repo.delete_rank_cache("a").await.unwrap();
        assert_eq!(repo.get_rank_cache("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_metrics_cache_roundtrip() {
        let (_, repo) = repo();
        let snapshot = MetricsSnapshot::zeroed("a", Utc::now());
        repo.set_metrics_cache(&snapshot).await.unwrap();
        assert_eq!(repo.get_metrics_cache("a").await.unwrap(), Some(snapshot));
        repo.delete_metrics_cache("a").await.unwrap();
        assert!(repo.get_metrics_cache("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_page_cache() {
        let (kv, repo) = repo();
        kv.set(&keys::page(1, "all", "rank"), json!([])).await.unwrap();
        kv.set(&keys::page(2, "active", "sales"), json!([])).await.unwrap();
        kv.set(keys::ALL_USERS_LIST, json!([])).await.unwrap();
        repo.put_partner(&Partner::new("a")).await.unwrap();

        assert_eq!(repo.invalidate_page_cache().await.unwrap(), 3);
        assert_eq!(kv.len(), 1);
        assert_eq!(repo.invalidate_page_cache().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_recruit_moves_between_sponsors() {
        let (_, repo) = repo();
        repo.put_partner(&Partner::new("old").with_team(["c"])).await.unwrap();
        repo.put_partner(&Partner::new("new")).await.unwrap();
        repo.put_partner(&Partner::new("c").with_sponsor("old")).await.unwrap();

        let previous = repo.relocate("c", "new").await.unwrap();
        assert_eq!(previous.as_deref(), Some("old"));

        let old = repo.get_partner("old").await.unwrap().unwrap();
        let new = repo.get_partner("new").await.unwrap().unwrap();
        let c = repo.get_partner("c").await.unwrap().unwrap();
        assert!(old.team.is_empty());
        assert_eq!(new.team, vec!["c"]);
        assert_eq!(c.sponsor(), Some("new"));

        // Idempotent
        assert_eq!(repo.add_recruit("new", "c").await.unwrap(), None);
        assert_eq!(repo.get_partner("new").await.unwrap().unwrap().team, vec!["c"]);
    }

    #[tokio::test]
    async fn test_add_recruit_rejects_self_and_missing() {
        let (_, repo) = repo();
        repo.put_partner(&Partner::new("a")).await.unwrap();
        assert!(matches!(
            repo.add_recruit("a", "a").await,
            Err(Error::InvalidRelationship(_))
        ));
        assert!(matches!(
            repo.add_recruit("a", "ghost").await,
            Err(Error::PartnerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_recruit() {
        let (_, repo) = repo();
        repo.put_partner(&Partner::new("a").with_team(["b"])).await.unwrap();
        repo.put_partner(&Partner::new("b").with_sponsor("a")).await.unwrap();

        repo.remove_recruit("a", "b").await.unwrap();
        assert!(repo.get_partner("a").await.unwrap().unwrap().team.is_empty());
        assert_eq!(repo.get_partner("b").await.unwrap().unwrap().sponsor_id, None);
    }

    #[tokio::test]
    async fn test_orders_listing() {
        let (kv, repo) = repo();
        repo.put_order(&Order::new("o1", "a", 10.0, Utc::now())).await.unwrap();
        kv.set("order:bad", json!({"id": "bad"})).await.unwrap();
        let orders = repo.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].buyer_id, "a");
    }
}
