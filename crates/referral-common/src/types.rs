//! Core record definitions
//!
//! Partner and order records are owned by the surrounding application and
//! stored as JSON with camelCase field names. They are normalised here, at
//! the store boundary, so the engine never re-validates them at call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// A participant in the recruitment graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    /// Unique partner identifier; filled from the key when absent
    #[serde(default)]
    pub id: String,
    /// Recruiting partner (upline pointer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_id: Option<String>,
    /// Direct recruits (downline pointers), as stored
    #[serde(default, deserialize_with = "deserialize_team")]
    pub team: Vec<String>,
    /// Last computed maximum downline depth
    #[serde(default, deserialize_with = "deserialize_rank")]
    pub rank: u32,
    /// Administrative accounts are excluded from rank and metrics
    #[serde(default, alias = "is_admin")]
    pub is_admin: bool,
    /// Fields owned by other parts of the application, kept on write-back
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Partner {
    /// Create a leaf partner with no sponsor
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sponsor_id: None,
            team: Vec::new(),
            rank: 0,
            is_admin: false,
            extra: Map::new(),
        }
    }

    /// Set the sponsor
    #[must_use]
    pub fn with_sponsor(mut self, sponsor_id: impl Into<String>) -> Self {
        self.sponsor_id = Some(sponsor_id.into());
        self
    }

    /// Set the direct recruits
    #[must_use]
    pub fn with_team<I, S>(mut self, team: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.team = team.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as an administrative account
    #[must_use]
    pub const fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Direct recruits with blank entries dropped
    pub fn valid_team(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.team
            .iter()
            .map(String::as_str)
            .filter(|id| is_valid_id(id))
    }

    /// Sponsor id, if present and non-blank
    #[must_use]
    pub fn sponsor(&self) -> Option<&str> {
        self.sponsor_id.as_deref().filter(|id| is_valid_id(id))
    }
}

/// A partner identifier is usable iff it is non-blank
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.trim().is_empty()
}

/// Keep only string entries of a stored team list. `null` reads as empty.
fn deserialize_team<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(id) => Some(id),
            _ => None,
        })
        .collect())
}

/// Stored ranks are advisory; anything that is not a non-negative integer reads as 0.
fn deserialize_rank<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(raw
        .as_u64()
        .and_then(|rank| u32::try_from(rank).ok())
        .unwrap_or(0))
}

/// A recorded purchase, read-only to this engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order identifier
    pub id: String,
    /// Purchasing partner
    #[serde(alias = "userId")]
    pub buyer_id: String,
    /// Order total
    #[serde(default, alias = "totalAmount")]
    pub total: f64,
    /// When the order was placed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create an order placed at `created_at`
    pub fn new(
        id: impl Into<String>,
        buyer_id: impl Into<String>,
        total: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            buyer_id: buyer_id.into(),
            total,
            created_at: Some(created_at),
        }
    }
}

/// Cached composite performance figures for one partner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub partner_id: String,
    pub rank: u32,
    pub direct_team_size: u64,
    pub total_team_size: u64,
    pub personal_sales: f64,
    /// Not yet computed; always 0. Whether it should cover direct recruits
    /// only or the whole downline is undecided.
    pub team_sales: f64,
    pub order_count: u64,
    pub average_order_value: f64,
    pub computed_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// All-zero snapshot, used for administrative accounts
    pub fn zeroed(partner_id: impl Into<String>, computed_at: DateTime<Utc>) -> Self {
        Self {
            partner_id: partner_id.into(),
            rank: 0,
            direct_team_size: 0,
            total_team_size: 0,
            personal_sales: 0.0,
            team_sales: 0.0,
            order_count: 0,
            average_order_value: 0.0,
            computed_at,
        }
    }

    /// Whether the snapshot was computed less than `ttl` before `now`.
    /// Snapshots stamped in the future are treated as stale.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let Ok(age) = (now - self.computed_at).to_std() else {
            return false;
        };
        age < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde_json::json;

    #[test]
    fn test_partner_decodes_loose_record() {
        let partner: Partner = serde_json::from_value(json!({
            "id": "a",
            "sponsorId": "root",
            "team": ["b", "", 7, null, "c", {"id": "d"}],
            "isAdmin": false,
            "email": "a@example.com"
        }))
        .unwrap();
        assert_eq!(partner.team, vec!["b", "", "c"]);
        assert_eq!(partner.valid_team().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(partner.sponsor(), Some("root"));
        assert_eq!(partner.rank, 0);
        assert_eq!(partner.extra["email"], "a@example.com");
    }

    #[test]
    fn test_partner_null_team_is_empty() {
        let partner: Partner = serde_json::from_value(json!({"id": "a", "team": null})).unwrap();
        assert!(partner.team.is_empty());
        let partner: Partner = serde_json::from_value(json!({"id": "a"})).unwrap();
        assert!(partner.team.is_empty());
    }

    #[test]
    fn test_partner_roundtrip_keeps_foreign_fields() {
        let stored = json!({"id": "a", "team": ["b"], "rank": 3, "isAdmin": true, "name": "Ann"});
        let partner: Partner = serde_json::from_value(stored).unwrap();
        assert!(partner.is_admin);
        let value = serde_json::to_value(&partner).unwrap();
        assert_eq!(value["name"], "Ann");
        assert_eq!(value["rank"], 3);
        assert_eq!(value["isAdmin"], true);
    }

    #[test]
    fn test_malformed_rank_reads_as_zero() {
        let partner: Partner = serde_json::from_value(json!({"id": "a", "rank": -2})).unwrap();
        assert_eq!(partner.rank, 0);
        let partner: Partner = serde_json::from_value(json!({"id": "a", "rank": "high"})).unwrap();
        assert_eq!(partner.rank, 0);
    }

    #[test]
    fn test_valid_team_walks_both_ways() {
        let partner = Partner::new("a").with_team(["b", " ", "c", "", "d"]);
        assert_eq!(partner.valid_team().rev().collect::<Vec<_>>(), vec!["d", "c", "b"]);
    }

    #[test]
    fn test_blank_sponsor_is_none() {
        let partner = Partner::new("a").with_sponsor("  ");
        assert_eq!(partner.sponsor(), None);
    }

    #[test]
    fn test_order_aliases() {
        let order: Order =
            serde_json::from_value(json!({"id": "o1", "userId": "a", "totalAmount": 12.5}))
                .unwrap();
        assert_eq!(order.buyer_id, "a");
        assert!((order.total - 12.5).abs() < f64::EPSILON);
        assert!(order.created_at.is_none());
    }

    #[test]
    fn test_snapshot_freshness() {
        let now = Utc::now();
        let ttl = Duration::from_secs(3600);
        let snapshot = MetricsSnapshot::zeroed("a", now - TimeDelta::minutes(59));
        assert!(snapshot.is_fresh(now, ttl));
        let snapshot = MetricsSnapshot::zeroed("a", now - TimeDelta::minutes(61));
        assert!(!snapshot.is_fresh(now, ttl));
        let snapshot = MetricsSnapshot::zeroed("a", now + TimeDelta::minutes(5));
        assert!(!snapshot.is_fresh(now, ttl));
    }
}
