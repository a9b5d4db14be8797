//! Bulk import of partners and orders from a JSON document
//!
//! ```json
//! { "partners": [{ "id": "a", "team": ["b"] }], "orders": [] }
//! ```

use anyhow::{Context, Result};
use referral_common::{Order, Partner};
use referral_store::Repository;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Contents of an import file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub partners: Vec<Partner>,
    pub orders: Vec<Order>,
}

/// Outcome of an import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub partners: usize,
    pub orders: usize,
    pub skipped: usize,
}

impl SeedFile {
    /// Read and parse an import file
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse '{}'", path.display()))
    }

    /// Write every record. Records with a blank id are skipped.
    pub async fn apply(&self, repo: &Repository) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for partner in &self.partners {
            if partner.id.trim().is_empty() {
                warn!("Skipping partner without an id");
                summary.skipped += 1;
                continue;
            }
            repo.put_partner(partner).await?;
            summary.partners += 1;
        }
        for order in &self.orders {
            if order.id.trim().is_empty() {
                warn!("Skipping order without an id");
                summary.skipped += 1;
                continue;
            }
            repo.put_order(order).await?;
            summary.orders += 1;
        }

        info!(
            "Imported {} partners and {} orders ({} skipped)",
            summary.partners, summary.orders, summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use referral_store::MemoryKvStore;
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_and_apply() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "partners": [
                    {{"id": "a", "team": ["b"], "isAdmin": false}},
                    {{"id": "b", "sponsorId": "a"}},
                    {{"id": "  "}}
                ],
                "orders": [
                    {{"id": "o1", "buyerId": "b", "total": 12.5, "createdAt": "2026-01-02T03:04:05Z"}}
                ]
            }}"#
        )
        .unwrap();

        let seed = SeedFile::read(file.path()).unwrap();
        let repo = Repository::new(Arc::new(MemoryKvStore::new()));
        let summary = seed.apply(&repo).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                partners: 2,
                orders: 1,
                skipped: 1
            }
        );
        let b = repo.get_partner("b").await.unwrap().unwrap();
        assert_eq!(b.sponsor(), Some("a"));
        assert_eq!(repo.list_orders().await.unwrap().len(), 1);
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let seed = SeedFile::read(file.path()).unwrap();
        assert!(seed.partners.is_empty());
        assert!(seed.orders.is_empty());
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SeedFile::read(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
