//! Supplier directory sources
//!
//! The directory is read-only reference data; the workflow never writes it.

use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::domain::{Location, Supplier};
use crate::error::WorkflowResult;
use crate::services::cache::{keys, RedisCache};

#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    async fn list_suppliers(&self) -> WorkflowResult<Vec<Supplier>>;
}

/// Directory backed by the `suppliers` table, cached in Redis
#[derive(Clone)]
pub struct PgSupplierDirectory {
    pool: PgPool,
    cache: Option<RedisCache>,
}

impl PgSupplierDirectory {
    pub fn new(pool: PgPool, cache: Option<RedisCache>) -> Self {
        Self { pool, cache }
    }

    /// Drop the cached listing after the table was edited out of band.
    pub async fn invalidate(&self) -> anyhow::Result<()> {
        if let Some(cache) = &self.cache {
            cache.delete(&keys::supplier_directory()).await?;
        }
        Ok(())
    }

    async fn fetch(&self) -> WorkflowResult<Vec<Supplier>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, city, state, categories, max_order_value, certifications
            FROM suppliers
            WHERE active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Supplier {
                id: row.get("id"),
                name: row.get("name"),
                location: Location {
                    city: row.get("city"),
                    state: row.get("state"),
                },
                categories: row.get::<Vec<String>, _>("categories"),
                max_order_value: row.get::<Decimal, _>("max_order_value"),
                certifications: row.get::<Vec<String>, _>("certifications"),
            })
            .collect())
    }
}

#[async_trait]
impl SupplierDirectory for PgSupplierDirectory {
    #[instrument(skip(self))]
    async fn list_suppliers(&self) -> WorkflowResult<Vec<Supplier>> {
        let key = keys::supplier_directory();

        if let Some(cache) = &self.cache {
            if let Some(suppliers) = cache.get::<Vec<Supplier>>(&key).await {
                return Ok(suppliers);
            }
        }

        let suppliers = self.fetch().await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &suppliers).await {
                tracing::warn!(error = %e, "Failed to cache supplier directory");
            }
        }

        tracing::debug!(suppliers = suppliers.len(), "Supplier directory loaded");
        Ok(suppliers)
    }
}

/// Fixed supplier list
#[derive(Debug, Clone, Default)]
pub struct StaticSupplierDirectory {
    suppliers: Vec<Supplier>,
}

impl StaticSupplierDirectory {
    pub fn new(suppliers: Vec<Supplier>) -> Self {
        Self { suppliers }
    }

    /// Load a JSON array of suppliers.
    pub fn from_json_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read supplier directory file {}", path))?;
        Self::from_json(&raw).with_context(|| format!("Invalid supplier directory file {}", path))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let suppliers: Vec<Supplier> = serde_json::from_str(raw)?;
        let mut seen = std::collections::HashSet::new();
        for supplier in &suppliers {
            if !seen.insert(supplier.id.as_str()) {
                anyhow::bail!("duplicate supplier id '{}'", supplier.id);
            }
        }
        Ok(Self::new(suppliers))
    }

    pub fn len(&self) -> usize {
        self.suppliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppliers.is_empty()
    }
}

#[async_trait]
impl SupplierDirectory for StaticSupplierDirectory {
    async fn list_suppliers(&self) -> WorkflowResult<Vec<Supplier>> {
        Ok(self.suppliers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTORY: &str = r#"[
        {
            "id": "s1",
            "name": "Lone Star Furnishings",
            "location": {"city": "Austin", "state": "TX"},
            "categories": ["furniture", "bathroom"],
            "maxOrderValue": "100000",
            "certifications": ["CARB"]
        }
    ]"#;

    #[tokio::test]
    async fn test_static_directory_from_json() {
        let directory = StaticSupplierDirectory::from_json(DIRECTORY).unwrap();
        assert_eq!(directory.len(), 1);

        let suppliers = directory.list_suppliers().await.unwrap();
        assert_eq!(suppliers[0].id, "s1");
        assert_eq!(suppliers[0].location.state, "TX");
        assert_eq!(suppliers[0].max_order_value, Decimal::from(100_000));
    }

    #[test]
    fn test_static_directory_rejects_duplicate_ids() {
        let doubled = format!(
            "[{0},{0}]",
            DIRECTORY.trim().trim_start_matches('[').trim_end_matches(']')
        );
        let err = StaticSupplierDirectory::from_json(&doubled).unwrap_err();
        assert!(err.to_string().contains("duplicate supplier id"));
    }
}
