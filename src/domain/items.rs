//! Bill-of-materials item types
//!
//! Items are produced once per workflow run by the extraction collaborator
//! (or supplied directly by the caller) and never mutated afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Moisture exposure of the location an item is installed in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MoistureZone {
    #[default]
    None,
    Wet,
}

/// Physical description of an item as written in the BOM
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Specifications {
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub finish: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
}

/// Compliance flags attached to an item during extraction
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFlags {
    #[serde(default)]
    pub fire_rating_required: bool,
    #[serde(default)]
    pub moisture_zone: MoistureZone,
    #[serde(default)]
    pub ada_relevant: bool,
    /// Certifications the specification asks for
    #[serde(default)]
    pub certifications_required: Vec<String>,
    /// Certifications the item is already listed with
    #[serde(default)]
    pub certifications: Vec<String>,
}

/// A single line of the bill of materials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub specifications: Specifications,
    #[serde(default)]
    pub compliance: ComplianceFlags,
}

impl Item {
    /// quantity × unit price, `None` when the product does not fit a `Decimal`
    pub fn estimated_cost(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Where an item set came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    #[default]
    Extractor,
    Manual,
}

/// Structured BOM, the artifact of the extraction stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemSet {
    pub project_name: String,
    pub items: Vec<Item>,
    #[serde(default)]
    pub total_estimated_cost: Decimal,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub source: ItemSource,
}

impl ItemSet {
    pub fn compute_total(items: &[Item]) -> Option<Decimal> {
        items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.estimated_cost()?))
    }

    /// Check the structural contract every item set must satisfy.
    ///
    /// Returns the total estimated cost, or a human-readable reason on the
    /// first violation.
    pub fn validate(&self) -> Result<Decimal, String> {
        if self.items.is_empty() {
            return Err("item set contains no items".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for item in &self.items {
            if item.id.trim().is_empty() {
                return Err(format!("item '{}' has an empty id", item.name));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(format!("duplicate item id '{}'", item.id));
            }
            if item.category.trim().is_empty() {
                return Err(format!("item '{}' has no category", item.id));
            }
            if item.quantity == 0 {
                return Err(format!("item '{}' has zero quantity", item.id));
            }
            if item.unit_price.is_sign_negative() {
                return Err(format!("item '{}' has a negative unit price", item.id));
            }
            if item.estimated_cost().is_none() {
                return Err(format!("item '{}' estimated cost is too large", item.id));
            }
        }

        Self::compute_total(&self.items)
            .ok_or_else(|| "total estimated cost is too large".to_string())
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }
}
