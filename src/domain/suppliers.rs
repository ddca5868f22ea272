//! Supplier directory and supplier matching types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub city: String,
    pub state: String,
}

/// Supplier entry from the external directory (read-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub location: Location,
    /// Ordered by priority; the first entry is the supplier's specialization
    pub categories: Vec<String>,
    pub max_order_value: Decimal,
    #[serde(default)]
    pub certifications: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub category_score: f64,
    pub location_score: f64,
    pub capacity_score: f64,
    pub coverage_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedItem {
    pub item_id: String,
    pub quantity: u32,
    pub estimated_unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupplierMatch {
    pub supplier_id: String,
    pub supplier_name: String,
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub matched_items: Vec<MatchedItem>,
    pub estimated_total_cost: Decimal,
}

/// Why an item has no supplier in the final match list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No supplier in the directory carries the item's category
    NoCategoryMatch,
    /// Suppliers carry the category but none can take an order of this value
    InsufficientCapacity,
    /// Suppliers could provide the item but all scored below the threshold
    BelowMinScore,
    /// Qualifying suppliers were cut by the result limit
    NotInTopResults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedItem {
    pub item_id: String,
    pub reason: UnmatchedReason,
}

/// Artifact of the supplier matching stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSet {
    pub matches: Vec<SupplierMatch>,
    pub unmatched_items: Vec<UnmatchedItem>,
    pub buyer_location: Location,
    pub min_score: f64,
    pub max_results: usize,
    pub evaluated_suppliers: usize,
    pub matched_at: DateTime<Utc>,
}

impl MatchSet {
    pub fn find(&self, supplier_id: &str) -> Option<&SupplierMatch> {
        self.matches.iter().find(|m| m.supplier_id == supplier_id)
    }
}
