//! Request DTOs for the stage commands

use chrono::NaiveDate;
use serde::Deserialize;

use super::bids::{Bid, BidWeights};
use super::compliance::Severity;
use super::items::ItemSet;
use super::suppliers::Location;

/// Request DTO for the extraction stage
///
/// Either a raw document for the extraction service or an already
/// structured item set.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub item_count_hint: Option<u32>,
    #[serde(default)]
    pub item_set: Option<ItemSet>,
    /// Upper bound for the extraction call, overrides the configured default
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Request DTO for the supplier matching stage
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub buyer_location: Location,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Request DTO for the RFQ stage
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RfqRequest {
    #[serde(default)]
    pub response_days: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Request DTO for the bid comparison stage
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareBidsRequest {
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub weights: Option<BidWeights>,
}

/// Request DTO for the bid acceptance stage
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBidRequest {
    /// Defaults to the winning bid
    #[serde(default)]
    pub bid_id: Option<String>,
    /// Required when accepting anything but the winner
    #[serde(default)]
    pub override_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequest {
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub special_conditions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderRequest {
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub requested_delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRequest {
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub estimated_arrival: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedItem {
    pub item_id: String,
    pub quantity_received: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub received_by: String,
    /// Omitted lines are taken as received in full
    #[serde(default)]
    pub received_items: Vec<ReceivedItem>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionFinding {
    pub item_id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub affected_quantity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityControlRequest {
    pub inspector: String,
    #[serde(default)]
    pub findings: Vec<InspectionFinding>,
}
