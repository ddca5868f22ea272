//! Records appended by the post-matching stages: RFQ, acceptance, contract,
//! purchase order, shipment, delivery and quality control.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::compliance::Severity;
use super::items::Specifications;
use super::suppliers::Location;

// ============================================================================
// RFQ
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RfqLine {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub specifications: Specifications,
}

/// Acknowledgement returned by the notification collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RfqAck {
    pub delivered: bool,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Request for quote sent to a single supplier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RfqDocument {
    pub rfq_id: Uuid,
    pub supplier_id: String,
    pub supplier_name: String,
    pub project_name: String,
    pub items: Vec<RfqLine>,
    pub delivery_location: Location,
    pub response_due_by: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SentRfq {
    #[serde(flatten)]
    pub document: RfqDocument,
    pub acknowledgement: RfqAck,
    pub sent_at: DateTime<Utc>,
}

/// Artifact of the RFQ stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RfqBundle {
    pub rfqs: Vec<SentRfq>,
    pub issued_at: DateTime<Utc>,
}

impl RfqBundle {
    pub fn includes_supplier(&self, supplier_id: &str) -> bool {
        self.rfqs.iter().any(|r| r.document.supplier_id == supplier_id)
    }
}

// ============================================================================
// Acceptance, contract, purchase order
// ============================================================================

/// Artifact of the bid acceptance stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBid {
    pub bid_id: String,
    pub supplier_id: String,
    pub total_bid_amount: Decimal,
    pub overall_score: f64,
    pub rank: u32,
    pub accepted_at: DateTime<Utc>,
    /// Set when the accepted bid is not the top-ranked one
    #[serde(default)]
    pub override_reason: Option<String>,
}

/// Contracts are only drafted here; sending and signing happen outside the
/// workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    #[default]
    Draft,
}

/// Artifact of the contract stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub contract_id: Uuid,
    pub bid_id: String,
    pub supplier_id: String,
    pub amount: Decimal,
    pub payment_terms: String,
    pub warranty_years: u32,
    pub lead_time_weeks: u32,
    #[serde(default)]
    pub special_conditions: Vec<String>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderLine {
    pub item_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Artifact of the purchase order stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub po_number: String,
    pub contract_id: Uuid,
    pub supplier_id: String,
    pub lines: Vec<PurchaseOrderLine>,
    /// Contracted amount; line totals are the estimate basis
    pub total_amount: Decimal,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub requested_delivery_date: Option<NaiveDate>,
    pub issued_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn line(&self, item_id: &str) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }
}

// ============================================================================
// Shipment, delivery, quality control
// ============================================================================

/// Artifact of the shipment stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub shipment_id: Uuid,
    pub po_number: String,
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub estimated_arrival: Option<NaiveDate>,
    pub shipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLine {
    pub item_id: String,
    pub quantity_ordered: u32,
    pub quantity_received: u32,
}

impl DeliveryLine {
    pub fn is_short(&self) -> bool {
        self.quantity_received != self.quantity_ordered
    }
}

/// Artifact of the delivery stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivery_id: Uuid,
    pub po_number: String,
    pub received_by: String,
    pub received_at: DateTime<Utc>,
    pub lines: Vec<DeliveryLine>,
    /// Lines whose received quantity differs from the order
    pub discrepancies: Vec<DeliveryLine>,
    pub complete: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One entry of the quality control artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityIssue {
    pub issue_id: Uuid,
    pub item_id: String,
    pub description: String,
    pub severity: Severity,
    pub affected_quantity: u32,
    pub inspector: String,
    pub recorded_at: DateTime<Utc>,
}

/// Inspection passes when nothing critical was found
pub fn inspection_passed(issues: &[QualityIssue]) -> bool {
    !issues.iter().any(|i| i.severity == Severity::Critical)
}
