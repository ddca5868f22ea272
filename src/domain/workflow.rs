//! Workflow state types
//!
//! The workflow is a fixed, forward-only sequence of stages. Every stage owns
//! exactly one artifact key; `currentStage` is persisted under its own key.

use serde::{Deserialize, Serialize};

use super::bids::BidComparison;
use super::compliance::ComplianceReport;
use super::items::ItemSet;
use super::records::{
    AcceptedBid, Contract, Delivery, PurchaseOrder, QualityIssue, RfqBundle, Shipment,
};
use super::suppliers::MatchSet;

/// Workflow stage in canonical order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NotStarted,
    Extraction,
    Compliance,
    SupplierMatching,
    Rfq,
    BidComparison,
    BidAccepted,
    Contract,
    PurchaseOrder,
    Shipment,
    Delivery,
    QualityControl,
    Completed,
}

impl Default for Stage {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl Stage {
    /// The eleven stages that have a handler
    pub const RUNNABLE: [Stage; 11] = [
        Stage::Extraction,
        Stage::Compliance,
        Stage::SupplierMatching,
        Stage::Rfq,
        Stage::BidComparison,
        Stage::BidAccepted,
        Stage::Contract,
        Stage::PurchaseOrder,
        Stage::Shipment,
        Stage::Delivery,
        Stage::QualityControl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::NotStarted => "not_started",
            Stage::Extraction => "extraction",
            Stage::Compliance => "compliance",
            Stage::SupplierMatching => "supplier_matching",
            Stage::Rfq => "rfq",
            Stage::BidComparison => "bid_comparison",
            Stage::BidAccepted => "bid_accepted",
            Stage::Contract => "contract",
            Stage::PurchaseOrder => "purchase_order",
            Stage::Shipment => "shipment",
            Stage::Delivery => "delivery",
            Stage::QualityControl => "quality_control",
            Stage::Completed => "completed",
        }
    }

    /// Parse a stage name, accepting kebab-case as used in URLs
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        [Stage::NotStarted, Stage::Completed]
            .into_iter()
            .chain(Stage::RUNNABLE)
            .find(|stage| stage.as_str() == normalized)
    }

    /// Stage whose artifact must exist before this one may run
    pub fn precondition(self) -> Option<Stage> {
        match self {
            Stage::NotStarted | Stage::Extraction => None,
            Stage::Compliance => Some(Stage::Extraction),
            Stage::SupplierMatching => Some(Stage::Compliance),
            Stage::Rfq => Some(Stage::SupplierMatching),
            Stage::BidComparison => Some(Stage::Rfq),
            Stage::BidAccepted => Some(Stage::BidComparison),
            Stage::Contract => Some(Stage::BidAccepted),
            Stage::PurchaseOrder => Some(Stage::Contract),
            Stage::Shipment => Some(Stage::PurchaseOrder),
            Stage::Delivery => Some(Stage::Shipment),
            Stage::QualityControl => Some(Stage::Delivery),
            Stage::Completed => Some(Stage::QualityControl),
        }
    }

    /// Next stage in canonical order
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::NotStarted => Some(Stage::Extraction),
            Stage::Extraction => Some(Stage::Compliance),
            Stage::Compliance => Some(Stage::SupplierMatching),
            Stage::SupplierMatching => Some(Stage::Rfq),
            Stage::Rfq => Some(Stage::BidComparison),
            Stage::BidComparison => Some(Stage::BidAccepted),
            Stage::BidAccepted => Some(Stage::Contract),
            Stage::Contract => Some(Stage::PurchaseOrder),
            Stage::PurchaseOrder => Some(Stage::Shipment),
            Stage::Shipment => Some(Stage::Delivery),
            Stage::Delivery => Some(Stage::QualityControl),
            Stage::QualityControl => Some(Stage::Completed),
            Stage::Completed => None,
        }
    }

    /// Command a caller should run next from this stage.
    ///
    /// A workflow resting at `quality_control` failed its inspection and
    /// needs another QC run; only `completed` has nothing left to do.
    pub fn next_command(self) -> Option<Stage> {
        match self {
            Stage::QualityControl => Some(Stage::QualityControl),
            Stage::Completed => None,
            stage => stage.next(),
        }
    }

    /// Artifact written by this stage's handler
    pub fn artifact_key(self) -> Option<ArtifactKey> {
        match self {
            Stage::NotStarted | Stage::Completed => None,
            Stage::Extraction => Some(ArtifactKey::ItemSet),
            Stage::Compliance => Some(ArtifactKey::ComplianceReport),
            Stage::SupplierMatching => Some(ArtifactKey::MatchSet),
            Stage::Rfq => Some(ArtifactKey::RfqBundle),
            Stage::BidComparison => Some(ArtifactKey::BidComparison),
            Stage::BidAccepted => Some(ArtifactKey::AcceptedBid),
            Stage::Contract => Some(ArtifactKey::Contract),
            Stage::PurchaseOrder => Some(ArtifactKey::PurchaseOrder),
            Stage::Shipment => Some(ArtifactKey::Shipment),
            Stage::Delivery => Some(ArtifactKey::Delivery),
            Stage::QualityControl => Some(ArtifactKey::QualityIssues),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record key within a workspace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKey {
    ItemSet,
    ComplianceReport,
    MatchSet,
    RfqBundle,
    BidComparison,
    AcceptedBid,
    Contract,
    PurchaseOrder,
    Shipment,
    Delivery,
    QualityIssues,
    CurrentStage,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 12] = [
        ArtifactKey::ItemSet,
        ArtifactKey::ComplianceReport,
        ArtifactKey::MatchSet,
        ArtifactKey::RfqBundle,
        ArtifactKey::BidComparison,
        ArtifactKey::AcceptedBid,
        ArtifactKey::Contract,
        ArtifactKey::PurchaseOrder,
        ArtifactKey::Shipment,
        ArtifactKey::Delivery,
        ArtifactKey::QualityIssues,
        ArtifactKey::CurrentStage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKey::ItemSet => "itemSet",
            ArtifactKey::ComplianceReport => "complianceReport",
            ArtifactKey::MatchSet => "matchSet",
            ArtifactKey::RfqBundle => "rfqBundle",
            ArtifactKey::BidComparison => "bidComparison",
            ArtifactKey::AcceptedBid => "acceptedBid",
            ArtifactKey::Contract => "contract",
            ArtifactKey::PurchaseOrder => "purchaseOrder",
            ArtifactKey::Shipment => "shipment",
            ArtifactKey::Delivery => "delivery",
            ArtifactKey::QualityIssues => "qualityIssues",
            ArtifactKey::CurrentStage => "currentStage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_set: Option<ItemSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_report: Option<ComplianceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_set: Option<MatchSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfq_bundle: Option<RfqBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_comparison: Option<BidComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_bid: Option<AcceptedBid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<Contract>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_order: Option<PurchaseOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<Shipment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_issues: Option<Vec<QualityIssue>>,
}

impl Artifacts {
    /// Whether the artifact produced by `stage` is present
    pub fn has(&self, stage: Stage) -> bool {
        match stage {
            Stage::NotStarted => true,
            Stage::Extraction => self.item_set.is_some(),
            Stage::Compliance => self.compliance_report.is_some(),
            Stage::SupplierMatching => self.match_set.is_some(),
            Stage::Rfq => self.rfq_bundle.is_some(),
            Stage::BidComparison => self.bid_comparison.is_some(),
            Stage::BidAccepted => self.accepted_bid.is_some(),
            Stage::Contract => self.contract.is_some(),
            Stage::PurchaseOrder => self.purchase_order.is_some(),
            Stage::Shipment => self.shipment.is_some(),
            Stage::Delivery => self.delivery.is_some(),
            Stage::QualityControl => self.quality_issues.is_some(),
            Stage::Completed => false,
        }
    }
}

/// Complete workflow state of one workspace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub workspace_id: String,
    pub current_stage: Stage,
    pub artifacts: Artifacts,
}

impl WorkflowState {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            current_stage: Stage::NotStarted,
            artifacts: Artifacts::default(),
        }
    }

    pub fn completed_stages(&self) -> Vec<Stage> {
        Stage::RUNNABLE
            .into_iter()
            .filter(|s| self.artifacts.has(*s))
            .collect()
    }
}

/// Result of a successful stage invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub workspace_id: String,
    pub stage: Stage,
    pub current_stage: Stage,
    pub summary: String,
    pub artifact: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageCommand {
    pub stage: Stage,
    pub next_command: Option<Stage>,
}

/// Resumption view of a workspace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub workspace_id: String,
    pub current_stage: Stage,
    pub next_command: Option<Stage>,
    pub completed_stages: Vec<Stage>,
    pub commands: Vec<StageCommand>,
}

/// Static stage to next-command map
pub fn command_map() -> Vec<StageCommand> {
    [Stage::NotStarted]
        .into_iter()
        .chain(Stage::RUNNABLE)
        .chain([Stage::Completed])
        .map(|stage| StageCommand {
            stage,
            next_command: stage.next_command(),
        })
        .collect()
}
