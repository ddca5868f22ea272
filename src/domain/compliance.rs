//! Compliance report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compliance domain an issue belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    FireSafety,
    Moisture,
    Ada,
    Electrical,
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueType::FireSafety => write!(f, "fire_safety"),
            IssueType::Moisture => write!(f, "moisture"),
            IssueType::Ada => write!(f, "ada"),
            IssueType::Electrical => write!(f, "electrical"),
        }
    }
}

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Contribution of one issue to the report's risk score
    pub fn risk_weight(self) -> u32 {
        match self {
            Severity::Critical => 10,
            Severity::Warning => 3,
            Severity::Info => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceIssue {
    pub item_id: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
    pub affected_quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSummary {
    pub total_issues: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    /// Weighted issue count, capped at 100
    pub risk_score: u32,
    pub items_with_issues: usize,
    pub compliant_items: usize,
}

/// Artifact of the compliance stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub issues: Vec<ComplianceIssue>,
    pub summary: ComplianceSummary,
    pub checked_at: DateTime<Utc>,
}
