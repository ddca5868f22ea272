use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bid received from a supplier in response to an RFQ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub bid_id: String,
    pub supplier_id: String,
    pub total_bid_amount: Decimal,
    pub average_lead_time_weeks: u32,
    pub warranty_years: u32,
    /// Share of requested certifications the supplier can provide (0-100)
    pub certifications_coverage_pct: f64,
}

/// Category weights for bid comparison, in percent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidWeights {
    pub price: f64,
    pub quality: f64,
    pub lead_time: f64,
    pub compliance: f64,
}

impl Default for BidWeights {
    fn default() -> Self {
        Self {
            price: 40.0,
            quality: 30.0,
            lead_time: 20.0,
            compliance: 10.0,
        }
    }
}

impl BidWeights {
    pub fn total(&self) -> f64 {
        self.price + self.quality + self.lead_time + self.compliance
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    pub price: f64,
    pub quality: f64,
    pub lead_time: f64,
    pub compliance: f64,
}

impl CategoryScores {
    pub fn map(self, f: impl Fn(f64) -> f64) -> CategoryScores {
        CategoryScores {
            price: f(self.price),
            quality: f(self.quality),
            lead_time: f(self.lead_time),
            compliance: f(self.compliance),
        }
    }

    pub fn delta(&self, other: &CategoryScores) -> CategoryScores {
        CategoryScores {
            price: self.price - other.price,
            quality: self.quality - other.quality,
            lead_time: self.lead_time - other.lead_time,
            compliance: self.compliance - other.compliance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidScore {
    pub bid_id: String,
    pub supplier_id: String,
    pub overall_score: f64,
    pub rank: u32,
    pub category_scores: CategoryScores,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub lowest_bid: Decimal,
    pub highest_bid: Decimal,
    pub average_bid: Decimal,
    /// Spread between the highest and lowest bid
    pub potential_savings: Decimal,
}

/// A non-winning bid and how far it trails the winner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerUp {
    pub bid_id: String,
    pub supplier_id: String,
    pub overall_score: f64,
    /// Winner's overall score minus this bid's
    pub score_delta: f64,
    /// Winner's category scores minus this bid's
    pub category_deltas: CategoryScores,
}

/// Artifact of the bid comparison stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidComparison {
    pub scores: Vec<BidScore>,
    pub winning_bid_id: String,
    pub cost_breakdown: CostBreakdown,
    pub runner_ups: Vec<RunnerUp>,
    pub weights: BidWeights,
    /// Effective bid set after resubmissions were applied
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub superseded_bid_ids: Vec<String>,
    pub compared_at: DateTime<Utc>,
}

impl BidComparison {
    pub fn bid(&self, bid_id: &str) -> Option<&Bid> {
        self.bids.iter().find(|b| b.bid_id == bid_id)
    }

    pub fn score(&self, bid_id: &str) -> Option<&BidScore> {
        self.scores.iter().find(|s| s.bid_id == bid_id)
    }
}
