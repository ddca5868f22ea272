//! Deterministic bid comparison
//!
//! Bids are normalized per category with min–max scaling across the bid set
//! ("lower is better" categories inverted), then combined with percentage
//! weights that must sum to 100.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rust_decimal::prelude::*;

use crate::domain::{
    Bid, BidComparison, BidScore, BidWeights, CategoryScores, CostBreakdown, RunnerUp,
};
use crate::error::{WorkflowError, WorkflowResult};

/// Warranty length that earns the full warranty score
const FULL_WARRANTY_YEARS: f64 = 2.0;
const WEIGHT_TOLERANCE: f64 = 1e-9;
/// One trillion; larger amounts are rejected as malformed
const MAX_BID_AMOUNT: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct BidComparator;

impl BidComparator {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, bids: &[Bid], weights: BidWeights) -> WorkflowResult<BidComparison> {
        validate_weights(&weights)?;
        if bids.is_empty() {
            return Err(WorkflowError::invalid("at least one bid is required"));
        }
        validate_bids(bids)?;

        let (effective, superseded) = latest_per_supplier(bids);

        let min_price = effective.iter().map(|b| b.total_bid_amount).min().unwrap_or_default();
        let max_price = effective.iter().map(|b| b.total_bid_amount).max().unwrap_or_default();
        let min_lead = effective.iter().map(|b| b.average_lead_time_weeks).min().unwrap_or_default();
        let max_lead = effective.iter().map(|b| b.average_lead_time_weeks).max().unwrap_or_default();

        // Ranked on unrounded values; rounding is for output only
        let mut scores: Vec<(BidScore, f64, Decimal)> = effective
            .iter()
            .map(|bid| {
                let category_scores = CategoryScores {
                    price: price_score(bid.total_bid_amount, min_price, max_price),
                    quality: quality_score(bid),
                    lead_time: lead_time_score(bid.average_lead_time_weeks, min_lead, max_lead),
                    compliance: bid.certifications_coverage_pct,
                };
                let overall = weighted(&weights, &category_scores);

                (
                    BidScore {
                        bid_id: bid.bid_id.clone(),
                        supplier_id: bid.supplier_id.clone(),
                        overall_score: round2(overall),
                        rank: 0,
                        category_scores: category_scores.map(round2),
                    },
                    overall,
                    bid.total_bid_amount,
                )
            })
            .collect();

        scores.sort_by(|(a, a_overall, a_amount), (b, b_overall, b_amount)| {
            b_overall
                .total_cmp(a_overall)
                .then_with(|| a_amount.cmp(b_amount))
                .then_with(|| a.bid_id.cmp(&b.bid_id))
        });

        let scores: Vec<BidScore> = scores
            .into_iter()
            .enumerate()
            .map(|(idx, (mut score, _, _))| {
                score.rank = idx as u32 + 1;
                score
            })
            .collect();

        let winner = scores[0].clone();
        let runner_ups = scores[1..]
            .iter()
            .map(|s| {
                RunnerUp {
                    bid_id: s.bid_id.clone(),
                    supplier_id: s.supplier_id.clone(),
                    overall_score: s.overall_score,
                    score_delta: round2(winner.overall_score - s.overall_score),
                    category_deltas: winner.category_scores.delta(&s.category_scores).map(round2),
                }
            })
            .collect();

        let total = effective
            .iter()
            .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.total_bid_amount))
            .ok_or_else(|| WorkflowError::invalid("bid amounts are too large to total"))?;
        let cost_breakdown = CostBreakdown {
            lowest_bid: min_price,
            highest_bid: max_price,
            average_bid: (total / Decimal::from(effective.len())).round_dp(2),
            potential_savings: max_price - min_price,
        };

        tracing::debug!(
            bids = effective.len(),
            superseded = superseded.len(),
            winner = %winner.bid_id,
            "Bid comparison finished"
        );

        Ok(BidComparison {
            winning_bid_id: winner.bid_id,
            scores,
            cost_breakdown,
            runner_ups,
            weights,
            bids: effective,
            superseded_bid_ids: superseded,
            compared_at: Utc::now(),
        })
    }
}

fn validate_weights(weights: &BidWeights) -> WorkflowResult<()> {
    let parts = [weights.price, weights.quality, weights.lead_time, weights.compliance];
    if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(WorkflowError::InvalidWeights(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    let total = weights.total();
    if (total - 100.0).abs() > WEIGHT_TOLERANCE {
        return Err(WorkflowError::InvalidWeights(format!(
            "weights must sum to 100, got {}",
            total
        )));
    }
    Ok(())
}

fn validate_bids(bids: &[Bid]) -> WorkflowResult<()> {
    let mut ids = HashSet::new();
    for bid in bids {
        if bid.bid_id.trim().is_empty() || bid.supplier_id.trim().is_empty() {
            return Err(WorkflowError::invalid("every bid needs a bidId and supplierId"));
        }
        if !ids.insert(bid.bid_id.as_str()) {
            return Err(WorkflowError::invalid(format!("duplicate bid id '{}'", bid.bid_id)));
        }
        if bid.total_bid_amount.is_sign_negative() {
            return Err(WorkflowError::invalid(format!(
                "bid '{}' has a negative amount",
                bid.bid_id
            )));
        }
        if bid.total_bid_amount > Decimal::from(MAX_BID_AMOUNT) {
            return Err(WorkflowError::invalid(format!(
                "bid '{}' amount exceeds {}",
                bid.bid_id, MAX_BID_AMOUNT
            )));
        }
        if !(0.0..=100.0).contains(&bid.certifications_coverage_pct) {
            return Err(WorkflowError::invalid(format!(
                "bid '{}' certification coverage must be between 0 and 100",
                bid.bid_id
            )));
        }
    }
    Ok(())
}

/// Keep the last bid per supplier in submission order.
///
/// Returns the effective bids (ordered by first appearance of the supplier)
/// and the ids of superseded bids.
fn latest_per_supplier(bids: &[Bid]) -> (Vec<Bid>, Vec<String>) {
    let mut slot: HashMap<&str, usize> = HashMap::new();
    let mut effective: Vec<Bid> = Vec::new();
    let mut superseded = Vec::new();

    for bid in bids {
        match slot.get(bid.supplier_id.as_str()) {
            Some(&idx) => {
                superseded.push(effective[idx].bid_id.clone());
                effective[idx] = bid.clone();
            }
            None => {
                slot.insert(bid.supplier_id.as_str(), effective.len());
                effective.push(bid.clone());
            }
        }
    }

    (effective, superseded)
}

fn weighted(weights: &BidWeights, scores: &CategoryScores) -> f64 {
    weights.price / 100.0 * scores.price
        + weights.quality / 100.0 * scores.quality
        + weights.lead_time / 100.0 * scores.lead_time
        + weights.compliance / 100.0 * scores.compliance
}

fn price_score(amount: Decimal, min: Decimal, max: Decimal) -> f64 {
    if max == min {
        return 100.0;
    }
    ((max - amount) / (max - min)).to_f64().unwrap_or(0.0) * 100.0
}

fn quality_score(bid: &Bid) -> f64 {
    let warranty = (bid.warranty_years as f64).min(FULL_WARRANTY_YEARS) / FULL_WARRANTY_YEARS * 100.0;
    0.5 * warranty + 0.5 * bid.certifications_coverage_pct
}

fn lead_time_score(weeks: u32, min: u32, max: u32) -> f64 {
    if max == min {
        return 100.0;
    }
    100.0 * (max - weeks) as f64 / (max - min) as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
