//! Deterministic supplier matching
//!
//! Each supplier is scored on category fit, distance to the buyer, capacity
//! for the order value and item coverage. Scoring is a pure function of its
//! inputs apart from the `matchedAt` timestamp.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use chrono::Utc;
use rust_decimal::prelude::*;
use serde::Deserialize;

use crate::domain::{
    Item, Location, MatchSet, MatchedItem, ScoreBreakdown, Supplier, SupplierMatch,
    UnmatchedItem, UnmatchedReason,
};
use crate::error::{WorkflowError, WorkflowResult};

const CATEGORY_WEIGHT: f64 = 0.3;
const LOCATION_WEIGHT: f64 = 0.2;
const CAPACITY_WEIGHT: f64 = 0.1;
const COVERAGE_WEIGHT: f64 = 0.4;

pub const DEFAULT_MIN_SCORE: f64 = 60.0;
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// State → region lookup used for the location score
#[derive(Debug, Clone)]
pub struct RegionTable {
    /// Upper-cased code or full name → canonical code
    aliases: HashMap<String, String>,
    /// Canonical code → region name
    regions: HashMap<String, String>,
}

impl RegionTable {
    /// Build a table from `(code, name, region)` rows.
    pub fn new<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        let mut aliases = HashMap::new();
        let mut regions = HashMap::new();
        for (code, name, region) in rows {
            let code = code.to_uppercase();
            aliases.insert(code.clone(), code.clone());
            if !name.trim().is_empty() {
                aliases.insert(name.trim().to_uppercase(), code.clone());
            }
            regions.insert(code, region.to_string());
        }
        Self { aliases, regions }
    }

    /// The four US census regions
    pub fn us() -> Self {
        Self::new(US_STATES.iter().copied())
    }

    /// Load a JSON array of `{"code", "name", "region"}` rows.
    pub fn from_json_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read region table file {}", path))?;
        Self::from_json(&raw).with_context(|| format!("Invalid region table file {}", path))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let rows: Vec<RegionRow> = serde_json::from_str(raw)?;
        if rows.is_empty() {
            anyhow::bail!("region table has no rows");
        }
        let mut seen = HashSet::new();
        for row in &rows {
            if row.code.trim().is_empty() || row.region.trim().is_empty() {
                anyhow::bail!("region row '{}' needs a code and a region", row.name);
            }
            if !seen.insert(row.code.trim().to_uppercase()) {
                anyhow::bail!("duplicate state code '{}'", row.code);
            }
        }
        Ok(Self::new(
            rows.iter()
                .map(|r| (r.code.trim(), r.name.trim(), r.region.trim())),
        ))
    }

    /// Number of states or provinces with a region
    pub fn state_count(&self) -> usize {
        self.regions.len()
    }

    fn canonical(&self, state: &str) -> String {
        let key = state.trim().to_uppercase();
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    fn region(&self, canonical: &str) -> Option<&str> {
        self.regions.get(canonical).map(String::as_str)
    }

    /// 100 same state, 75 same region, 25 otherwise
    pub fn location_score(&self, buyer: &Location, supplier: &Location) -> f64 {
        let buyer_state = self.canonical(&buyer.state);
        let supplier_state = self.canonical(&supplier.state);

        if !buyer_state.is_empty() && buyer_state == supplier_state {
            return 100.0;
        }
        match (self.region(&buyer_state), self.region(&supplier_state)) {
            (Some(a), Some(b)) if a == b => 75.0,
            _ => 25.0,
        }
    }
}

#[derive(Deserialize)]
struct RegionRow {
    code: String,
    #[serde(default)]
    name: String,
    region: String,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::us()
    }
}

#[rustfmt::skip]
const US_STATES: [(&str, &str, &str); 51] = [
    ("CT", "Connecticut", "Northeast"), ("ME", "Maine", "Northeast"),
    ("MA", "Massachusetts", "Northeast"), ("NH", "New Hampshire", "Northeast"),
    ("RI", "Rhode Island", "Northeast"), ("VT", "Vermont", "Northeast"),
    ("NJ", "New Jersey", "Northeast"), ("NY", "New York", "Northeast"),
    ("PA", "Pennsylvania", "Northeast"),
    ("IL", "Illinois", "Midwest"), ("IN", "Indiana", "Midwest"), ("MI", "Michigan", "Midwest"),
    ("OH", "Ohio", "Midwest"), ("WI", "Wisconsin", "Midwest"), ("IA", "Iowa", "Midwest"),
    ("KS", "Kansas", "Midwest"), ("MN", "Minnesota", "Midwest"), ("MO", "Missouri", "Midwest"),
    ("NE", "Nebraska", "Midwest"), ("ND", "North Dakota", "Midwest"),
    ("SD", "South Dakota", "Midwest"),
    ("DE", "Delaware", "South"), ("FL", "Florida", "South"), ("GA", "Georgia", "South"),
    ("MD", "Maryland", "South"), ("NC", "North Carolina", "South"),
    ("SC", "South Carolina", "South"), ("VA", "Virginia", "South"),
    ("DC", "District of Columbia", "South"), ("WV", "West Virginia", "South"),
    ("AL", "Alabama", "South"), ("KY", "Kentucky", "South"), ("MS", "Mississippi", "South"),
    ("TN", "Tennessee", "South"), ("AR", "Arkansas", "South"), ("LA", "Louisiana", "South"),
    ("OK", "Oklahoma", "South"), ("TX", "Texas", "South"),
    ("AZ", "Arizona", "West"), ("CO", "Colorado", "West"), ("ID", "Idaho", "West"),
    ("MT", "Montana", "West"), ("NV", "Nevada", "West"), ("NM", "New Mexico", "West"),
    ("UT", "Utah", "West"), ("WY", "Wyoming", "West"), ("AK", "Alaska", "West"),
    ("CA", "California", "West"), ("HI", "Hawaii", "West"), ("OR", "Oregon", "West"),
    ("WA", "Washington", "West"),
];

/// Thresholds for a matching run
#[derive(Debug, Clone)]
pub struct MatchParams {
    pub buyer_location: Location,
    pub min_score: f64,
    pub max_results: usize,
}

/// Per-supplier intermediate result
struct Evaluation {
    scored: SupplierMatch,
    /// Total score before rounding, used for ranking
    raw_total: f64,
    covered: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SupplierMatcher {
    regions: RegionTable,
}

impl SupplierMatcher {
    pub fn new(regions: RegionTable) -> Self {
        Self { regions }
    }

    /// Rank suppliers for the item list.
    ///
    /// Suppliers that can provide nothing are never returned, whatever the
    /// threshold.
    pub fn match_suppliers(
        &self,
        items: &[Item],
        suppliers: &[Supplier],
        params: &MatchParams,
    ) -> WorkflowResult<MatchSet> {
        if items.is_empty() {
            return Err(WorkflowError::invalid("at least one item is required for matching"));
        }
        if !(0.0..=100.0).contains(&params.min_score) {
            return Err(WorkflowError::invalid(format!(
                "minScore must be between 0 and 100, got {}",
                params.min_score
            )));
        }
        if params.max_results == 0 {
            return Err(WorkflowError::invalid("maxResults must be at least 1"));
        }
        if params.buyer_location.state.trim().is_empty() {
            return Err(WorkflowError::invalid("buyer location state is required"));
        }

        let evaluations: Vec<Evaluation> = suppliers
            .iter()
            .map(|s| self.evaluate(items, s, &params.buyer_location))
            .collect();

        let mut survivors: Vec<&Evaluation> = evaluations
            .iter()
            .filter(|e| !e.scored.matched_items.is_empty())
            .filter(|e| e.scored.total_score >= params.min_score)
            .collect();
        survivors.sort_by(|a, b| rank_order(a, b));

        let above_threshold: HashSet<&str> = survivors
            .iter()
            .copied()
            .map(|e| e.scored.supplier_id.as_str())
            .collect();
        survivors.truncate(params.max_results);

        let matches: Vec<SupplierMatch> = survivors.iter().map(|e| e.scored.clone()).collect();
        let unmatched_items = classify_unmatched(items, &evaluations, &matches, &above_threshold);

        tracing::debug!(
            items = items.len(),
            suppliers = suppliers.len(),
            matches = matches.len(),
            unmatched = unmatched_items.len(),
            "Supplier matching finished"
        );

        Ok(MatchSet {
            matches,
            unmatched_items,
            buyer_location: params.buyer_location.clone(),
            min_score: params.min_score,
            max_results: params.max_results,
            evaluated_suppliers: suppliers.len(),
            matched_at: Utc::now(),
        })
    }

    fn evaluate(&self, items: &[Item], supplier: &Supplier, buyer: &Location) -> Evaluation {
        let mut category_scores = Vec::new();
        let mut covered = HashSet::new();
        let mut matched_items = Vec::new();
        let mut order_value = Decimal::ZERO;

        for item in items {
            let Some(position) = category_position(supplier, item) else {
                continue;
            };
            covered.insert(item.id.clone());
            category_scores.push(if position == 0 { 100.0 } else { 50.0 });

            let fits = item
                .estimated_cost()
                .filter(|cost| *cost <= supplier.max_order_value)
                .and_then(|cost| order_value.checked_add(cost));
            if let Some(total) = fits {
                order_value = total;
                matched_items.push(MatchedItem {
                    item_id: item.id.clone(),
                    quantity: item.quantity,
                    estimated_unit_price: item.unit_price,
                });
            }
        }

        let category_score = if category_scores.is_empty() {
            0.0
        } else {
            category_scores.iter().sum::<f64>() / category_scores.len() as f64
        };
        let location_score = self.regions.location_score(buyer, &supplier.location);
        let capacity_score = capacity_score(supplier.max_order_value, order_value, matched_items.is_empty());
        let coverage_score = 100.0 * matched_items.len() as f64 / items.len() as f64;

        let total = CATEGORY_WEIGHT * category_score
            + LOCATION_WEIGHT * location_score
            + CAPACITY_WEIGHT * capacity_score
            + COVERAGE_WEIGHT * coverage_score;

        Evaluation {
            scored: SupplierMatch {
                supplier_id: supplier.id.clone(),
                supplier_name: supplier.name.clone(),
                total_score: round2(total),
                breakdown: ScoreBreakdown {
                    category_score,
                    location_score,
                    capacity_score,
                    coverage_score,
                },
                matched_items,
                estimated_total_cost: order_value,
            },
            raw_total: total,
            covered,
        }
    }
}

/// Index of the supplier category serving the item; 0 means specialized.
fn category_position(supplier: &Supplier, item: &Item) -> Option<usize> {
    supplier.categories.iter().position(|c| {
        let c = c.trim();
        c.eq_ignore_ascii_case(item.category.trim())
            || (!item.subcategory.trim().is_empty() && c.eq_ignore_ascii_case(item.subcategory.trim()))
    })
}

fn capacity_score(max_order_value: Decimal, order_value: Decimal, nothing_assignable: bool) -> f64 {
    if nothing_assignable {
        return 0.0;
    }
    let covers = |factor: Decimal| {
        order_value
            .checked_mul(factor)
            .map_or(false, |needed| max_order_value >= needed)
    };

    if covers(Decimal::new(12, 1)) {
        100.0
    } else if max_order_value >= order_value {
        75.0
    } else if covers(Decimal::new(5, 1)) {
        50.0
    } else {
        0.0
    }
}

/// Total score desc, coverage desc, estimated cost asc, supplier id asc
fn rank_order(a: &Evaluation, b: &Evaluation) -> std::cmp::Ordering {
    let (x, y) = (&a.scored, &b.scored);
    b.raw_total
        .total_cmp(&a.raw_total)
        .then_with(|| y.breakdown.coverage_score.total_cmp(&x.breakdown.coverage_score))
        .then_with(|| x.estimated_total_cost.cmp(&y.estimated_total_cost))
        .then_with(|| x.supplier_id.cmp(&y.supplier_id))
}

fn classify_unmatched(
    items: &[Item],
    evaluations: &[Evaluation],
    matches: &[SupplierMatch],
    above_threshold: &HashSet<&str>,
) -> Vec<UnmatchedItem> {
    let served: HashSet<&str> = matches
        .iter()
        .flat_map(|m| m.matched_items.iter().map(|i| i.item_id.as_str()))
        .collect();

    items
        .iter()
        .filter(|item| !served.contains(item.id.as_str()))
        .map(|item| {
            let covering: Vec<&Evaluation> = evaluations
                .iter()
                .filter(|e| e.covered.contains(&item.id))
                .collect();
            let providers: Vec<&Evaluation> = covering
                .iter()
                .copied()
                .filter(|e| e.scored.matched_items.iter().any(|m| m.item_id == item.id))
                .collect();

            let reason = if covering.is_empty() {
                UnmatchedReason::NoCategoryMatch
            } else if providers.is_empty() {
                UnmatchedReason::InsufficientCapacity
            } else if providers
                .iter()
                .any(|e| above_threshold.contains(e.scored.supplier_id.as_str()))
            {
                UnmatchedReason::NotInTopResults
            } else {
                UnmatchedReason::BelowMinScore
            };

            UnmatchedItem {
                item_id: item.id.clone(),
                reason,
            }
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComplianceFlags, Specifications};

    fn item(id: &str, category: &str, qty: u32, price: i64) -> Item {
        Item {
            id: id.to_string(),
            category: category.to_string(),
            subcategory: String::new(),
            name: id.to_string(),
            quantity: qty,
            unit_price: Decimal::from(price),
            specifications: Specifications::default(),
            compliance: ComplianceFlags::default(),
        }
    }

    fn supplier(id: &str, state: &str, categories: &[&str], max: i64) -> Supplier {
        Supplier {
            id: id.to_string(),
            name: format!("Supplier {}", id),
            location: Location {
                city: String::new(),
                state: state.to_string(),
            },
            categories: categories.iter().map(|c| c.to_string()).collect(),
            max_order_value: Decimal::from(max),
            certifications: vec![],
        }
    }

    fn params(state: &str, min_score: f64) -> MatchParams {
        MatchParams {
            buyer_location: Location {
                city: "Austin".to_string(),
                state: state.to_string(),
            },
            min_score,
            max_results: 5,
        }
    }

    #[test]
    fn test_location_score_regions() {
        let table = RegionTable::us();
        let tx = Location { city: String::new(), state: "TX".to_string() };
        let texas = Location { city: String::new(), state: "Texas".to_string() };
        let ga = Location { city: String::new(), state: "ga".to_string() };
        let ca = Location { city: String::new(), state: "CA".to_string() };
        assert_eq!(table.location_score(&tx, &texas), 100.0);
        assert_eq!(table.location_score(&tx, &ga), 75.0);
        assert_eq!(table.location_score(&tx, &ca), 25.0);
    }

    #[test]
    fn test_capacity_bands() {
        let order = Decimal::from(1000);
        assert_eq!(capacity_score(Decimal::from(1200), order, false), 100.0);
        assert_eq!(capacity_score(Decimal::from(1000), order, false), 75.0);
        assert_eq!(capacity_score(Decimal::from(500), order, false), 50.0);
        assert_eq!(capacity_score(Decimal::from(499), order, false), 0.0);
        assert_eq!(capacity_score(Decimal::from(5000), Decimal::ZERO, true), 0.0);
    }

    #[test]
    fn test_specialized_category_scores_full() {
        let items = vec![item("chair", "furniture", 10, 200), item("vanity", "bathroom", 2, 800)];
        let suppliers = vec![supplier("s1", "TX", &["furniture", "bathroom"], 100_000)];

        let set = SupplierMatcher::default()
            .match_suppliers(&items, &suppliers, &params("TX", 0.0))
            .unwrap();
        let m = &set.matches[0];
        assert_eq!(m.breakdown.category_score, 75.0);
        assert_eq!(m.breakdown.coverage_score, 100.0);
        assert_eq!(m.breakdown.capacity_score, 100.0);
        assert_eq!(m.estimated_total_cost, Decimal::from(3600));
        // 0.3*75 + 0.2*100 + 0.1*100 + 0.4*100
        assert_eq!(m.total_score, 92.5);
    }

    #[test]
    fn test_zero_items_is_invalid_input() {
        let suppliers = vec![supplier("s1", "TX", &["furniture"], 1000)];
        let err = SupplierMatcher::default()
            .match_suppliers(&[], &suppliers, &params("TX", 60.0))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_directory_returns_all_unmatched() {
        let items = vec![item("chair", "furniture", 1, 100), item("tv", "electronics", 1, 900)];
        let set = SupplierMatcher::default()
            .match_suppliers(&items, &[], &params("TX", 60.0))
            .unwrap();
        assert!(set.matches.is_empty());
        assert_eq!(set.unmatched_items.len(), 2);
        assert!(set
            .unmatched_items
            .iter()
            .all(|u| u.reason == UnmatchedReason::NoCategoryMatch));
    }

    #[test]
    fn test_unmatched_reasons() {
        let items = vec![
            item("rug", "textiles", 1, 100),
            item("piano", "instruments", 1, 50_000),
            item("lamp", "lighting", 1, 100),
        ];
        let suppliers = vec![
            supplier("tiny", "TX", &["instruments"], 1_000),
            supplier("far", "WA", &["lighting"], 10_000),
        ];

        let set = SupplierMatcher::default()
            .match_suppliers(&items, &suppliers, &params("TX", 60.0))
            .unwrap();
        let reason = |id: &str| {
            set.unmatched_items
                .iter()
                .find(|u| u.item_id == id)
                .map(|u| u.reason)
        };
        assert_eq!(reason("rug"), Some(UnmatchedReason::NoCategoryMatch));
        assert_eq!(reason("piano"), Some(UnmatchedReason::InsufficientCapacity));
        assert_eq!(reason("lamp"), Some(UnmatchedReason::BelowMinScore));
    }

    #[test]
    fn test_truncation_reports_not_in_top_results() {
        let items = vec![item("chair", "furniture", 1, 100), item("desk", "desks", 1, 100)];
        let suppliers = vec![
            supplier("a", "TX", &["furniture", "desks"], 10_000),
            supplier("b", "TX", &["desks"], 10_000),
        ];
        let mut p = params("TX", 0.0);
        p.max_results = 1;

        let set = SupplierMatcher::default()
            .match_suppliers(&items, &suppliers, &p)
            .unwrap();
        assert_eq!(set.matches.len(), 1);
        assert_eq!(set.matches[0].supplier_id, "a");
        assert!(set.unmatched_items.is_empty());

        let items = vec![item("chair", "furniture", 1, 100), item("bench", "outdoor", 1, 100)];
        let suppliers = vec![
            supplier("a", "TX", &["furniture"], 10_000),
            supplier("b", "TX", &["outdoor"], 10_000),
        ];
        let set = SupplierMatcher::default()
            .match_suppliers(&items, &suppliers, &p)
            .unwrap();
        assert_eq!(set.unmatched_items.len(), 1);
        assert_eq!(set.unmatched_items[0].reason, UnmatchedReason::NotInTopResults);
    }

    #[test]
    fn test_tie_break_prefers_cheaper_order() {
        let items = vec![item("chair", "furniture", 1, 100), item("sofa", "furniture", 1, 5_000)];
        // "small" cannot take the sofa
        let suppliers = vec![
            supplier("big", "TX", &["furniture"], 100_000),
            supplier("small", "TX", &["furniture"], 1_000),
        ];
        let set = SupplierMatcher::default()
            .match_suppliers(&items, &suppliers, &params("TX", 0.0))
            .unwrap();
        assert_eq!(set.matches[0].supplier_id, "big");
        assert_eq!(set.matches[1].breakdown.coverage_score, 50.0);
    }

    #[test]
    fn test_matching_is_deterministic() {
        let items = vec![
            item("chair", "furniture", 12, 240),
            item("vanity", "bathroom", 3, 700),
            item("tv", "electronics", 2, 1500),
        ];
        let suppliers = vec![
            supplier("s1", "TX", &["furniture", "bathroom"], 50_000),
            supplier("s2", "NY", &["electronics"], 5_000),
            supplier("s3", "OK", &["bathroom", "furniture", "electronics"], 2_000),
        ];
        let matcher = SupplierMatcher::default();
        let first = matcher.match_suppliers(&items, &suppliers, &params("TX", 0.0)).unwrap();
        for _ in 0..5 {
            let again = matcher.match_suppliers(&items, &suppliers, &params("TX", 0.0)).unwrap();
            assert_eq!(again.matches, first.matches);
            assert_eq!(again.unmatched_items, first.unmatched_items);
        }
    }

    #[test]
    fn test_coverage_bounds() {
        let items: Vec<Item> = (0..7).map(|i| item(&format!("i{}", i), "furniture", 1, 10)).collect();
        let mut partial = items.clone();
        partial[6].category = "other".to_string();

        let suppliers = vec![supplier("s", "TX", &["furniture"], 1_000)];
        let full = SupplierMatcher::default()
            .match_suppliers(&items, &suppliers, &params("TX", 0.0))
            .unwrap();
        assert_eq!(full.matches[0].breakdown.coverage_score, 100.0);

        let part = SupplierMatcher::default()
            .match_suppliers(&partial, &suppliers, &params("TX", 0.0))
            .unwrap();
        let coverage = part.matches[0].breakdown.coverage_score;
        assert!(coverage > 0.0 && coverage < 100.0);
    }

    #[test]
    fn test_region_table_from_json() {
        let table = RegionTable::from_json(
            r#"[
                {"code": "on", "name": "Ontario", "region": "Central"},
                {"code": "QC", "name": "Quebec", "region": "Central"},
                {"code": "BC", "name": "British Columbia", "region": "Pacific"}
            ]"#,
        )
        .unwrap();
        assert_eq!(table.state_count(), 3);

        let at = |state: &str| Location { city: String::new(), state: state.to_string() };
        assert_eq!(table.location_score(&at("ON"), &at("ontario")), 100.0);
        assert_eq!(table.location_score(&at("ON"), &at("QC")), 75.0);
        assert_eq!(table.location_score(&at("ON"), &at("BC")), 25.0);
        assert_eq!(table.location_score(&at("ON"), &at("TX")), 25.0);

        assert!(RegionTable::from_json("[]").is_err());
        let err = RegionTable::from_json(
            r#"[{"code": "ON", "region": "Central"}, {"code": "on", "region": "Pacific"}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate state code"));
    }

    #[test]
    fn test_custom_regions_drive_location_score() {
        let regions = RegionTable::from_json(
            r#"[{"code": "TX", "region": "Gulf"}, {"code": "LA", "region": "Gulf"}]"#,
        )
        .unwrap();
        let items = vec![item("chair", "furniture", 1, 100)];
        let suppliers = vec![supplier("s1", "LA", &["furniture"], 10_000)];

        let set = SupplierMatcher::new(regions)
            .match_suppliers(&items, &suppliers, &params("TX", 0.0))
            .unwrap();
        assert_eq!(set.matches[0].breakdown.location_score, 75.0);
    }

    #[test]
    fn test_oversized_costs_do_not_panic() {
        let mut huge = item("yacht", "furniture", 2, 0);
        huge.unit_price = Decimal::MAX;
        let mut also_huge = item("jet", "furniture", 1, 0);
        also_huge.unit_price = Decimal::MAX;
        let items = vec![item("chair", "furniture", 1, 100), huge, also_huge];

        let mut unbounded = supplier("s1", "TX", &["furniture"], 0);
        unbounded.max_order_value = Decimal::MAX;

        let set = SupplierMatcher::default()
            .match_suppliers(&items, &[unbounded], &params("TX", 0.0))
            .unwrap();
        let m = &set.matches[0];
        // "yacht" overflows on its own, "jet" overflows the running total
        let ids: Vec<&str> = m.matched_items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["chair"]);
        assert_eq!(m.estimated_total_cost, Decimal::from(100));
        assert_eq!(set.unmatched_items.len(), 2);
        assert!(set
            .unmatched_items
            .iter()
            .all(|u| u.reason == UnmatchedReason::InsufficientCapacity));

        assert_eq!(capacity_score(Decimal::MAX, Decimal::MAX, false), 75.0);
    }

    #[test]
    fn test_ranking_uses_unrounded_total() {
        let evaluation = |id: &str, raw_total: f64, coverage: f64| Evaluation {
            scored: SupplierMatch {
                supplier_id: id.to_string(),
                supplier_name: id.to_string(),
                total_score: round2(raw_total),
                breakdown: ScoreBreakdown {
                    category_score: 100.0,
                    location_score: 100.0,
                    capacity_score: 100.0,
                    coverage_score: coverage,
                },
                matched_items: vec![],
                estimated_total_cost: Decimal::ZERO,
            },
            raw_total,
            covered: HashSet::new(),
        };
        let ahead = evaluation("b-ahead", 70.004, 50.0);
        let behind = evaluation("a-behind", 70.001, 100.0);
        assert_eq!(ahead.scored.total_score, behind.scored.total_score);

        assert_eq!(rank_order(&ahead, &behind), std::cmp::Ordering::Less);
        assert_eq!(rank_order(&behind, &ahead), std::cmp::Ordering::Greater);
    }
}
