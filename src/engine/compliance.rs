//! Rule-driven compliance classification
//!
//! Four domains are checked per item: fire safety, moisture resistance,
//! accessibility (ADA) dimensions and electrical certification. The result is
//! deterministic for a given item list and rule set.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::domain::{
    ComplianceIssue, ComplianceReport, ComplianceSummary, IssueType, Item, MoistureZone,
    Severity,
};

/// Accessible range for one kind of ADA-relevant item, in inches
#[derive(Debug, Clone)]
pub struct AdaRange {
    pub label: &'static str,
    /// Matched against the item's name, category and subcategory
    pub keywords: Vec<&'static str>,
    pub min_height_in: f64,
    pub max_height_in: f64,
}

/// Tunable rule tables for the classifier
#[derive(Debug, Clone)]
pub struct ComplianceRules {
    /// Normalized fragments identifying fire-rating standards
    pub fire_certifications: Vec<&'static str>,
    /// Normalized prefixes identifying electrical safety listings
    pub electrical_certifications: Vec<&'static str>,
    pub electrical_categories: Vec<&'static str>,
    pub wet_zone_disallowed: Vec<&'static str>,
    pub wet_zone_allowed: Vec<&'static str>,
    pub ada_ranges: Vec<AdaRange>,
}

impl Default for ComplianceRules {
    fn default() -> Self {
        Self {
            fire_certifications: vec![
                "CAL117", "TB117", "CAL133", "TB133", "NFPA701", "NFPA260", "ASTME84",
                "BS5852", "UL94", "UL723", "EN1021", "IMOFTP",
            ],
            electrical_certifications: vec!["UL", "ETL", "CE"],
            electrical_categories: vec!["electronic", "appliance", "lighting", "electrical"],
            wet_zone_disallowed: vec![
                "unsealed wood",
                "untreated wood",
                "raw wood",
                "particleboard",
                "particle board",
                "mdf",
                "medium density fiberboard",
                "chipboard",
                "raw steel",
            ],
            wet_zone_allowed: vec![
                "marine plywood",
                "stainless steel",
                "plastic",
                "ceramic",
                "glass",
                "sealed wood",
                "porcelain",
                "quartz",
                "solid surface",
                "aluminum",
                "acrylic",
            ],
            ada_ranges: vec![
                AdaRange {
                    label: "work surface",
                    keywords: vec!["desk", "table", "counter", "vanity", "workstation", "sink"],
                    min_height_in: 28.0,
                    max_height_in: 34.0,
                },
                AdaRange {
                    label: "grab bar",
                    keywords: vec!["grab bar"],
                    min_height_in: 33.0,
                    max_height_in: 36.0,
                },
                AdaRange {
                    label: "toilet seat",
                    keywords: vec!["toilet", "water closet"],
                    min_height_in: 17.0,
                    max_height_in: 19.0,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceClassifier {
    rules: ComplianceRules,
}

impl ComplianceClassifier {
    /// Evaluate every item and aggregate the findings into a report.
    pub fn classify(&self, items: &[Item]) -> ComplianceReport {
        let mut issues = Vec::new();

        for item in items {
            let start = issues.len();
            self.check_fire(item, &mut issues);
            self.check_moisture(item, &mut issues);
            self.check_ada(item, &mut issues);
            self.check_electrical(item, &mut issues);
            self.check_required_certifications(item, start, &mut issues);
        }

        let summary = summarize(items.len(), &issues);
        tracing::debug!(
            items = items.len(),
            issues = summary.total_issues,
            risk_score = summary.risk_score,
            "Compliance classification finished"
        );

        ComplianceReport {
            issues,
            summary,
            checked_at: Utc::now(),
        }
    }

    fn check_fire(&self, item: &Item, issues: &mut Vec<ComplianceIssue>) {
        if !item.compliance.fire_rating_required {
            return;
        }
        if item
            .compliance
            .certifications
            .iter()
            .any(|c| self.is_fire_certification(c))
        {
            return;
        }

        issues.push(issue(
            item,
            IssueType::FireSafety,
            Severity::Critical,
            format!("{} requires a fire rating but lists no fire certification", item.name),
            "Obtain a CAL TB 117 / NFPA 701 compliant alternative or documentation from the manufacturer",
        ));
    }

    fn check_moisture(&self, item: &Item, issues: &mut Vec<ComplianceIssue>) {
        if item.compliance.moisture_zone != MoistureZone::Wet {
            return;
        }

        let material = item
            .specifications
            .material
            .as_deref()
            .map(|m| m.trim().to_lowercase())
            .unwrap_or_default();

        // Disallowed terms first: "unsealed wood" contains "sealed wood"
        if let Some(bad) = self
            .rules
            .wet_zone_disallowed
            .iter()
            .find(|term| material.contains(*term))
        {
            issues.push(issue(
                item,
                IssueType::Moisture,
                Severity::Critical,
                format!("{} is specified in {} for a wet area", item.name, bad),
                "Substitute marine plywood, stainless steel, solid surface or sealed wood",
            ));
            return;
        }

        if self
            .rules
            .wet_zone_allowed
            .iter()
            .any(|term| material.contains(term))
        {
            return;
        }

        let description = if material.is_empty() {
            format!("{} is installed in a wet area but has no material listed", item.name)
        } else {
            format!(
                "{} is installed in a wet area; moisture resistance of '{}' is unverified",
                item.name, material
            )
        };
        issues.push(issue(
            item,
            IssueType::Moisture,
            Severity::Info,
            description,
            "Confirm the material is rated for wet locations",
        ));
    }

    fn check_ada(&self, item: &Item, issues: &mut Vec<ComplianceIssue>) {
        if !item.compliance.ada_relevant {
            return;
        }

        let haystack = format!("{} {} {}", item.name, item.category, item.subcategory).to_lowercase();
        let Some(range) = self
            .rules
            .ada_ranges
            .iter()
            .find(|r| r.keywords.iter().any(|k| haystack.contains(k)))
        else {
            return;
        };

        let height = item.specifications.dimensions.as_deref().and_then(parse_height_inches);
        match height {
            Some(h) if h < range.min_height_in || h > range.max_height_in => {
                issues.push(issue(
                    item,
                    IssueType::Ada,
                    Severity::Warning,
                    format!(
                        "{} {} height of {:.1}in is outside the accessible range of {}-{}in",
                        item.name, range.label, h, range.min_height_in, range.max_height_in
                    ),
                    "Select an adjustable or accessible-height model",
                ));
            }
            Some(_) => {}
            None => {
                issues.push(issue(
                    item,
                    IssueType::Ada,
                    Severity::Info,
                    format!("{} is ADA relevant but declares no height", item.name),
                    "Request dimensions from the supplier to verify accessible height",
                ));
            }
        }
    }

    fn check_electrical(&self, item: &Item, issues: &mut Vec<ComplianceIssue>) {
        if !self.is_electrical_item(item) {
            return;
        }
        if item
            .compliance
            .certifications
            .iter()
            .any(|c| self.is_electrical_certification(c))
        {
            return;
        }

        issues.push(issue(
            item,
            IssueType::Electrical,
            Severity::Critical,
            format!("{} is an electrical product without a UL or CE listing", item.name),
            "Require a UL/ETL listed or CE marked model",
        ));
    }

    /// Required certifications that are not held, in domains the classifier
    /// knows about. Skipped when the same domain already has a critical issue.
    fn check_required_certifications(
        &self,
        item: &Item,
        item_issues_start: usize,
        issues: &mut Vec<ComplianceIssue>,
    ) {
        let held: HashSet<String> = item
            .compliance
            .certifications
            .iter()
            .map(|c| normalize_certification(c))
            .collect();

        let mut missing = Vec::new();
        for required in &item.compliance.certifications_required {
            if held.contains(&normalize_certification(required)) {
                continue;
            }
            let domain = if self.is_fire_certification(required) {
                IssueType::FireSafety
            } else if self.is_electrical_certification(required) {
                IssueType::Electrical
            } else {
                continue;
            };
            let already_critical = issues[item_issues_start..]
                .iter()
                .any(|i| i.issue_type == domain && i.severity == Severity::Critical);
            if !already_critical {
                missing.push((domain, required.clone()));
            }
        }

        for (domain, cert) in missing {
            issues.push(issue(
                item,
                domain,
                Severity::Info,
                format!("{} requires {} which is not listed", item.name, cert),
                "Ask the supplier for the certificate before ordering",
            ));
        }
    }

    fn is_fire_certification(&self, cert: &str) -> bool {
        let normalized = normalize_certification(cert);
        self.rules
            .fire_certifications
            .iter()
            .any(|f| normalized.contains(f))
    }

    fn is_electrical_certification(&self, cert: &str) -> bool {
        let normalized = normalize_certification(cert);
        self.rules.electrical_certifications.iter().any(|prefix| {
            // "CE" only counts on its own or as "CE MARK"
            if *prefix == "CE" {
                normalized == "CE" || normalized == "CEMARK" || normalized == "CEMARKED"
            } else {
                normalized.starts_with(prefix)
            }
        })
    }

    fn is_electrical_item(&self, item: &Item) -> bool {
        let category = item.category.to_lowercase();
        let subcategory = item.subcategory.to_lowercase();
        self.rules
            .electrical_categories
            .iter()
            .any(|k| category.contains(k) || subcategory.contains(k))
    }
}

fn issue(
    item: &Item,
    issue_type: IssueType,
    severity: Severity,
    description: String,
    recommendation: &str,
) -> ComplianceIssue {
    ComplianceIssue {
        item_id: item.id.clone(),
        issue_type,
        severity,
        description,
        recommendation: recommendation.to_string(),
        affected_quantity: item.quantity,
    }
}

fn summarize(item_count: usize, issues: &[ComplianceIssue]) -> ComplianceSummary {
    let count = |s: Severity| issues.iter().filter(|i| i.severity == s).count();
    let risk: u32 = issues.iter().map(|i| i.severity.risk_weight()).sum();
    let items_with_issues = issues
        .iter()
        .map(|i| i.item_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    ComplianceSummary {
        total_issues: issues.len(),
        critical: count(Severity::Critical),
        warning: count(Severity::Warning),
        info: count(Severity::Info),
        risk_score: risk.min(100),
        items_with_issues,
        compliant_items: item_count.saturating_sub(items_with_issues),
    }
}

fn normalize_certification(cert: &str) -> String {
    cert.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

fn height_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // 30"H, 30 in H, 76cm height
            Regex::new(r#"(?i)(\d+(?:\.\d+)?)\s*("|in(?:ches|ch)?\.?|cm|mm)?\s*(?:h|height)(?:[^a-z]|$)"#)
                .expect("regex for value-first height"),
            // H: 30in, Height 30"
            Regex::new(r#"(?i)\b(?:h|height)\s*[:=]?\s*(\d+(?:\.\d+)?)\s*("|in(?:ches|ch)?|cm|mm)?"#)
                .expect("regex for label-first height"),
        ]
    })
}

/// Parse the height component of a free-form dimensions string, in inches.
///
/// Strings that open with a number list each value before its label
/// (`30"H x 48"W`); anything else is read label-first (`W 60in H 30in`).
pub fn parse_height_inches(dimensions: &str) -> Option<f64> {
    let [value_first, label_first] = height_patterns();
    let order = if dimensions.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
        [value_first, label_first]
    } else {
        [label_first, value_first]
    };

    order.into_iter().find_map(|pattern| {
        let cap = pattern.captures(dimensions)?;
        let value: f64 = cap.get(1)?.as_str().parse().ok()?;
        let inches = match cap.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
            Some("cm") => value / 2.54,
            Some("mm") => value / 25.4,
            _ => value,
        };
        Some(inches)
    })
}
