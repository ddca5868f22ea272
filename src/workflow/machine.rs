//! Stage state machine
//!
//! One method per stage. Every invocation follows the same cycle under the
//! workspace lock: load the state, check the precondition artifact, run the
//! stage logic, then commit the artifact together with the new
//! `currentStage` in one atomic write. Nothing is written when any step
//! fails.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::commands::{
    AcceptBidRequest, CompareBidsRequest, ContractRequest, DeliveryRequest, ExtractionRequest,
    MatchRequest, PurchaseOrderRequest, QualityControlRequest, RfqRequest, ShipmentRequest,
};
use crate::domain::{
    command_map, inspection_passed, AcceptedBid, ArtifactKey, Contract, ContractStatus, Delivery,
    DeliveryLine, ItemSource, PurchaseOrder, PurchaseOrderLine, QualityIssue, RfqBundle,
    RfqDocument, RfqLine, SentRfq, Shipment, Stage, StageOutcome, WorkflowState, WorkflowStatus,
};
use crate::engine::{BidComparator, ComplianceClassifier, MatchParams, RegionTable, SupplierMatcher};
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::{Extractor, Notifier, SupplierDirectory};
use crate::workflow::locks::{WorkspaceGuard, WorkspaceLocks};
use crate::workflow::store::{load_state, WorkflowStateStore};

const MAX_WORKSPACE_ID_LEN: usize = 128;
pub const MAX_RFQ_RESPONSE_DAYS: i64 = 365;

/// Tunables of the state machine
#[derive(Debug, Clone)]
pub struct MachineOptions {
    pub extraction_timeout: Duration,
    /// Applies to directory reads and RFQ delivery
    pub collaborator_timeout: Duration,
    pub rfq_response_days: i64,
    pub default_min_score: f64,
    pub default_max_results: usize,
    pub default_payment_terms: String,
    pub regions: RegionTable,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(120),
            collaborator_timeout: Duration::from_secs(30),
            rfq_response_days: 14,
            default_min_score: crate::engine::matcher::DEFAULT_MIN_SCORE,
            default_max_results: crate::engine::matcher::DEFAULT_MAX_RESULTS,
            default_payment_terms: "Net 30".to_string(),
            regions: RegionTable::us(),
        }
    }
}

/// External collaborators of the state machine
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn WorkflowStateStore>,
    pub extractor: Arc<dyn Extractor>,
    pub directory: Arc<dyn SupplierDirectory>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct StageStateMachine {
    store: Arc<dyn WorkflowStateStore>,
    extractor: Arc<dyn Extractor>,
    directory: Arc<dyn SupplierDirectory>,
    notifier: Arc<dyn Notifier>,
    classifier: ComplianceClassifier,
    matcher: SupplierMatcher,
    comparator: BidComparator,
    locks: WorkspaceLocks,
    options: MachineOptions,
}

impl StageStateMachine {
    pub fn new(collaborators: Collaborators, options: MachineOptions) -> Self {
        Self {
            store: collaborators.store,
            extractor: collaborators.extractor,
            directory: collaborators.directory,
            notifier: collaborators.notifier,
            classifier: ComplianceClassifier::default(),
            matcher: SupplierMatcher::new(options.regions.clone()),
            comparator: BidComparator::new(),
            locks: WorkspaceLocks::new(),
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStateStore> {
        &self.store
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// Workspaces with a stage invocation running or queued
    pub fn active_workspaces(&self) -> usize {
        self.locks.active_count()
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Produce the item set, from the caller or the extraction service.
    ///
    /// Has no precondition; re-running replaces the item set.
    pub async fn extraction(
        &self,
        workspace_id: &str,
        req: ExtractionRequest,
        request_id: Option<&str>,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::Extraction).await?;
        let state = self.load(workspace_id, Stage::Extraction).await?;

        let item_set = match req.item_set {
            Some(mut item_set) => {
                item_set.total_estimated_cost =
                    item_set.validate().map_err(WorkflowError::InvalidInput)?;
                item_set.source = ItemSource::Manual;
                item_set.extracted_at = Utc::now();
                item_set
            }
            None => {
                let document = req
                    .document
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| WorkflowError::invalid("either document or itemSet is required"))?;

                let limit = req
                    .timeout_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(self.options.extraction_timeout);

                let mut item_set = with_timeout(
                    limit,
                    "extraction",
                    self.extractor.extract(document, req.item_count_hint, request_id),
                )
                .await?;

                item_set.total_estimated_cost = item_set.validate().map_err(|reason| {
                    WorkflowError::upstream(format!("extraction returned an invalid item set: {}", reason))
                })?;
                item_set.source = ItemSource::Extractor;
                item_set
            }
        };

        let summary = format!(
            "Extracted {} items for '{}' with an estimated cost of {}",
            item_set.items.len(),
            item_set.project_name,
            item_set.total_estimated_cost
        );

        self.commit(&state, Stage::Extraction, Stage::Extraction, &item_set, summary)
            .await
    }

    pub async fn compliance(&self, workspace_id: &str) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::Compliance).await?;
        let state = self.load(workspace_id, Stage::Compliance).await?;
        let item_set = required(&state.artifacts.item_set, Stage::Extraction)?;

        let report = self.classifier.classify(&item_set.items);
        let summary = format!(
            "{} compliance issues ({} critical, {} warning, {} info), risk score {}",
            report.summary.total_issues,
            report.summary.critical,
            report.summary.warning,
            report.summary.info,
            report.summary.risk_score
        );

        self.commit(&state, Stage::Compliance, Stage::Compliance, &report, summary)
            .await
    }

    pub async fn supplier_matching(
        &self,
        workspace_id: &str,
        req: MatchRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::SupplierMatching).await?;
        let state = self.load(workspace_id, Stage::SupplierMatching).await?;
        let item_set = required(&state.artifacts.item_set, Stage::Extraction)?;

        let suppliers = with_timeout(
            self.options.collaborator_timeout,
            "supplier directory",
            self.directory.list_suppliers(),
        )
        .await?;

        let params = MatchParams {
            buyer_location: req.buyer_location,
            min_score: req.min_score.unwrap_or(self.options.default_min_score),
            max_results: req.max_results.unwrap_or(self.options.default_max_results),
        };
        let match_set = self.matcher.match_suppliers(&item_set.items, &suppliers, &params)?;

        let summary = match match_set.matches.first() {
            Some(best) => format!(
                "{} suppliers matched, best is {} at {:.2}; {} items unmatched",
                match_set.matches.len(),
                best.supplier_name,
                best.total_score,
                match_set.unmatched_items.len()
            ),
            None => format!(
                "No supplier scored at least {}; {} items unmatched",
                match_set.min_score,
                match_set.unmatched_items.len()
            ),
        };

        self.commit(
            &state,
            Stage::SupplierMatching,
            Stage::SupplierMatching,
            &match_set,
            summary,
        )
        .await
    }

    /// Send one RFQ per matched supplier.
    pub async fn rfq(&self, workspace_id: &str, req: RfqRequest) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::Rfq).await?;
        let state = self.load(workspace_id, Stage::Rfq).await?;
        let match_set = required(&state.artifacts.match_set, Stage::SupplierMatching)?;
        let item_set = required(&state.artifacts.item_set, Stage::Extraction)?;

        if match_set.matches.is_empty() {
            return Err(WorkflowError::invalid(
                "no matched suppliers to send RFQs to; re-run supplier matching with a lower minScore",
            ));
        }

        let response_days = req.response_days.unwrap_or(self.options.rfq_response_days);
        if !(1..=MAX_RFQ_RESPONSE_DAYS).contains(&response_days) {
            return Err(WorkflowError::invalid(format!(
                "responseDays must be between 1 and {}, got {}",
                MAX_RFQ_RESPONSE_DAYS, response_days
            )));
        }
        let response_due_by = ChronoDuration::try_days(response_days)
            .and_then(|window| Utc::now().checked_add_signed(window))
            .ok_or_else(|| WorkflowError::invalid("responseDays is out of range"))?;

        let documents: Vec<RfqDocument> = match_set
            .matches
            .iter()
            .map(|m| RfqDocument {
                rfq_id: rfq_id(workspace_id, &m.supplier_id, &match_set.matched_at.to_rfc3339()),
                supplier_id: m.supplier_id.clone(),
                supplier_name: m.supplier_name.clone(),
                project_name: item_set.project_name.clone(),
                items: m
                    .matched_items
                    .iter()
                    .filter_map(|mi| item_set.item(&mi.item_id))
                    .map(|item| RfqLine {
                        item_id: item.id.clone(),
                        name: item.name.clone(),
                        quantity: item.quantity,
                        specifications: item.specifications.clone(),
                    })
                    .collect(),
                delivery_location: match_set.buyer_location.clone(),
                response_due_by,
                notes: req.notes.clone(),
            })
            .collect();

        let limit = req
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.options.collaborator_timeout);

        let acks = with_timeout(
            limit,
            "rfq delivery",
            futures::future::try_join_all(
                documents
                    .iter()
                    .map(|doc| self.notifier.send_rfq(&doc.supplier_id, doc)),
            ),
        )
        .await?;

        let sent_at = Utc::now();
        let bundle = RfqBundle {
            rfqs: documents
                .into_iter()
                .zip(acks)
                .map(|(document, acknowledgement)| SentRfq {
                    document,
                    acknowledgement,
                    sent_at,
                })
                .collect(),
            issued_at: sent_at,
        };

        let summary = format!(
            "Sent {} RFQs, responses due by {}",
            bundle.rfqs.len(),
            response_due_by.format("%Y-%m-%d")
        );

        self.commit(&state, Stage::Rfq, Stage::Rfq, &bundle, summary).await
    }

    pub async fn bid_comparison(
        &self,
        workspace_id: &str,
        req: CompareBidsRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::BidComparison).await?;
        let state = self.load(workspace_id, Stage::BidComparison).await?;
        let bundle = required(&state.artifacts.rfq_bundle, Stage::Rfq)?;

        if let Some(stray) = req.bids.iter().find(|b| !bundle.includes_supplier(&b.supplier_id)) {
            return Err(WorkflowError::invalid(format!(
                "bid '{}' comes from supplier '{}' which received no RFQ",
                stray.bid_id, stray.supplier_id
            )));
        }

        let comparison = self
            .comparator
            .compare(&req.bids, req.weights.unwrap_or_default())?;

        let winner = comparison
            .score(&comparison.winning_bid_id)
            .map(|s| format!("{} ({:.2})", s.supplier_id, s.overall_score))
            .unwrap_or_default();
        let summary = format!(
            "Compared {} bids, best is {}; potential savings {}",
            comparison.scores.len(),
            winner,
            comparison.cost_breakdown.potential_savings
        );

        self.commit(
            &state,
            Stage::BidComparison,
            Stage::BidComparison,
            &comparison,
            summary,
        )
        .await
    }

    /// Accept the winning bid, or another one with a stated reason.
    pub async fn bid_accepted(
        &self,
        workspace_id: &str,
        req: AcceptBidRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::BidAccepted).await?;
        let state = self.load(workspace_id, Stage::BidAccepted).await?;
        let comparison = required(&state.artifacts.bid_comparison, Stage::BidComparison)?;

        let bid_id = req
            .bid_id
            .unwrap_or_else(|| comparison.winning_bid_id.clone());
        let (Some(bid), Some(score)) = (comparison.bid(&bid_id), comparison.score(&bid_id)) else {
            return Err(WorkflowError::invalid(format!(
                "bid '{}' is not part of the comparison",
                bid_id
            )));
        };

        let override_reason = req
            .override_reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if bid_id != comparison.winning_bid_id && override_reason.is_none() {
            return Err(WorkflowError::invalid(format!(
                "bid '{}' is ranked {}; an overrideReason is required to accept it over '{}'",
                bid_id, score.rank, comparison.winning_bid_id
            )));
        }

        let accepted = AcceptedBid {
            bid_id: bid.bid_id.clone(),
            supplier_id: bid.supplier_id.clone(),
            total_bid_amount: bid.total_bid_amount,
            overall_score: score.overall_score,
            rank: score.rank,
            accepted_at: Utc::now(),
            override_reason,
        };
        let summary = format!(
            "Accepted bid {} from {} for {}",
            accepted.bid_id, accepted.supplier_id, accepted.total_bid_amount
        );

        self.commit(&state, Stage::BidAccepted, Stage::BidAccepted, &accepted, summary)
            .await
    }

    pub async fn contract(
        &self,
        workspace_id: &str,
        req: ContractRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::Contract).await?;
        let state = self.load(workspace_id, Stage::Contract).await?;
        let accepted = required(&state.artifacts.accepted_bid, Stage::BidAccepted)?;
        let comparison = required(&state.artifacts.bid_comparison, Stage::BidComparison)?;

        let bid = comparison.bid(&accepted.bid_id).ok_or_else(|| {
            WorkflowError::invalid(format!(
                "accepted bid '{}' is no longer in the bid comparison; re-run bid acceptance",
                accepted.bid_id
            ))
        })?;

        let payment_terms = req
            .payment_terms
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.options.default_payment_terms.clone());

        let contract = Contract {
            contract_id: Uuid::new_v4(),
            bid_id: bid.bid_id.clone(),
            supplier_id: bid.supplier_id.clone(),
            amount: bid.total_bid_amount,
            payment_terms,
            warranty_years: bid.warranty_years,
            lead_time_weeks: bid.average_lead_time_weeks,
            special_conditions: req.special_conditions,
            status: ContractStatus::Draft,
            created_at: Utc::now(),
        };
        let summary = format!(
            "Drafted contract {} with {} for {}",
            contract.contract_id, contract.supplier_id, contract.amount
        );

        self.commit(&state, Stage::Contract, Stage::Contract, &contract, summary)
            .await
    }

    pub async fn purchase_order(
        &self,
        workspace_id: &str,
        req: PurchaseOrderRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::PurchaseOrder).await?;
        let state = self.load(workspace_id, Stage::PurchaseOrder).await?;
        let contract = required(&state.artifacts.contract, Stage::Contract)?;
        let match_set = required(&state.artifacts.match_set, Stage::SupplierMatching)?;

        let supplier = match_set.find(&contract.supplier_id).ok_or_else(|| {
            WorkflowError::invalid(format!(
                "supplier '{}' is not in the current match set",
                contract.supplier_id
            ))
        })?;

        let lines = supplier
            .matched_items
            .iter()
            .map(|mi| {
                let line_total = mi
                    .estimated_unit_price
                    .checked_mul(Decimal::from(mi.quantity))
                    .ok_or_else(|| {
                        WorkflowError::invalid(format!("line total for item '{}' is too large", mi.item_id))
                    })?;
                Ok(PurchaseOrderLine {
                    item_id: mi.item_id.clone(),
                    quantity: mi.quantity,
                    unit_price: mi.estimated_unit_price,
                    line_total,
                })
            })
            .collect::<WorkflowResult<Vec<_>>>()?;

        let issued_at = Utc::now();
        if let Some(date) = req.requested_delivery_date {
            if date < issued_at.date_naive() {
                return Err(WorkflowError::invalid("requestedDeliveryDate is in the past"));
            }
        }

        let order = PurchaseOrder {
            po_number: po_number(contract.contract_id, issued_at),
            contract_id: contract.contract_id,
            supplier_id: contract.supplier_id.clone(),
            lines,
            total_amount: contract.amount,
            delivery_address: req.delivery_address,
            requested_delivery_date: req.requested_delivery_date,
            issued_at,
        };
        let summary = format!(
            "Issued purchase order {} with {} lines for {}",
            order.po_number,
            order.lines.len(),
            order.total_amount
        );

        self.commit(
            &state,
            Stage::PurchaseOrder,
            Stage::PurchaseOrder,
            &order,
            summary,
        )
        .await
    }

    pub async fn shipment(
        &self,
        workspace_id: &str,
        req: ShipmentRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::Shipment).await?;
        let state = self.load(workspace_id, Stage::Shipment).await?;
        let order = required(&state.artifacts.purchase_order, Stage::PurchaseOrder)?;

        let carrier = non_blank(&req.carrier, "carrier")?;
        let tracking_number = non_blank(&req.tracking_number, "trackingNumber")?;

        let shipment = Shipment {
            shipment_id: Uuid::new_v4(),
            po_number: order.po_number.clone(),
            carrier,
            tracking_number,
            estimated_arrival: req.estimated_arrival,
            shipped_at: Utc::now(),
        };
        let summary = format!(
            "Shipment of {} via {} ({})",
            shipment.po_number, shipment.carrier, shipment.tracking_number
        );

        self.commit(&state, Stage::Shipment, Stage::Shipment, &shipment, summary)
            .await
    }

    /// Record receipt and flag lines whose quantity differs from the order.
    pub async fn delivery(
        &self,
        workspace_id: &str,
        req: DeliveryRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::Delivery).await?;
        let state = self.load(workspace_id, Stage::Delivery).await?;
        required(&state.artifacts.shipment, Stage::Shipment)?;
        let order = required(&state.artifacts.purchase_order, Stage::PurchaseOrder)?;

        let received_by = non_blank(&req.received_by, "receivedBy")?;

        let mut seen = HashSet::new();
        for received in &req.received_items {
            if order.line(&received.item_id).is_none() {
                return Err(WorkflowError::invalid(format!(
                    "item '{}' is not on purchase order {}",
                    received.item_id, order.po_number
                )));
            }
            if !seen.insert(received.item_id.as_str()) {
                return Err(WorkflowError::invalid(format!(
                    "item '{}' is listed twice",
                    received.item_id
                )));
            }
        }

        let lines: Vec<DeliveryLine> = order
            .lines
            .iter()
            .map(|line| DeliveryLine {
                item_id: line.item_id.clone(),
                quantity_ordered: line.quantity,
                quantity_received: req
                    .received_items
                    .iter()
                    .find(|r| r.item_id == line.item_id)
                    .map(|r| r.quantity_received)
                    .unwrap_or(line.quantity),
            })
            .collect();
        let discrepancies: Vec<DeliveryLine> =
            lines.iter().filter(|l| l.is_short()).cloned().collect();

        let delivery = Delivery {
            delivery_id: Uuid::new_v4(),
            po_number: order.po_number.clone(),
            received_by,
            received_at: Utc::now(),
            complete: discrepancies.is_empty(),
            lines,
            discrepancies,
            notes: req.notes,
        };
        let summary = if delivery.complete {
            format!("Delivery of {} received in full", delivery.po_number)
        } else {
            format!(
                "Delivery of {} received with {} discrepancies",
                delivery.po_number,
                delivery.discrepancies.len()
            )
        };

        self.commit(&state, Stage::Delivery, Stage::Delivery, &delivery, summary)
            .await
    }

    /// Record inspection findings. A pass completes the workflow.
    pub async fn quality_control(
        &self,
        workspace_id: &str,
        req: QualityControlRequest,
    ) -> WorkflowResult<StageOutcome> {
        let _guard = self.begin(workspace_id, Stage::QualityControl).await?;
        let state = self.load(workspace_id, Stage::QualityControl).await?;
        let delivery = required(&state.artifacts.delivery, Stage::Delivery)?;

        let inspector = non_blank(&req.inspector, "inspector")?;
        let recorded_at = Utc::now();

        let mut issues = Vec::with_capacity(req.findings.len());
        for finding in req.findings {
            let line = delivery
                .lines
                .iter()
                .find(|l| l.item_id == finding.item_id)
                .ok_or_else(|| {
                    WorkflowError::invalid(format!(
                        "item '{}' was not part of the delivery",
                        finding.item_id
                    ))
                })?;
            let description = non_blank(&finding.description, "description")?;
            let affected_quantity = finding.affected_quantity.unwrap_or(line.quantity_received);
            if affected_quantity > line.quantity_received {
                return Err(WorkflowError::invalid(format!(
                    "affectedQuantity {} exceeds the {} received units of '{}'",
                    affected_quantity, line.quantity_received, line.item_id
                )));
            }

            issues.push(QualityIssue {
                issue_id: Uuid::new_v4(),
                item_id: finding.item_id,
                description,
                severity: finding.severity,
                affected_quantity,
                inspector: inspector.clone(),
                recorded_at,
            });
        }

        let passed = inspection_passed(&issues);
        let advance_to = if passed {
            Stage::Completed
        } else {
            Stage::QualityControl
        };
        let summary = if passed {
            format!("Inspection passed with {} findings; workflow completed", issues.len())
        } else {
            format!(
                "Inspection failed with {} critical findings",
                issues
                    .iter()
                    .filter(|i| i.severity == crate::domain::Severity::Critical)
                    .count()
            )
        };

        self.commit(&state, Stage::QualityControl, advance_to, &issues, summary)
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn status(&self, workspace_id: &str) -> WorkflowResult<WorkflowStatus> {
        validate_workspace_id(workspace_id)?;
        let state = load_state(self.store.as_ref(), workspace_id).await?;

        Ok(WorkflowStatus {
            workspace_id: state.workspace_id.clone(),
            current_stage: state.current_stage,
            next_command: state.current_stage.next_command(),
            completed_stages: state.completed_stages(),
            commands: command_map(),
        })
    }

    pub async fn state(&self, workspace_id: &str) -> WorkflowResult<WorkflowState> {
        validate_workspace_id(workspace_id)?;
        load_state(self.store.as_ref(), workspace_id).await
    }

    /// One persisted record of a workspace, as stored.
    pub async fn artifact(
        &self,
        workspace_id: &str,
        key: &str,
    ) -> WorkflowResult<serde_json::Value> {
        validate_workspace_id(workspace_id)?;
        let key = ArtifactKey::parse(key)
            .ok_or_else(|| WorkflowError::NotFound(format!("Unknown artifact '{}'", key)))?;

        self.store.recall(workspace_id, key).await?.ok_or_else(|| {
            WorkflowError::NotFound(format!("Workspace '{}' has no {} yet", workspace_id, key))
        })
    }

    // ========================================================================
    // Cycle helpers
    // ========================================================================

    async fn begin(
        &self,
        workspace_id: &str,
        stage: Stage,
    ) -> WorkflowResult<WorkspaceGuard> {
        validate_workspace_id(workspace_id)?;
        tracing::debug!(workspace_id = workspace_id, stage = %stage, "Stage invoked");
        Ok(self.locks.acquire(workspace_id).await)
    }

    /// Load state and enforce the stage precondition.
    async fn load(&self, workspace_id: &str, stage: Stage) -> WorkflowResult<WorkflowState> {
        let state = load_state(self.store.as_ref(), workspace_id).await?;

        if let Some(missing) = stage.precondition().filter(|pre| !state.artifacts.has(*pre)) {
            tracing::debug!(
                workspace_id = workspace_id,
                stage = %stage,
                missing = %missing,
                "Stage precondition not met"
            );
            return Err(WorkflowError::PrecursorMissing(missing));
        }

        Ok(state)
    }

    /// Persist the artifact and the advanced stage in one batch.
    async fn commit<T: Serialize>(
        &self,
        state: &WorkflowState,
        stage: Stage,
        advance_to: Stage,
        artifact: &T,
        summary: String,
    ) -> WorkflowResult<StageOutcome> {
        let key = stage
            .artifact_key()
            .ok_or_else(|| anyhow::anyhow!("stage {} has no artifact", stage))?;
        let value = serde_json::to_value(artifact)
            .map_err(|e| anyhow::anyhow!("failed to serialize {}: {}", key, e))?;

        let current_stage = state.current_stage.max(advance_to);

        if current_stage == state.current_stage && state.current_stage != Stage::NotStarted {
            // Re-run of a stage the workflow already passed
            self.store.save(&state.workspace_id, key, value.clone()).await?;
        } else {
            let stage_value = serde_json::to_value(current_stage)
                .map_err(|e| anyhow::anyhow!("failed to serialize stage: {}", e))?;
            self.store
                .save_all(
                    &state.workspace_id,
                    vec![(key, value.clone()), (ArtifactKey::CurrentStage, stage_value)],
                )
                .await?;
        }

        tracing::info!(
            workspace_id = %state.workspace_id,
            stage = %stage,
            current_stage = %current_stage,
            summary = %summary,
            "Stage completed"
        );

        self.spawn_notify(&state.workspace_id, &summary);

        Ok(StageOutcome {
            workspace_id: state.workspace_id.clone(),
            stage,
            current_stage,
            summary,
            artifact: value,
        })
    }

    fn spawn_notify(&self, workspace_id: &str, summary: &str) {
        let notifier = self.notifier.clone();
        let workspace_id = workspace_id.to_string();
        let summary = summary.to_string();

        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&workspace_id, &summary).await {
                tracing::warn!(workspace_id = %workspace_id, error = %e, "Workflow notification failed");
            }
        });
    }
}

// ============================================================================
// Free helpers
// ============================================================================

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = WorkflowResult<T>>,
) -> WorkflowResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(collaborator = what, timeout_ms = limit.as_millis() as u64, "Collaborator timed out");
            Err(WorkflowError::UpstreamTimeout(format!(
                "{} did not finish within {}ms",
                what,
                limit.as_millis()
            )))
        }
    }
}

fn required<T>(artifact: &Option<T>, stage: Stage) -> WorkflowResult<&T> {
    artifact.as_ref().ok_or(WorkflowError::PrecursorMissing(stage))
}

fn non_blank(value: &str, field: &str) -> WorkflowResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::invalid(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn validate_workspace_id(workspace_id: &str) -> WorkflowResult<()> {
    let valid = !workspace_id.is_empty()
        && workspace_id.len() <= MAX_WORKSPACE_ID_LEN
        && workspace_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if !valid {
        return Err(WorkflowError::invalid(format!(
            "invalid workspace id '{}'",
            workspace_id
        )));
    }
    Ok(())
}

/// Stable across retries of the same matching run
fn rfq_id(workspace_id: &str, supplier_id: &str, matched_at: &str) -> Uuid {
    let name = format!("{}:{}:{}", workspace_id, supplier_id, matched_at);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn po_number(contract_id: Uuid, issued_at: chrono::DateTime<Utc>) -> String {
    let simple = contract_id.simple().to_string();
    format!(
        "PO-{}-{}",
        issued_at.format("%Y%m%d"),
        simple[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::domain::commands::{InspectionFinding, ReceivedItem};
    use crate::domain::{
        Bid, ComplianceFlags, Item, ItemSet, Location, MoistureZone, RfqAck, Severity, Specifications,
        Supplier,
    };
    use crate::services::StaticSupplierDirectory;
    use crate::workflow::store::MemoryStateStore;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    struct FakeExtractor {
        item_set: ItemSet,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeExtractor {
        fn new(item_set: ItemSet) -> Self {
            Self {
                item_set,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(
            &self,
            _document: &str,
            _item_count_hint: Option<u32>,
            _request_id: Option<&str>,
        ) -> WorkflowResult<ItemSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.item_set.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        rfqs: Mutex<Vec<RfqDocument>>,
        fail_rfqs: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_rfq(&self, _supplier_id: &str, rfq: &RfqDocument) -> WorkflowResult<RfqAck> {
            if self.fail_rfqs {
                return Err(WorkflowError::upstream("mail relay down"));
            }
            self.rfqs.lock().push(rfq.clone());
            Ok(RfqAck {
                delivered: true,
                reference: Some(format!("msg-{}", rfq.supplier_id)),
            })
        }

        async fn notify(&self, _workspace_id: &str, _message: &str) -> WorkflowResult<()> {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    fn item(id: &str, category: &str, subcategory: &str, name: &str, qty: u32, price: i64) -> Item {
        Item {
            id: id.to_string(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            name: name.to_string(),
            quantity: qty,
            unit_price: Decimal::from(price),
            specifications: Specifications::default(),
            compliance: ComplianceFlags::default(),
        }
    }

    /// Lobby chair without fire cert, MDF vanity in a wet zone, UL listed TV
    fn scenario_items() -> ItemSet {
        let mut chair = item("chair", "furniture", "seating", "Lobby Chair", 10, 250);
        chair.compliance.fire_rating_required = true;

        let mut vanity = item("vanity", "bathroom", "vanity", "Guest Vanity", 2, 800);
        vanity.specifications.material = Some("MDF".to_string());
        vanity.compliance.moisture_zone = MoistureZone::Wet;

        let mut tv = item("tv", "electronics", "television", "Lobby TV", 1, 1200);
        tv.compliance.certifications = vec!["UL".to_string()];

        ItemSet {
            project_name: "Hotel Lobby".to_string(),
            total_estimated_cost: Decimal::ZERO,
            items: vec![chair, vanity, tv],
            extracted_at: Utc::now(),
            source: ItemSource::Extractor,
        }
    }

    fn scenario_suppliers() -> Vec<Supplier> {
        vec![
            Supplier {
                id: "s1".to_string(),
                name: "Lone Star Furnishings".to_string(),
                location: Location {
                    city: "Austin".to_string(),
                    state: "TX".to_string(),
                },
                categories: vec!["furniture".to_string(), "bathroom".to_string()],
                max_order_value: Decimal::from(100_000),
                certifications: vec![],
            },
            Supplier {
                id: "s2".to_string(),
                name: "Cascade Electronics".to_string(),
                location: Location {
                    city: "Portland".to_string(),
                    state: "OR".to_string(),
                },
                categories: vec!["electronics".to_string()],
                max_order_value: Decimal::from(50_000),
                certifications: vec!["UL".to_string()],
            },
        ]
    }

    struct Harness {
        machine: StageStateMachine,
        store: Arc<MemoryStateStore>,
        extractor: Arc<FakeExtractor>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with(extractor: FakeExtractor, notifier: RecordingNotifier, options: MachineOptions) -> Harness {
        let store = Arc::new(MemoryStateStore::new());
        let extractor = Arc::new(extractor);
        let notifier = Arc::new(notifier);
        let machine = StageStateMachine::new(
            Collaborators {
                store: store.clone(),
                extractor: extractor.clone(),
                directory: Arc::new(StaticSupplierDirectory::new(scenario_suppliers())),
                notifier: notifier.clone(),
            },
            options,
        );
        Harness {
            machine,
            store,
            extractor,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeExtractor::new(scenario_items()),
            RecordingNotifier::default(),
            MachineOptions::default(),
        )
    }

    fn extract_document() -> ExtractionRequest {
        ExtractionRequest {
            document: Some("10 lobby chairs, 2 vanities, 1 TV".to_string()),
            ..Default::default()
        }
    }

    fn match_request() -> MatchRequest {
        MatchRequest {
            buyer_location: Location {
                city: "Dallas".to_string(),
                state: "TX".to_string(),
            },
            min_score: Some(50.0),
            max_results: None,
        }
    }

    fn bids() -> CompareBidsRequest {
        CompareBidsRequest {
            bids: vec![
                Bid {
                    bid_id: "bid-s1".to_string(),
                    supplier_id: "s1".to_string(),
                    total_bid_amount: Decimal::from(4_000),
                    average_lead_time_weeks: 4,
                    warranty_years: 2,
                    certifications_coverage_pct: 90.0,
                },
                Bid {
                    bid_id: "bid-s2".to_string(),
                    supplier_id: "s2".to_string(),
                    total_bid_amount: Decimal::from(4_500),
                    average_lead_time_weeks: 6,
                    warranty_years: 1,
                    certifications_coverage_pct: 80.0,
                },
            ],
            weights: None,
        }
    }

    async fn run_through_rfq(h: &Harness, ws: &str) {
        h.machine.extraction(ws, extract_document(), None).await.unwrap();
        h.machine.compliance(ws).await.unwrap();
        h.machine.supplier_matching(ws, match_request()).await.unwrap();
        h.machine.rfq(ws, RfqRequest::default()).await.unwrap();
    }

    async fn run_through_purchase_order(h: &Harness, ws: &str) {
        run_through_rfq(h, ws).await;
        h.machine.bid_comparison(ws, bids()).await.unwrap();
        h.machine.bid_accepted(ws, AcceptBidRequest::default()).await.unwrap();
        h.machine.contract(ws, ContractRequest::default()).await.unwrap();
        h.machine
            .purchase_order(ws, PurchaseOrderRequest::default())
            .await
            .unwrap();
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_extraction_runs_on_fresh_workspace() {
        let h = harness();
        let outcome = h.machine.extraction("ws-1", extract_document(), None).await.unwrap();

        assert_eq!(outcome.stage, Stage::Extraction);
        assert_eq!(outcome.current_stage, Stage::Extraction);

        let state = h.machine.state("ws-1").await.unwrap();
        let item_set = state.artifacts.item_set.unwrap();
        assert_eq!(item_set.items.len(), 3);
        // 10×250 + 2×800 + 1×1200
        assert_eq!(item_set.total_estimated_cost, Decimal::from(5_300));
    }

    #[tokio::test]
    async fn test_extraction_accepts_manual_item_set() {
        let h = harness();
        let req = ExtractionRequest {
            item_set: Some(scenario_items()),
            ..Default::default()
        };
        h.machine.extraction("ws-1", req, None).await.unwrap();

        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
        let state = h.machine.state("ws-1").await.unwrap();
        assert_eq!(state.artifacts.item_set.unwrap().source, ItemSource::Manual);
    }

    #[tokio::test]
    async fn test_extraction_without_input_is_rejected() {
        let h = harness();
        let err = h
            .machine
            .extraction("ws-1", ExtractionRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
        assert!(h.store.recall_all("ws-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_extractor_output_is_upstream_error() {
        let mut broken = scenario_items();
        broken.items[1].id = broken.items[0].id.clone();
        let h = harness_with(
            FakeExtractor::new(broken),
            RecordingNotifier::default(),
            MachineOptions::default(),
        );

        let err = h.machine.extraction("ws-1", extract_document(), None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Upstream(_)));
        assert!(h.store.recall_all("ws-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rfq_before_matching_names_missing_stage() {
        let h = harness();
        h.machine.extraction("ws-1", extract_document(), None).await.unwrap();

        let err = h.machine.rfq("ws-1", RfqRequest::default()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::PrecursorMissing(Stage::SupplierMatching)));

        let err = h.machine.compliance("ws-2").await.unwrap_err();
        assert!(matches!(err, WorkflowError::PrecursorMissing(Stage::Extraction)));
    }

    #[tokio::test]
    async fn test_compliance_rerun_is_idempotent() {
        let h = harness();
        h.machine.extraction("ws-1", extract_document(), None).await.unwrap();
        h.machine.compliance("ws-1").await.unwrap();
        let first = h.machine.state("ws-1").await.unwrap();

        h.machine.compliance("ws-1").await.unwrap();
        let second = h.machine.state("ws-1").await.unwrap();

        let a = first.artifacts.compliance_report.unwrap();
        let b = second.artifacts.compliance_report.unwrap();
        assert_eq!(a.issues, b.issues);
        assert_eq!(a.summary, b.summary);
        assert_eq!(first.current_stage, second.current_stage);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let h = harness();
        let ws = "hotel-lobby";

        h.machine.extraction(ws, extract_document(), None).await.unwrap();

        h.machine.compliance(ws).await.unwrap();
        let report = h.machine.state(ws).await.unwrap().artifacts.compliance_report.unwrap();
        assert_eq!(report.summary.critical, 2);
        assert!(report.issues.iter().all(|i| i.item_id != "tv"));

        h.machine.supplier_matching(ws, match_request()).await.unwrap();
        let matches = h.machine.state(ws).await.unwrap().artifacts.match_set.unwrap();
        assert_eq!(matches.matches.len(), 2);
        let s1 = &matches.matches[0];
        let s2 = &matches.matches[1];
        assert_eq!(s1.supplier_id, "s1");
        assert_eq!(s1.breakdown.location_score, 100.0);
        assert!((s1.breakdown.coverage_score - 200.0 / 3.0).abs() < 0.01);
        assert_eq!(s2.supplier_id, "s2");
        assert_eq!(s2.breakdown.location_score, 25.0);
        assert_eq!(s2.matched_items.len(), 1);
        assert_eq!(s2.matched_items[0].item_id, "tv");
        assert!(s1.total_score > s2.total_score);

        h.machine.rfq(ws, RfqRequest::default()).await.unwrap();
        assert_eq!(h.notifier.rfqs.lock().len(), 2);

        let outcome = h.machine.bid_comparison(ws, bids()).await.unwrap();
        assert_eq!(outcome.artifact["winningBidId"], "bid-s1");

        h.machine.bid_accepted(ws, AcceptBidRequest::default()).await.unwrap();
        let outcome = h.machine.contract(ws, ContractRequest::default()).await.unwrap();
        assert_eq!(outcome.artifact["status"], "draft");
        h.machine
            .purchase_order(ws, PurchaseOrderRequest::default())
            .await
            .unwrap();

        let order = h.machine.state(ws).await.unwrap().artifacts.purchase_order.unwrap();
        assert_eq!(order.supplier_id, "s1");
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_amount, Decimal::from(4_000));

        h.machine
            .shipment(
                ws,
                ShipmentRequest {
                    carrier: "UPS Freight".to_string(),
                    tracking_number: "1Z999".to_string(),
                    estimated_arrival: None,
                },
            )
            .await
            .unwrap();
        h.machine
            .delivery(
                ws,
                DeliveryRequest {
                    received_by: "Dock Manager".to_string(),
                    received_items: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();

        let outcome = h
            .machine
            .quality_control(
                ws,
                QualityControlRequest {
                    inspector: "QA Lead".to_string(),
                    findings: vec![InspectionFinding {
                        item_id: "chair".to_string(),
                        description: "Scuffed armrest".to_string(),
                        severity: Severity::Info,
                        affected_quantity: Some(1),
                    }],
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.current_stage, Stage::Completed);

        let status = h.machine.status(ws).await.unwrap();
        assert_eq!(status.current_stage, Stage::Completed);
        assert_eq!(status.next_command, None);
        assert_eq!(status.completed_stages.len(), 11);
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_state_untouched() {
        let h = harness();
        run_through_rfq(&h, "ws-1").await;
        let before = h.store.recall_all("ws-1").await.unwrap();

        // Weights summing to 110
        let mut req = bids();
        req.weights = Some(crate::domain::BidWeights {
            price: 50.0,
            quality: 30.0,
            lead_time: 20.0,
            compliance: 10.0,
        });
        let err = h.machine.bid_comparison("ws-1", req).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidWeights(_)));

        // Bid from a supplier that received no RFQ
        let mut req = bids();
        req.bids[0].supplier_id = "stranger".to_string();
        let err = h.machine.bid_comparison("ws-1", req).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));

        assert_eq!(h.store.recall_all("ws-1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_manual_item_set_with_overflowing_cost_is_rejected() {
        let mut items = scenario_items();
        items.items[0].unit_price = Decimal::MAX;
        let req = ExtractionRequest {
            item_set: Some(items),
            ..Default::default()
        };

        let h = harness();
        let err = h.machine.extraction("ws-1", req, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(ref msg) if msg.contains("too large")));
        assert!(h.store.recall_all("ws-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rfq_rejects_out_of_range_response_days() {
        let h = harness();
        h.machine.extraction("ws-1", extract_document(), None).await.unwrap();
        h.machine.compliance("ws-1").await.unwrap();
        h.machine.supplier_matching("ws-1", match_request()).await.unwrap();
        let before = h.store.recall_all("ws-1").await.unwrap();

        for days in [100_000_000, i64::MAX, 0, -3] {
            let req = RfqRequest {
                response_days: Some(days),
                ..Default::default()
            };
            let err = h.machine.rfq("ws-1", req).await.unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidInput(_)), "days = {}", days);
        }

        assert!(h.notifier.rfqs.lock().is_empty());
        assert_eq!(h.store.recall_all("ws-1").await.unwrap(), before);

        let req = RfqRequest {
            response_days: Some(MAX_RFQ_RESPONSE_DAYS),
            ..Default::default()
        };
        h.machine.rfq("ws-1", req).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_rfq_delivery_writes_nothing() {
        let h = harness_with(
            FakeExtractor::new(scenario_items()),
            RecordingNotifier {
                fail_rfqs: true,
                ..Default::default()
            },
            MachineOptions::default(),
        );
        h.machine.extraction("ws-1", extract_document(), None).await.unwrap();
        h.machine.compliance("ws-1").await.unwrap();
        h.machine.supplier_matching("ws-1", match_request()).await.unwrap();

        let err = h.machine.rfq("ws-1", RfqRequest::default()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Upstream(_)));

        let state = h.machine.state("ws-1").await.unwrap();
        assert!(state.artifacts.rfq_bundle.is_none());
        assert_eq!(state.current_stage, Stage::SupplierMatching);
    }

    #[tokio::test]
    async fn test_rerun_does_not_regress_current_stage() {
        let h = harness();
        run_through_rfq(&h, "ws-1").await;

        let outcome = h.machine.compliance("ws-1").await.unwrap();
        assert_eq!(outcome.current_stage, Stage::Rfq);

        let state = h.machine.state("ws-1").await.unwrap();
        assert_eq!(state.current_stage, Stage::Rfq);
        // Downstream artifacts survive
        assert!(state.artifacts.rfq_bundle.is_some());
    }

    #[tokio::test]
    async fn test_rfq_ids_are_stable_for_one_matching_run() {
        let h = harness();
        run_through_rfq(&h, "ws-1").await;
        h.machine.rfq("ws-1", RfqRequest::default()).await.unwrap();

        let sent = h.notifier.rfqs.lock();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].rfq_id, sent[2].rfq_id);
        assert_ne!(sent[0].rfq_id, sent[1].rfq_id);
    }

    #[tokio::test]
    async fn test_extraction_timeout() {
        let options = MachineOptions {
            extraction_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let h = harness_with(
            FakeExtractor::new(scenario_items()).slow(Duration::from_secs(5)),
            RecordingNotifier::default(),
            options,
        );

        let err = h.machine.extraction("ws-1", extract_document(), None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UpstreamTimeout(_)));
        assert!(h.store.recall_all("ws-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_workspace_invocations_serialize() {
        let h = harness_with(
            FakeExtractor::new(scenario_items()).slow(Duration::from_millis(30)),
            RecordingNotifier::default(),
            MachineOptions::default(),
        );

        let (a, b) = tokio::join!(
            h.machine.extraction("ws-1", extract_document(), None),
            h.machine.extraction("ws-1", extract_document(), None),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(h.extractor.max_in_flight.load(Ordering::SeqCst), 1);

        let (c, d) = tokio::join!(
            h.machine.extraction("ws-a", extract_document(), None),
            h.machine.extraction("ws-b", extract_document(), None),
        );
        assert!(c.is_ok() && d.is_ok());
        assert_eq!(h.extractor.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_accepting_runner_up_requires_reason() {
        let h = harness();
        run_through_rfq(&h, "ws-1").await;
        h.machine.bid_comparison("ws-1", bids()).await.unwrap();

        let err = h
            .machine
            .bid_accepted(
                "ws-1",
                AcceptBidRequest {
                    bid_id: Some("bid-s2".to_string()),
                    override_reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));

        let outcome = h
            .machine
            .bid_accepted(
                "ws-1",
                AcceptBidRequest {
                    bid_id: Some("bid-s2".to_string()),
                    override_reason: Some("Existing service agreement".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifact["bidId"], "bid-s2");
        assert_eq!(outcome.artifact["rank"], 2);
    }

    #[tokio::test]
    async fn test_delivery_discrepancies_and_failed_inspection() {
        let h = harness();
        let ws = "ws-1";
        run_through_purchase_order(&h, ws).await;
        h.machine
            .shipment(
                ws,
                ShipmentRequest {
                    carrier: "FedEx".to_string(),
                    tracking_number: "7712".to_string(),
                    estimated_arrival: None,
                },
            )
            .await
            .unwrap();

        let err = h
            .machine
            .delivery(
                ws,
                DeliveryRequest {
                    received_by: "Dock".to_string(),
                    received_items: vec![ReceivedItem {
                        item_id: "tv".to_string(),
                        quantity_received: 1,
                    }],
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));

        let outcome = h
            .machine
            .delivery(
                ws,
                DeliveryRequest {
                    received_by: "Dock".to_string(),
                    received_items: vec![ReceivedItem {
                        item_id: "chair".to_string(),
                        quantity_received: 8,
                    }],
                    notes: Some("two chairs back-ordered".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifact["complete"], false);
        assert_eq!(outcome.artifact["discrepancies"][0]["itemId"], "chair");

        let outcome = h
            .machine
            .quality_control(
                ws,
                QualityControlRequest {
                    inspector: "QA".to_string(),
                    findings: vec![InspectionFinding {
                        item_id: "vanity".to_string(),
                        description: "Cracked top".to_string(),
                        severity: Severity::Critical,
                        affected_quantity: None,
                    }],
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.current_stage, Stage::QualityControl);
        assert_eq!(outcome.artifact[0]["affectedQuantity"], 2);
    }

    #[tokio::test]
    async fn test_status_after_failed_inspection_points_back_to_quality_control() {
        let h = harness();
        let ws = "ws-1";
        run_through_purchase_order(&h, ws).await;
        h.machine
            .shipment(
                ws,
                ShipmentRequest {
                    carrier: "FedEx".to_string(),
                    tracking_number: "7712".to_string(),
                    estimated_arrival: None,
                },
            )
            .await
            .unwrap();
        h.machine
            .delivery(
                ws,
                DeliveryRequest {
                    received_by: "Dock".to_string(),
                    received_items: vec![],
                    notes: None,
                },
            )
            .await
            .unwrap();

        let failed = QualityControlRequest {
            inspector: "QA".to_string(),
            findings: vec![InspectionFinding {
                item_id: "vanity".to_string(),
                description: "Cracked top".to_string(),
                severity: Severity::Critical,
                affected_quantity: None,
            }],
        };
        h.machine.quality_control(ws, failed.clone()).await.unwrap();

        let status = h.machine.status(ws).await.unwrap();
        assert_eq!(status.current_stage, Stage::QualityControl);
        assert_eq!(status.next_command, Some(Stage::QualityControl));
        assert!(status.completed_stages.contains(&Stage::QualityControl));

        // A second failed inspection replaces the findings in place
        let mut again = failed;
        again.findings[0].item_id = "chair".to_string();
        h.machine.quality_control(ws, again).await.unwrap();
        let issues = h.store.recall(ws, ArtifactKey::QualityIssues).await.unwrap().unwrap();
        assert_eq!(issues[0]["itemId"], "chair");
        assert_eq!(h.machine.status(ws).await.unwrap().next_command, Some(Stage::QualityControl));

        // Rework passes
        let passed = QualityControlRequest {
            inspector: "QA".to_string(),
            findings: vec![],
        };
        let outcome = h.machine.quality_control(ws, passed).await.unwrap();
        assert_eq!(outcome.current_stage, Stage::Completed);
        assert_eq!(h.machine.status(ws).await.unwrap().next_command, None);
    }

    #[tokio::test]
    async fn test_artifact_query() {
        let h = harness();
        run_through_rfq(&h, "ws-1").await;

        let match_set = h.machine.artifact("ws-1", "matchSet").await.unwrap();
        assert_eq!(match_set["matches"][0]["supplierId"], "s1");

        let stage = h.machine.artifact("ws-1", "currentStage").await.unwrap();
        assert_eq!(stage, "rfq");

        let err = h.machine.artifact("ws-1", "contract").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        let err = h.machine.artifact("ws-1", "secrets").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_workspace_locks_are_released_after_stages() {
        let h = harness();
        run_through_rfq(&h, "ws-1").await;
        let _ = h.machine.compliance("ws-2").await.unwrap_err();
        assert_eq!(h.machine.active_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_status_of_fresh_workspace() {
        let h = harness();
        let status = h.machine.status("new-ws").await.unwrap();
        assert_eq!(status.current_stage, Stage::NotStarted);
        assert_eq!(status.next_command, Some(Stage::Extraction));
        assert!(status.completed_stages.is_empty());
        assert_eq!(status.commands.len(), 13);
    }

    #[tokio::test]
    async fn test_invalid_workspace_id() {
        let h = harness();
        let err = h.machine.status("has spaces").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn test_po_number_format() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        let at = chrono::DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(po_number(id, at), "PO-20240305-A1B2C3D4");
    }
}
