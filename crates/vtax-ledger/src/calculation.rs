//! # Tax Calculation Record
//!
//! The audit entry for one calculation run against a quote, an invoice or
//! one of their items. The record keeps the full input snapshot and the
//! engine's result next to a status lifecycle, an append-only status
//! history and a bounded change log.
//!
//! The result snapshot is never rewritten. Voiding only moves the status;
//! correcting a calculation goes through an adjustment, which creates a
//! new record pointing back at this one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use vtax_core::{ActorId, CalculationId, CompanyId, Timestamp};
use vtax_engine::{CalculationItem, CalculationResult};

use crate::error::LedgerError;
use crate::event::{LedgerEvent, LedgerEventKind};
use crate::status::CalculationStatus;

/// Entries kept in [`TaxCalculation::change_log`]. Older entries are
/// dropped; the event log keeps the full trail.
pub const CHANGE_LOG_LIMIT: usize = 100;

// ─── Calculable References ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculableKind {
    /// A whole quote.
    Quote,
    /// A whole invoice.
    Invoice,
    /// One line on a quote.
    QuoteItem,
    /// One line on an invoice.
    InvoiceItem,
}

impl CalculableKind {
    /// Wire name, as stored in Postgres and used in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Invoice => "invoice",
            Self::QuoteItem => "quote_item",
            Self::InvoiceItem => "invoice_item",
        }
    }
}

impl std::fmt::Display for CalculableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The billing document (or line on it) a calculation was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalculableRef {
    /// Document or line kind.
    pub kind: CalculableKind,
    /// Identifier in the billing system. Not owned by the ledger.
    pub id: Uuid,
}

impl CalculableRef {
    /// Reference a document or line.
    pub fn new(kind: CalculableKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

/// What a calculation was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    /// Pricing a quote.
    Quote,
    /// Billing an invoice.
    Invoice,
    /// What-if run. Never persisted.
    Preview,
    /// Replacement for an earlier calculation.
    Adjustment,
}

impl CalculationType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Invoice => "invoice",
            Self::Preview => "preview",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for CalculationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Transition Evidence ─────────────────────────────────────────────

/// Who asked for a mutation, why, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvidence {
    /// Caller making the change.
    pub actor: ActorId,
    /// Free-text reason, copied into history and events.
    pub reason: String,
    /// When the change happened.
    pub at: Timestamp,
}

impl TransitionEvidence {
    /// Evidence stamped with the current time.
    pub fn new(actor: ActorId, reason: impl Into<String>) -> Self {
        Self {
            actor,
            reason: reason.into(),
            at: Timestamp::now(),
        }
    }

    /// Override the timestamp, for replays and tests.
    pub fn at(mut self, at: Timestamp) -> Self {
        self.at = at;
        self
    }
}

/// One entry of [`TaxCalculation::status_history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the change.
    pub from: CalculationStatus,
    /// Status after the change.
    pub to: CalculationStatus,
    /// Why the status moved.
    pub reason: String,
    /// Who moved it.
    pub actor: ActorId,
    /// When.
    pub at: Timestamp,
}

/// One entry of [`TaxCalculation::change_log`]: a non-status mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Short action name, e.g. `validated`.
    pub action: String,
    /// Action-specific detail.
    pub changes: Value,
    /// Who made the change.
    pub actor: ActorId,
    /// When.
    pub at: Timestamp,
}

// ─── Tax Calculation ─────────────────────────────────────────────────

/// Everything needed to record a fresh calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    /// Owning tenant.
    pub company_id: CompanyId,
    /// Document or line being taxed.
    pub calculable: CalculableRef,
    /// What the calculation is for.
    pub calculation_type: CalculationType,
    /// Input as the caller supplied it.
    pub input: CalculationItem,
    /// Engine output for `input`.
    pub result: CalculationResult,
}

/// A persisted calculation and its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCalculation {
    /// Ledger identifier.
    pub id: CalculationId,
    /// Owning tenant. Every lookup is scoped by it.
    pub company_id: CompanyId,
    /// Document or line being taxed.
    pub calculable: CalculableRef,
    /// What the calculation is for.
    pub calculation_type: CalculationType,
    /// Input exactly as the caller supplied it.
    pub input: CalculationItem,
    /// Engine output, including breakdown, exemptions, warnings and the
    /// external calls made.
    pub result: CalculationResult,
    /// Lifecycle status.
    pub status: CalculationStatus,
    /// Every status change, oldest first. Append-only.
    pub status_history: Vec<StatusChange>,
    /// Recent non-status changes, at most [`CHANGE_LOG_LIMIT`].
    pub change_log: Vec<ChangeEntry>,
    /// Set by a reviewer; independent of `status`.
    pub validated: bool,
    /// Reviewer who validated.
    pub validated_by: Option<ActorId>,
    /// When it was validated.
    pub validated_at: Option<Timestamp>,
    /// Reviewer notes.
    pub validation_notes: Option<String>,
    /// The calculation this one replaces, for adjustments.
    pub adjusts: Option<CalculationId>,
    /// The adjustment that replaced this calculation.
    pub superseded_by: Option<CalculationId>,
    /// Bumped by every mutation. Used for optimistic concurrency.
    pub version: u64,
    /// Actor who recorded the calculation.
    pub created_by: ActorId,
    /// When it was recorded.
    pub created_at: Timestamp,
    /// Time of the last mutation.
    pub updated_at: Timestamp,
}

impl TaxCalculation {
    /// Record a new calculation in `Calculated` status.
    ///
    /// Returns the record together with its `Created` event and the
    /// initial `Draft -> Calculated` status event.
    pub fn create(new: NewCalculation, evidence: &TransitionEvidence) -> (Self, Vec<LedgerEvent>) {
        Self::create_linked(new, None, evidence)
    }

    /// Record an adjustment that replaces `prior`.
    pub fn create_adjustment(
        mut new: NewCalculation,
        prior: CalculationId,
        evidence: &TransitionEvidence,
    ) -> (Self, Vec<LedgerEvent>) {
        new.calculation_type = CalculationType::Adjustment;
        Self::create_linked(new, Some(prior), evidence)
    }

    fn create_linked(
        new: NewCalculation,
        adjusts: Option<CalculationId>,
        evidence: &TransitionEvidence,
    ) -> (Self, Vec<LedgerEvent>) {
        let mut record = Self {
            id: CalculationId::new(),
            company_id: new.company_id,
            calculable: new.calculable,
            calculation_type: new.calculation_type,
            input: new.input,
            result: new.result,
            status: CalculationStatus::Draft,
            status_history: Vec::new(),
            change_log: Vec::new(),
            validated: false,
            validated_by: None,
            validated_at: None,
            validation_notes: None,
            adjusts,
            superseded_by: None,
            version: 0,
            created_by: evidence.actor,
            created_at: evidence.at,
            updated_at: evidence.at,
        };
        record.touch(evidence.at);
        let created = record.event(
            LedgerEventKind::Created {
                calculation_type: record.calculation_type,
                digest: record.result.digest.clone(),
                adjusts,
            },
            evidence,
        );
        let calculated = record.do_transition(CalculationStatus::Calculated, evidence);
        (record, vec![created, calculated])
    }

    /// Move to `to`, appending a status history entry.
    pub fn log_status_change(
        &mut self,
        to: CalculationStatus,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerEvent, LedgerError> {
        self.require_transition(to)?;
        Ok(self.do_transition(to, evidence))
    }

    /// Record a non-status mutation in the bounded change log.
    pub fn log_change(
        &mut self,
        action: impl Into<String>,
        changes: Value,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerEvent, LedgerError> {
        self.require_mutable()?;
        let action = action.into();
        self.push_change(action.clone(), changes, evidence);
        self.touch(evidence.at);
        Ok(self.event(LedgerEventKind::Changed { action }, evidence))
    }

    /// Mark the calculation as reviewed.
    ///
    /// Idempotent: validating an already validated record keeps the first
    /// validator and returns `None`. Status is not touched.
    pub fn validate(
        &mut self,
        notes: Option<String>,
        evidence: &TransitionEvidence,
    ) -> Result<Option<LedgerEvent>, LedgerError> {
        self.require_mutable()?;
        if self.validated {
            return Ok(None);
        }
        self.validated = true;
        self.validated_by = Some(evidence.actor);
        self.validated_at = Some(evidence.at);
        self.validation_notes = notes.clone();
        self.push_change(
            "validated".to_string(),
            serde_json::json!({ "notes": notes }),
            evidence,
        );
        self.touch(evidence.at);
        Ok(Some(self.event(LedgerEventKind::Validated { notes }, evidence)))
    }

    /// Attach to a finalized invoice (`Calculated -> Applied`).
    pub fn apply(&mut self, evidence: &TransitionEvidence) -> Result<LedgerEvent, LedgerError> {
        self.require_transition(CalculationStatus::Applied)?;
        self.require_complete()?;
        Ok(self.do_transition(CalculationStatus::Applied, evidence))
    }

    /// Make the record inert for billing. The result snapshot is kept.
    ///
    /// Voiding twice is a status transition out of `Voided` and fails with
    /// [`LedgerError::InvalidStateTransition`], like every other one.
    pub fn void(&mut self, evidence: &TransitionEvidence) -> Result<LedgerEvent, LedgerError> {
        self.log_status_change(CalculationStatus::Voided, evidence)
    }

    /// Mark as replaced by `replacement` (`Calculated -> Adjusted`).
    pub fn supersede(
        &mut self,
        replacement: CalculationId,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerEvent, LedgerError> {
        self.require_transition(CalculationStatus::Adjusted)?;
        self.superseded_by = Some(replacement);
        Ok(self.do_transition(CalculationStatus::Adjusted, evidence))
    }

    /// Why this record cannot be applied, if it cannot.
    pub fn incompleteness(&self) -> Option<String> {
        let r = &self.result;
        if r.digest.is_empty() {
            return Some("result has no digest".to_string());
        }
        if !r.errors.is_empty() {
            return Some(format!("{} rate(s) failed to evaluate", r.errors.len()));
        }
        if r.lines.is_empty() && r.jurisdictions.is_empty() {
            return Some("no jurisdictions or tax lines were composed".to_string());
        }
        None
    }

    /// Whether the record is voided and therefore frozen.
    pub fn is_voided(&self) -> bool {
        self.status == CalculationStatus::Voided
    }

    fn require_mutable(&self) -> Result<(), LedgerError> {
        if self.is_voided() {
            return Err(LedgerError::Voided { id: self.id });
        }
        Ok(())
    }

    fn require_transition(&self, to: CalculationStatus) -> Result<(), LedgerError> {
        if self.status.can_transition_to(to) {
            return Ok(());
        }
        let reason = if self.status.is_terminal() {
            format!("{} is terminal", self.status)
        } else {
            "not permitted by the calculation lifecycle".to_string()
        };
        Err(LedgerError::InvalidStateTransition {
            from: self.status,
            to,
            reason,
        })
    }

    fn require_complete(&self) -> Result<(), LedgerError> {
        match self.incompleteness() {
            Some(reason) => Err(LedgerError::IncompleteCalculation {
                id: self.id,
                reason,
            }),
            None => Ok(()),
        }
    }

    fn do_transition(&mut self, to: CalculationStatus, evidence: &TransitionEvidence) -> LedgerEvent {
        let from = self.status;
        self.status_history.push(StatusChange {
            from,
            to,
            reason: evidence.reason.clone(),
            actor: evidence.actor,
            at: evidence.at,
        });
        self.status = to;
        self.touch(evidence.at);
        self.event(
            LedgerEventKind::StatusChanged {
                from,
                to,
                reason: evidence.reason.clone(),
            },
            evidence,
        )
    }

    fn push_change(&mut self, action: String, changes: Value, evidence: &TransitionEvidence) {
        self.change_log.push(ChangeEntry {
            action,
            changes,
            actor: evidence.actor,
            at: evidence.at,
        });
        if self.change_log.len() > CHANGE_LOG_LIMIT {
            let excess = self.change_log.len() - CHANGE_LOG_LIMIT;
            self.change_log.drain(..excess);
        }
    }

    fn touch(&mut self, at: Timestamp) {
        self.version += 1;
        self.updated_at = at;
    }

    fn event(&self, kind: LedgerEventKind, evidence: &TransitionEvidence) -> LedgerEvent {
        LedgerEvent {
            calculation_id: self.id,
            company_id: self.company_id,
            version: self.version,
            kind,
            actor: evidence.actor,
            at: evidence.at,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vtax_catalog::seed::default_catalog;
    use vtax_core::ServiceType;
    use vtax_engine::{RateFailure, TaxCalculator};

    pub(crate) fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    pub(crate) fn evidence(reason: &str) -> TransitionEvidence {
        TransitionEvidence::new(ActorId::new(), reason).at(ts("2026-04-01T10:00:00Z"))
    }

    pub(crate) fn new_calculation(company_id: CompanyId) -> NewCalculation {
        let catalog =
            default_catalog(company_id, ActorId::new(), ts("2026-01-01T00:00:00Z")).unwrap();
        let input = CalculationItem::new(
            ServiceType::new("voip_fixed").unwrap(),
            dec!(100),
            ts("2026-03-01T00:00:00Z"),
        );
        let result = TaxCalculator::new(&catalog).calculate(input.clone()).unwrap();
        NewCalculation {
            company_id,
            calculable: CalculableRef::new(CalculableKind::InvoiceItem, Uuid::new_v4()),
            calculation_type: CalculationType::Invoice,
            input,
            result,
        }
    }

    fn created() -> TaxCalculation {
        TaxCalculation::create(new_calculation(CompanyId::new()), &evidence("calculated")).0
    }

    #[test]
    fn create_starts_calculated_with_one_history_entry() {
        let (calc, events) =
            TaxCalculation::create(new_calculation(CompanyId::new()), &evidence("calculated"));
        assert_eq!(calc.status, CalculationStatus::Calculated);
        assert_eq!(calc.status_history.len(), 1);
        assert_eq!(calc.status_history[0].from, CalculationStatus::Draft);
        assert_eq!(calc.status_history[0].to, CalculationStatus::Calculated);
        assert_eq!(calc.version, 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind.as_str(), "created");
        assert_eq!(events[1].version, calc.version);
    }

    #[test]
    fn apply_then_void() {
        let mut calc = created();
        calc.apply(&evidence("invoice finalized")).unwrap();
        assert_eq!(calc.status, CalculationStatus::Applied);
        calc.void(&evidence("invoice cancelled")).unwrap();
        assert_eq!(calc.status, CalculationStatus::Voided);
        assert_eq!(calc.status_history.len(), 3);
        assert_eq!(calc.status_history[2].reason, "invoice cancelled");
    }

    #[test]
    fn voiding_keeps_the_breakdown() {
        let mut calc = created();
        let before = calc.result.clone();
        calc.void(&evidence("quote rejected")).unwrap();
        assert_eq!(calc.result, before);
    }

    #[test]
    fn nothing_leaves_voided() {
        let mut calc = created();
        calc.void(&evidence("cancelled")).unwrap();
        let snapshot = calc.clone();
        for to in CalculationStatus::all() {
            let err = calc.log_status_change(*to, &evidence("retry")).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
        }
        assert!(matches!(
            calc.validate(None, &evidence("review")),
            Err(LedgerError::Voided { .. })
        ));
        assert!(matches!(
            calc.log_change("patch", Value::Null, &evidence("patch")),
            Err(LedgerError::Voided { .. })
        ));
        assert_eq!(calc, snapshot);
    }

    #[test]
    fn voiding_twice_is_an_invalid_transition() {
        let mut calc = created();
        calc.void(&evidence("cancelled")).unwrap();
        let version = calc.version;
        let err = calc.void(&evidence("again")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidStateTransition {
                from: CalculationStatus::Voided,
                to: CalculationStatus::Voided,
                reason: "voided is terminal".into(),
            }
        );
        assert_eq!(calc.version, version);
        assert_eq!(calc.status_history.len(), 2);
    }

    #[test]
    fn cannot_apply_twice() {
        let mut calc = created();
        calc.apply(&evidence("finalized")).unwrap();
        let err = calc.apply(&evidence("again")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidStateTransition {
                from: CalculationStatus::Applied,
                to: CalculationStatus::Applied,
                reason: "not permitted by the calculation lifecycle".into(),
            }
        );
    }

    #[test]
    fn incomplete_result_cannot_be_applied() {
        let mut calc = created();
        calc.result.errors.push(RateFailure {
            rate_id: vtax_core::RateId::new(),
            jurisdiction_id: vtax_core::JurisdictionId::new(),
            tax_name: "Broken".into(),
            reason: "malformed tiers".into(),
        });
        let before = calc.clone();
        let err = calc.apply(&evidence("finalized")).unwrap_err();
        assert!(matches!(err, LedgerError::IncompleteCalculation { .. }));
        assert_eq!(calc, before);
    }

    #[test]
    fn validation_is_idempotent_and_status_neutral() {
        let mut calc = created();
        let first = calc.validate(Some("looks right".into()), &evidence("review")).unwrap();
        assert!(first.is_some());
        let validator = calc.validated_by;
        let version = calc.version;

        let second = calc.validate(Some("again".into()), &evidence("review")).unwrap();
        assert!(second.is_none());
        assert_eq!(calc.validated_by, validator);
        assert_eq!(calc.validation_notes.as_deref(), Some("looks right"));
        assert_eq!(calc.version, version);
        assert_eq!(calc.status, CalculationStatus::Calculated);
        assert_eq!(calc.change_log.len(), 1);
    }

    #[test]
    fn change_log_keeps_the_last_hundred() {
        let mut calc = created();
        for i in 0..(CHANGE_LOG_LIMIT + 5) {
            calc.log_change("note", serde_json::json!({ "n": i }), &evidence("patch"))
                .unwrap();
        }
        assert_eq!(calc.change_log.len(), CHANGE_LOG_LIMIT);
        assert_eq!(calc.change_log[0].changes["n"], 5);
    }

    #[test]
    fn supersede_only_from_calculated() {
        let mut calc = created();
        let replacement = CalculationId::new();
        calc.supersede(replacement, &evidence("rate fix")).unwrap();
        assert_eq!(calc.status, CalculationStatus::Adjusted);
        assert_eq!(calc.superseded_by, Some(replacement));

        let mut applied = created();
        applied.apply(&evidence("finalized")).unwrap();
        assert!(applied.supersede(replacement, &evidence("late fix")).is_err());
        assert_eq!(applied.superseded_by, None);
    }
}
