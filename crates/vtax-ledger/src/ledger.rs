//! # Calculation Ledger
//!
//! Thread-safe in-memory store of [`TaxCalculation`] records and their
//! event logs, scoped by tenant.
//!
//! Every mutation runs under one `parking_lot` write lock: the record is
//! cloned, the change is applied to the clone, and only a fully successful
//! change replaces the stored record and appends its events. A failed
//! mutation writes nothing. Callers pass the version they last read; a
//! mismatch fails with [`LedgerError::VersionConflict`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use vtax_core::{CalculationId, CompanyId};
use vtax_engine::{CalculationItem, CalculationResult};

use crate::calculation::{
    CalculableRef, NewCalculation, StatusChange, TaxCalculation, TransitionEvidence,
};
use crate::error::LedgerError;
use crate::event::LedgerEvent;

/// A committed mutation: the record as stored and the events it appended.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerWrite {
    /// The record after the mutation.
    pub record: TaxCalculation,
    /// Events appended by the mutation, in version order. Empty when the
    /// mutation was a no-op.
    pub events: Vec<LedgerEvent>,
}

/// Result of [`CalculationLedger::adjust`].
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    /// The prior calculation, now `Adjusted`.
    pub superseded: LedgerWrite,
    /// The new `Adjustment` calculation.
    pub replacement: LedgerWrite,
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<CalculationId, TaxCalculation>,
    events: BTreeMap<CalculationId, Vec<LedgerEvent>>,
}

impl Inner {
    fn checked_out(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
    ) -> Result<TaxCalculation, LedgerError> {
        let record = self
            .records
            .get(id)
            .filter(|r| r.company_id == *company_id)
            .ok_or(LedgerError::NotFound(*id))?;
        if let Some(expected) = expected_version {
            if record.version != expected {
                return Err(LedgerError::VersionConflict {
                    id: *id,
                    expected,
                    actual: record.version,
                });
            }
        }
        Ok(record.clone())
    }

    fn commit(&mut self, record: TaxCalculation, events: Vec<LedgerEvent>) -> LedgerWrite {
        self.events
            .entry(record.id)
            .or_default()
            .extend(events.iter().cloned());
        self.records.insert(record.id, record.clone());
        LedgerWrite { record, events }
    }
}

/// Cheaply cloneable; all clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct CalculationLedger {
    inner: Arc<RwLock<Inner>>,
}

impl CalculationLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a fresh calculation in `Calculated` status.
    pub fn create(&self, new: NewCalculation, evidence: &TransitionEvidence) -> LedgerWrite {
        let (record, events) = TaxCalculation::create(new, evidence);
        tracing::info!(
            calculation_id = %record.id,
            company_id = %record.company_id,
            calculable = %record.calculable.kind,
            total_tax = %record.result.total_tax,
            "tax calculation recorded"
        );
        self.inner.write().commit(record, events)
    }

    /// Load a record and its events as previously persisted elsewhere.
    pub fn restore(&self, record: TaxCalculation, events: Vec<LedgerEvent>) {
        let mut inner = self.inner.write();
        inner.events.insert(record.id, events);
        inner.records.insert(record.id, record);
    }

    /// One of the tenant's calculations. Other tenants' ids are not found.
    pub fn get(&self, company_id: &CompanyId, id: &CalculationId) -> Option<TaxCalculation> {
        self.inner
            .read()
            .records
            .get(id)
            .filter(|r| r.company_id == *company_id)
            .cloned()
    }

    /// All of a tenant's calculations, optionally for one calculable,
    /// oldest first.
    pub fn list(
        &self,
        company_id: &CompanyId,
        calculable: Option<&CalculableRef>,
    ) -> Vec<TaxCalculation> {
        let mut out: Vec<TaxCalculation> = self
            .inner
            .read()
            .records
            .values()
            .filter(|r| r.company_id == *company_id)
            .filter(|r| calculable.map_or(true, |c| r.calculable == *c))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    /// Status history of one calculation, oldest first.
    pub fn history(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
    ) -> Result<Vec<StatusChange>, LedgerError> {
        self.get(company_id, id)
            .map(|r| r.status_history)
            .ok_or(LedgerError::NotFound(*id))
    }

    /// The full event log of one calculation, in version order.
    pub fn events(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let inner = self.inner.read();
        inner
            .records
            .get(id)
            .filter(|r| r.company_id == *company_id)
            .ok_or(LedgerError::NotFound(*id))?;
        Ok(inner.events.get(id).cloned().unwrap_or_default())
    }

    /// Mark a calculation as reviewed. Validating twice returns the
    /// record unchanged with no events.
    pub fn validate(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
        notes: Option<String>,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerWrite, LedgerError> {
        self.mutate(company_id, id, expected_version, |r| {
            Ok(r.validate(notes, evidence)?.into_iter().collect())
        })
    }

    /// Record a non-status change (metadata patch, re-review note).
    pub fn annotate(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
        action: &str,
        changes: serde_json::Value,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerWrite, LedgerError> {
        self.mutate(company_id, id, expected_version, |r| {
            Ok(vec![r.log_change(action, changes, evidence)?])
        })
    }

    /// Attach a complete calculation to its finalized document.
    pub fn apply(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerWrite, LedgerError> {
        self.mutate(company_id, id, expected_version, |r| {
            Ok(vec![r.apply(evidence)?])
        })
    }

    /// Void a calculation. The result snapshot is kept for audit.
    pub fn void(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
        evidence: &TransitionEvidence,
    ) -> Result<LedgerWrite, LedgerError> {
        self.mutate(company_id, id, expected_version, |r| {
            Ok(vec![r.void(evidence)?])
        })
    }

    /// Replace a calculation with a recomputed one.
    ///
    /// The prior record moves to `Adjusted` and points at the new
    /// `Adjustment` record, which points back. Both land together or
    /// neither does.
    pub fn adjust(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
        input: CalculationItem,
        result: CalculationResult,
        evidence: &TransitionEvidence,
    ) -> Result<Adjustment, LedgerError> {
        let mut inner = self.inner.write();
        let mut prior = inner.checked_out(company_id, id, expected_version)?;
        let new = NewCalculation {
            company_id: prior.company_id,
            calculable: prior.calculable,
            calculation_type: prior.calculation_type,
            input,
            result,
        };
        let (replacement, replacement_events) =
            TaxCalculation::create_adjustment(new, prior.id, evidence);
        let superseded_event = prior.supersede(replacement.id, evidence)?;

        tracing::info!(
            calculation_id = %prior.id,
            replacement_id = %replacement.id,
            company_id = %prior.company_id,
            "tax calculation adjusted"
        );
        let superseded = inner.commit(prior, vec![superseded_event]);
        let replacement = inner.commit(replacement, replacement_events);
        Ok(Adjustment {
            superseded,
            replacement,
        })
    }

    /// Run `f` against a copy of the record and keep the copy only if `f`
    /// succeeds. A mutation producing no events leaves the store as is.
    fn mutate(
        &self,
        company_id: &CompanyId,
        id: &CalculationId,
        expected_version: Option<u64>,
        f: impl FnOnce(&mut TaxCalculation) -> Result<Vec<LedgerEvent>, LedgerError>,
    ) -> Result<LedgerWrite, LedgerError> {
        let mut inner = self.inner.write();
        let mut record = inner.checked_out(company_id, id, expected_version)?;
        let events = f(&mut record).map_err(|e| {
            tracing::warn!(calculation_id = %id, error = %e, "ledger mutation rejected");
            e
        })?;
        if events.is_empty() {
            return Ok(LedgerWrite { record, events });
        }
        Ok(inner.commit(record, events))
    }
}
