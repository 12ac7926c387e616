//! # Ledger Events
//!
//! Every mutation of a [`TaxCalculation`](crate::TaxCalculation) emits one
//! [`LedgerEvent`], keyed by calculation id and the record version the
//! mutation produced. The event log is append-only and is what the
//! Postgres backend stores in `tax_calculation_events`.

use serde::{Deserialize, Serialize};
use vtax_core::{ActorId, CalculationId, CompanyId, Timestamp};

use crate::calculation::CalculationType;
use crate::status::CalculationStatus;

/// What happened to a calculation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEventKind {
    /// The record was created.
    Created {
        calculation_type: CalculationType,
        digest: String,
        adjusts: Option<CalculationId>,
    },
    /// The status moved.
    StatusChanged {
        from: CalculationStatus,
        to: CalculationStatus,
        reason: String,
    },
    /// A reviewer validated the record.
    Validated {
        notes: Option<String>,
    },
    /// A non-status change was logged.
    Changed {
        action: String,
    },
}

impl LedgerEventKind {
    /// Event name, as stored in the `event_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::StatusChanged { .. } => "status_changed",
            Self::Validated { .. } => "validated",
            Self::Changed { .. } => "changed",
        }
    }
}

/// One entry of a calculation's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Calculation the event belongs to.
    pub calculation_id: CalculationId,
    /// Owning tenant.
    pub company_id: CompanyId,
    /// Record version after the mutation. Unique per calculation.
    pub version: u64,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
    /// Who caused it.
    pub actor: ActorId,
    /// When.
    pub at: Timestamp,
}
