//! Ledger errors. A failed mutation leaves the stored record untouched.

use thiserror::Error;
use vtax_core::CalculationId;

use crate::status::CalculationStatus;

/// Why a ledger operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The state machine forbids the requested status change.
    #[error("invalid status transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: CalculationStatus,
        to: CalculationStatus,
        reason: String,
    },

    /// The stored result cannot be applied to an invoice.
    #[error("calculation {id} is incomplete: {reason}")]
    IncompleteCalculation { id: CalculationId, reason: String },

    /// Voided records accept no further mutation, status or otherwise.
    #[error("calculation {id} is voided and cannot be modified")]
    Voided { id: CalculationId },

    /// No such calculation for this tenant.
    #[error("calculation {0} not found")]
    NotFound(CalculationId),

    /// Optimistic concurrency check failed.
    #[error("calculation {id} is at version {actual}, expected {expected}")]
    VersionConflict {
        id: CalculationId,
        expected: u64,
        actual: u64,
    },
}
