//! # vtax-ledger: Calculation Audit Ledger
//!
//! Persists every tax calculation as an immutable audit record. The
//! engine's result is stored as computed; what changes over a record's
//! life is its status, its review flag and its logs.
//!
//! - **Status** (`status.rs`): `draft → calculated → {applied, adjusted,
//!   voided}`, plus `applied → voided`.
//! - **Record** (`calculation.rs`): input and result snapshots, status
//!   history, bounded change log, validation stamp, adjustment links.
//! - **Events** (`event.rs`): one event per mutation, keyed by record
//!   version.
//! - **Ledger** (`ledger.rs`): tenant-scoped store with atomic,
//!   version-checked mutations.

pub mod calculation;
pub mod error;
pub mod event;
pub mod ledger;
pub mod status;

pub use calculation::{
    CalculableKind, CalculableRef, CalculationType, ChangeEntry, NewCalculation, StatusChange,
    TaxCalculation, TransitionEvidence, CHANGE_LOG_LIMIT,
};
pub use error::LedgerError;
pub use event::{LedgerEvent, LedgerEventKind};
pub use ledger::{Adjustment, CalculationLedger, LedgerWrite};
pub use status::CalculationStatus;
