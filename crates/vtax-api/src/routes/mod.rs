//! # API Route Modules
//!
//! - `jurisdictions`: jurisdiction and category resolution for an address
//!   or service type.
//! - `calculations`: preview calculations, persist them into the ledger and
//!   drive their lifecycle (validate, apply, void, adjust).
//! - `catalog`: per-tenant catalog administration and rate change history.

pub mod calculations;
pub mod catalog;
pub mod jurisdictions;
