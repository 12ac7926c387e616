#![deny(missing_docs)]

//! # vtax-core: Foundational Types for the VoIP Tax Engine
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies, only `serde`, `serde_json`,
//! `thiserror`, `chrono`, `uuid`, `sha2` and `rust_decimal`.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** You cannot pass a [`RateId`]
//!    where a [`JurisdictionId`] is expected, and tenant ([`CompanyId`]) and
//!    actor ([`ActorId`]) identity are explicit parameters, never ambient.
//!
//! 2. **Money is exact.** All amounts and rates are [`rust_decimal::Decimal`].
//!    Rate-level results keep [`money::TAX_SCALE`] decimal places; display
//!    values are rounded to [`money::DISPLAY_SCALE`].
//!
//! 3. **[`CanonicalBytes`] is the sole path to digest computation.** Every
//!    reproducibility digest flows through `CanonicalBytes::new()`, which
//!    rejects floats and emits key-sorted compact JSON.
//!
//! 4. **[`VtaxError`] hierarchy.** Structured errors with `thiserror`; no
//!    `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod money;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, ValidationError, VtaxError};
pub use identity::{
    ActorId, CalculationId, CategoryId, ClientId, CompanyId, ExemptionId, JurisdictionId,
    ProfileId, RateId, ServiceType,
};
pub use money::{parse_amount, round_display, round_tax, DISPLAY_SCALE, TAX_SCALE};
pub use temporal::Timestamp;
