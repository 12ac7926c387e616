//! # vtax-engine: Tax Determination
//!
//! Computes the taxes on one line item against a [`TaxCatalog`] snapshot:
//! which jurisdictions tax the service address, which category and profile
//! apply, and how the configured rates combine.
//!
//! ## Pipeline
//!
//! ```text
//! CalculationItem
//!   -> category + profile        (category)
//!   -> input validation          (vtax-catalog profiles)
//!   -> jurisdictions             (resolver, geo)
//!   -> per-rate amounts          (rate)
//!   -> two-pass composition      (composer)
//!   -> optional enrichment       (enrichment)
//!   -> CalculationResult + digest (calculator)
//! ```
//!
//! All arithmetic is [`rust_decimal::Decimal`]. Rate-level amounts are
//! rounded half away from zero to four places; display rounding is the
//! caller's business.
//!
//! [`TaxCatalog`]: vtax_catalog::TaxCatalog

pub mod address;
pub mod calculator;
pub mod category;
pub mod composer;
pub mod enrichment;
pub mod error;
pub mod geo;
pub mod rate;
pub mod resolver;

pub use address::ServiceAddress;
pub use calculator::{
    AppliedCategory, CalculationItem, CalculationResult, CalculationWarning, CalculatorOptions,
    TaxCalculator, MAX_TAXABLE_AMOUNT,
};
pub use category::{find_category, resolve_category, resolve_profile};
pub use composer::{
    compose, AppliedExemption, ComposeInput, Composition, JurisdictionBreakdown, LineKey,
    LinePolicy, LineSource, Pass, RateFailure, Settled, TaxLine, TotalsOverflow,
};
pub use enrichment::{
    enrich_composition, merge_external, ApiCallOutcome, ApiCallRecord, EnrichmentError,
    EnrichmentRequest, EnrichmentResponse, ExternalTaxLine, NoEnrichment, TaxEnrichment,
};
pub use error::{CalculationError, ConfigurationError};
pub use geo::point_in_polygon;
pub use rate::{calculate_compound_amount, calculate_tax_amount, RateContext, RateEvaluationError};
pub use resolver::{
    find_jurisdictions_for_address, JurisdictionMatch, JurisdictionResolution, MatchKind,
};
