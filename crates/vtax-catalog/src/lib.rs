//! # vtax-catalog: Tenant Tax Configuration
//!
//! Reference data the tax engine reads: [`Jurisdiction`]s, [`TaxCategory`]s,
//! [`TaxProfile`]s, [`VoipTaxRate`]s and [`TaxExemption`]s, grouped per tenant
//! in a [`TaxCatalog`].
//!
//! Conditional rules, tier brackets and field declarations are typed
//! structures validated when the catalog is loaded ([`validation`]), so
//! malformed configuration is reported with its location instead of
//! surfacing halfway through a calculation.
//!
//! ## Modules
//!
//! - [`jurisdiction`]: jurisdiction levels, geographic matchers, hierarchy
//! - [`category`]: service classification and treatment rules
//! - [`profile`]: engine binding and input validation rules
//! - [`rate`]: rate models, tier brackets, activity windows, patches
//! - [`exemption`]: client exemption certificates
//! - [`history`]: append-only rate change log
//! - [`catalog`]: the per-tenant snapshot and administrative edits
//! - [`validation`]: load-time checks
//! - [`loader`]: YAML/JSON loading
//! - [`seed`]: starter configuration for new tenants

pub mod catalog;
pub mod category;
pub mod error;
pub mod exemption;
pub mod history;
pub mod jurisdiction;
pub mod loader;
pub mod profile;
pub mod rate;
pub mod seed;
pub mod validation;

pub use catalog::TaxCatalog;
pub use category::{
    CategoryRule, CategoryType, ExemptionRule, RuleCondition, RuleContext, TaxCategory,
    TaxTreatment,
};
pub use error::{CatalogError, CatalogResult, FieldError, ProfileError};
pub use exemption::{ExemptionScope, TaxExemption};
pub use history::{FieldChange, RateChange, RateChangeAction};
pub use jurisdiction::{
    Boundaries, FilingFrequency, FilingRequirements, GeoPoint, Jurisdiction, JurisdictionType,
    TaxAuthority,
};
pub use loader::{load_catalog, CatalogFormat, LoadMode, LoadedCatalog};
pub use profile::{
    decimal_field, CalculationEngine, FieldDefinition, FieldType, TaxProfile, ValidationRule,
};
pub use rate::{
    validate_tiers, CalculationMethod, RateModel, RatePatch, RateType, TaxType, Tier,
    TierConditions, TierError, TierRate, VoipTaxRate,
};
pub use validation::{validate_catalog, CatalogValidation, ConfigIssue};
