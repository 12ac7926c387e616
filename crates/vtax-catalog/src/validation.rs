//! # Catalog Validation
//!
//! Load-time checks over a whole [`TaxCatalog`]. Malformed configuration is
//! caught here rather than mid-calculation:
//!
//! - duplicate identifiers and duplicate jurisdiction codes
//! - jurisdiction tree: federal without parent, dangling parents, cycles
//! - rates: unknown jurisdiction/category, negative parameters, malformed
//!   tiers, inverted activity windows
//! - categories: reduced treatment without a reduced percentage
//! - profiles: required fields with no definition, unknown category binding
//! - exemptions: percent outside `0..=100`
//!
//! Errors make the catalog invalid. Warnings (e.g. no federal jurisdiction)
//! are reported but do not block loading.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vtax_core::JurisdictionId;

use crate::catalog::TaxCatalog;
use crate::category::TaxTreatment;
use crate::jurisdiction::JurisdictionType;
use crate::rate::{validate_tiers, RateModel};

/// One problem found in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    /// Location in the catalog document, e.g. `rates[2].conditions.tiers`.
    pub path: String,
    /// What is wrong.
    pub message: String,
}

impl ConfigIssue {
    /// Create an issue.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogValidation {
    /// Whether the catalog is usable.
    pub is_valid: bool,
    /// Blocking problems.
    pub errors: Vec<ConfigIssue>,
    /// Non-blocking problems.
    pub warnings: Vec<ConfigIssue>,
}

impl CatalogValidation {
    /// A passing result.
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error. Marks result as invalid.
    pub fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(ConfigIssue::new(path, message));
    }

    /// Add a warning (does not affect validity).
    pub fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigIssue::new(path, message));
    }
}

/// Validate every rule listed in the module docs.
pub fn validate_catalog(catalog: &TaxCatalog) -> CatalogValidation {
    let mut result = CatalogValidation::ok();
    validate_jurisdictions(catalog, &mut result);
    validate_categories(catalog, &mut result);
    validate_profiles(catalog, &mut result);
    validate_rates(catalog, &mut result);
    validate_exemptions(catalog, &mut result);
    result
}

fn check_duplicates<'a, T: Ord + std::fmt::Display + 'a>(
    section: &str,
    ids: impl Iterator<Item = &'a T>,
    result: &mut CatalogValidation,
) {
    let mut seen = BTreeSet::new();
    for (i, id) in ids.enumerate() {
        if !seen.insert(id) {
            result.add_error(format!("{section}[{i}].id"), format!("duplicate id {id}"));
        }
    }
}

fn validate_jurisdictions(catalog: &TaxCatalog, result: &mut CatalogValidation) {
    check_duplicates("jurisdictions", catalog.jurisdictions.iter().map(|j| &j.id), result);

    let by_id: BTreeMap<JurisdictionId, Option<JurisdictionId>> = catalog
        .jurisdictions
        .iter()
        .map(|j| (j.id, j.parent_id))
        .collect();

    let mut codes = BTreeSet::new();
    let mut has_federal = false;
    for (i, j) in catalog.jurisdictions.iter().enumerate() {
        let path = format!("jurisdictions[{i}]");
        if j.code.trim().is_empty() {
            result.add_error(format!("{path}.code"), "code must not be empty");
        } else if !codes.insert(j.code.trim().to_ascii_uppercase()) {
            // Codes key provider lines and breakdown rows.
            result.add_error(format!("{path}.code"), format!("duplicate code {}", j.code));
        }
        if j.jurisdiction_type == JurisdictionType::Federal {
            has_federal |= j.is_effective();
            if j.parent_id.is_some() {
                result.add_error(format!("{path}.parent_id"), "federal jurisdiction must not have a parent");
            }
        }
        if let Some(parent) = j.parent_id {
            if !by_id.contains_key(&parent) {
                result.add_error(format!("{path}.parent_id"), format!("unknown parent {parent}"));
            }
        }
        if let Some(b) = &j.boundaries {
            if b.polygon.len() < 3 {
                result.add_error(
                    format!("{path}.boundaries.polygon"),
                    "polygon needs at least 3 vertices",
                );
            }
        }

        // Walk the parent chain; revisiting a node means a cycle.
        let mut visited = BTreeSet::from([j.id]);
        let mut current = j.parent_id;
        while let Some(p) = current {
            if !visited.insert(p) {
                result.add_error(format!("{path}.parent_id"), "jurisdiction hierarchy contains a cycle");
                break;
            }
            current = by_id.get(&p).copied().flatten();
        }
    }

    if !has_federal {
        result.add_warning("jurisdictions", "no active federal jurisdiction; addresses may resolve to nothing");
    }
}

fn validate_categories(catalog: &TaxCatalog, result: &mut CatalogValidation) {
    check_duplicates("categories", catalog.categories.iter().map(|c| &c.id), result);

    for (i, c) in catalog.categories.iter().enumerate() {
        let uses_reduced = c.default_tax_treatment == TaxTreatment::Reduced
            || c.tax_rules.iter().any(|r| r.treatment == TaxTreatment::Reduced);
        match c.reduced_rate_percent {
            None if uses_reduced => result.add_error(
                format!("categories[{i}].reduced_rate_percent"),
                "reduced treatment requires reduced_rate_percent",
            ),
            Some(p) if p < Decimal::ZERO || p > Decimal::ONE_HUNDRED => result.add_error(
                format!("categories[{i}].reduced_rate_percent"),
                "must be between 0 and 100",
            ),
            _ => {}
        }
        if matches!(&c.service_types, Some(types) if types.is_empty()) {
            result.add_warning(
                format!("categories[{i}].service_types"),
                "empty service_types list matches nothing; omit it to match everything",
            );
        }
    }
}

fn validate_profiles(catalog: &TaxCatalog, result: &mut CatalogValidation) {
    check_duplicates("profiles", catalog.profiles.iter().map(|p| &p.id), result);

    for (i, p) in catalog.profiles.iter().enumerate() {
        if let Err(e) = p.get_validation_rules() {
            result.add_error(format!("profiles[{i}].required_fields"), e.to_string());
        }
        if let Some(cid) = &p.category_id {
            if catalog.category(cid).is_none() {
                result.add_error(format!("profiles[{i}].category_id"), format!("unknown category {cid}"));
            }
        }
    }
}

fn validate_rates(catalog: &TaxCatalog, result: &mut CatalogValidation) {
    check_duplicates("rates", catalog.rates.iter().map(|r| &r.id), result);

    for (i, r) in catalog.rates.iter().enumerate() {
        let path = format!("rates[{i}]");
        if catalog.jurisdiction(&r.jurisdiction_id).is_none() {
            result.add_error(
                format!("{path}.jurisdiction_id"),
                format!("unknown jurisdiction {}", r.jurisdiction_id),
            );
        }
        if catalog.category(&r.category_id).is_none() {
            result.add_error(
                format!("{path}.category_id"),
                format!("unknown category {}", r.category_id),
            );
        }
        match &r.model {
            RateModel::Percentage { percentage_rate } if percentage_rate.is_sign_negative() => {
                result.add_error(format!("{path}.percentage_rate"), "must not be negative");
            }
            RateModel::Fixed { fixed_amount }
            | RateModel::PerLine { fixed_amount }
            | RateModel::PerMinute { fixed_amount }
                if fixed_amount.is_sign_negative() =>
            {
                result.add_error(format!("{path}.fixed_amount"), "must not be negative");
            }
            RateModel::Tiered { conditions } => {
                if let Err(e) = validate_tiers(&conditions.tiers) {
                    result.add_error(format!("{path}.conditions.tiers"), e.to_string());
                }
            }
            _ => {}
        }
        if let (Some(min), Some(max)) = (r.minimum_threshold, r.maximum_amount) {
            if max.is_zero() && !min.is_zero() {
                result.add_warning(format!("{path}.maximum_amount"), "zero cap makes this rate a no-op");
            }
        }
        if let Some(expiry) = r.expiry_date {
            if expiry < r.effective_date {
                result.add_error(format!("{path}.expiry_date"), "expiry_date precedes effective_date");
            }
        }
    }
}

fn validate_exemptions(catalog: &TaxCatalog, result: &mut CatalogValidation) {
    check_duplicates("exemptions", catalog.exemptions.iter().map(|e| &e.id), result);

    for (i, e) in catalog.exemptions.iter().enumerate() {
        if e.exemption_percent < Decimal::ZERO || e.exemption_percent > Decimal::ONE_HUNDRED {
            result.add_error(
                format!("exemptions[{i}].exemption_percent"),
                "must be between 0 and 100",
            );
        }
        if e.exemption_type.trim().is_empty() {
            result.add_error(format!("exemptions[{i}].exemption_type"), "must not be empty");
        }
    }
}
