//! # Line-Item Calculator
//!
//! Entry point of the engine. [`TaxCalculator::calculate`] takes one
//! [`CalculationItem`] through the full pipeline:
//!
//! 1. validate amounts
//! 2. resolve the category (falling back to the system default)
//! 3. resolve the profile and validate its declared inputs
//! 4. decide the treatment from the category rules
//! 5. resolve jurisdictions for the address
//! 6. compose the rates in two passes
//! 7. total, and digest the result
//!
//! [`TaxCalculator::calculate_enriched`] adds an external enrichment call
//! between steps 6 and 7.
//!
//! ## Reproducibility
//!
//! Every ordering in the pipeline is explicit, so the same catalog snapshot
//! and item always produce the same result. The result carries a SHA-256
//! digest of its canonical form; call records (which hold latencies) are
//! excluded from it.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vtax_catalog::{
    decimal_field, CalculationEngine, CategoryType, RuleContext, TaxCatalog, TaxCategory,
    TaxTreatment, TaxType,
};
use vtax_core::{
    round_tax, sha256_digest, CanonicalBytes, CategoryId, ClientId, CompanyId, ProfileId,
    ServiceType, Timestamp,
};

use crate::address::ServiceAddress;
use crate::category::{find_category, resolve_profile};
use crate::composer::{
    compose, AppliedExemption, ComposeInput, Composition, JurisdictionBreakdown, LinePolicy,
    RateFailure, TaxLine, TotalsOverflow,
};
use crate::enrichment::{enrich_composition, ApiCallOutcome, ApiCallRecord, EnrichmentRequest, TaxEnrichment};
use crate::error::{CalculationError, ConfigurationError};
use crate::rate::RateContext;
use crate::resolver::find_jurisdictions_for_address;

/// Largest taxable amount (`base_amount * quantity`) accepted: 10^15.
pub const MAX_TAXABLE_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

fn one() -> Decimal {
    Decimal::ONE
}

/// One line item to tax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationItem {
    /// Service classification key.
    pub service_type: ServiceType,
    /// Unit price.
    pub base_amount: Decimal,
    /// Units; the taxable amount is `base_amount * quantity`.
    #[serde(default = "one")]
    pub quantity: Decimal,
    /// Service address.
    #[serde(default)]
    pub address: ServiceAddress,
    /// Date the tax is determined for.
    pub date: Timestamp,
    /// Lines, for per-line rates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u32>,
    /// Minutes of usage, for per-minute rates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<Decimal>,
    /// Client being billed, for exemptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// Profile-declared inputs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl CalculationItem {
    /// An item of one unit with no address.
    pub fn new(service_type: ServiceType, base_amount: Decimal, date: Timestamp) -> Self {
        Self {
            service_type,
            base_amount,
            quantity: Decimal::ONE,
            address: ServiceAddress::default(),
            date,
            line_count: None,
            minutes: None,
            client_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Set the service address.
    pub fn with_address(mut self, address: ServiceAddress) -> Self {
        self.address = address;
        self
    }
}

/// A non-fatal condition the caller should see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalculationWarning {
    /// Nothing beyond federal matched the address.
    AmbiguousJurisdiction { message: String },
    /// No configured category covers the service type.
    DefaultCategory { service_type: String },
    /// The category rules selected special treatment.
    SpecialTreatment {
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule: Option<String>,
    },
    /// The external provider was unavailable.
    EnrichmentFallback { provider: String, reason: String },
}

/// Category as applied to the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCategory {
    /// Category id; nil for the system default.
    pub id: CategoryId,
    /// Name.
    pub name: String,
    /// Classification.
    pub category_type: CategoryType,
    /// Whether this is the fallback category.
    pub is_system_default: bool,
}

/// Full outcome of taxing one line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Tenant.
    pub company_id: CompanyId,
    /// Service type.
    pub service_type: ServiceType,
    /// Category applied.
    pub category: AppliedCategory,
    /// Profile applied; nil for the engine default.
    pub profile_id: ProfileId,
    /// Engine selected by the profile.
    pub engine: CalculationEngine,
    /// Treatment decided by the category rules.
    pub treatment: TaxTreatment,
    /// Rule that decided it, if not the category default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_rule: Option<String>,
    /// Unit price.
    pub base_amount: Decimal,
    /// Units.
    pub quantity: Decimal,
    /// `base_amount * quantity`.
    pub taxable_amount: Decimal,
    /// Normalized profile inputs.
    pub inputs: BTreeMap<String, Value>,
    /// Date taxed for.
    pub date: Timestamp,
    /// Tax lines.
    pub lines: Vec<TaxLine>,
    /// Charged tax per type.
    pub breakdown: BTreeMap<TaxType, Decimal>,
    /// Per-jurisdiction totals.
    pub jurisdictions: Vec<JurisdictionBreakdown>,
    /// Exemptions applied.
    pub exemptions_applied: Vec<AppliedExemption>,
    /// Rates skipped.
    pub errors: Vec<RateFailure>,
    /// Charged tax.
    pub total_tax: Decimal,
    /// Tax already included in the price.
    pub inclusive_tax: Decimal,
    /// `taxable_amount + total_tax`.
    pub final_amount: Decimal,
    /// `total_tax / taxable_amount * 100`, zero on a zero base.
    pub effective_tax_rate: Decimal,
    /// Non-fatal conditions.
    pub warnings: Vec<CalculationWarning>,
    /// External provider calls.
    pub api_calls: Vec<ApiCallRecord>,
    /// `sha256:<hex>` of the canonical result, excluding call records.
    pub digest: String,
}

impl CalculationResult {
    /// Whether nothing beyond federal matched the address.
    pub fn has_ambiguous_jurisdiction(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, CalculationWarning::AmbiguousJurisdiction { .. }))
    }
}

/// The deterministic subset of a result that the digest covers.
#[derive(Serialize)]
struct DigestView<'a> {
    company_id: &'a CompanyId,
    service_type: &'a ServiceType,
    category_id: &'a CategoryId,
    profile_id: &'a ProfileId,
    treatment: TaxTreatment,
    base_amount: Decimal,
    quantity: Decimal,
    inputs: &'a BTreeMap<String, Value>,
    date: &'a Timestamp,
    lines: &'a [TaxLine],
    breakdown: &'a BTreeMap<TaxType, Decimal>,
    exemptions_applied: &'a [AppliedExemption],
    errors: &'a [RateFailure],
    total_tax: Decimal,
    inclusive_tax: Decimal,
    final_amount: Decimal,
}

/// Calculator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculatorOptions {
    /// Use the system default category when none covers a service type.
    /// When false, such items fail with [`ConfigurationError::NoCategory`].
    pub allow_default_category: bool,
    /// Deadline for the external enrichment call.
    pub enrichment_timeout: Duration,
}

impl Default for CalculatorOptions {
    fn default() -> Self {
        Self {
            allow_default_category: true,
            enrichment_timeout: Duration::from_millis(2000),
        }
    }
}

/// Work done before totals are final.
struct Prepared {
    item: CalculationItem,
    category: TaxCategory,
    profile_id: ProfileId,
    engine: CalculationEngine,
    treatment: TaxTreatment,
    treatment_rule: Option<String>,
    taxable_amount: Decimal,
    inputs: BTreeMap<String, Value>,
    composition: Composition,
    warnings: Vec<CalculationWarning>,
}

/// Taxes line items against one catalog snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TaxCalculator<'a> {
    catalog: &'a TaxCatalog,
    options: CalculatorOptions,
}

impl<'a> TaxCalculator<'a> {
    /// A calculator with default options.
    pub fn new(catalog: &'a TaxCatalog) -> Self {
        Self {
            catalog,
            options: CalculatorOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: CalculatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Calculate from the catalog alone.
    pub fn calculate(&self, item: CalculationItem) -> Result<CalculationResult, CalculationError> {
        let prepared = self.prepare(item)?;
        self.finish(prepared, Vec::new())
    }

    /// Calculate, then ask `provider` for lines the catalog lacks.
    ///
    /// Provider failure degrades to the internal result with an
    /// [`CalculationWarning::EnrichmentFallback`].
    pub async fn calculate_enriched<E: TaxEnrichment>(
        &self,
        item: CalculationItem,
        provider: &E,
    ) -> Result<CalculationResult, CalculationError> {
        let mut prepared = self.prepare(item)?;
        if !prepared.category.is_taxable || prepared.treatment == TaxTreatment::Exempt {
            return self.finish(prepared, Vec::new());
        }
        let request = EnrichmentRequest {
            company_id: self.catalog.company_id,
            service_type: prepared.item.service_type.clone(),
            base_amount: prepared.taxable_amount,
            address: prepared.item.address.clone(),
            date: prepared.item.date,
        };
        let policy = LinePolicy {
            exemptions: &self.catalog.exemptions,
            category: &prepared.category,
            treatment: prepared.treatment,
            client_id: prepared.item.client_id.as_ref(),
            at: prepared.item.date,
        };
        let record = enrich_composition(
            provider,
            &request,
            self.options.enrichment_timeout,
            &policy,
            &mut prepared.composition,
        )
        .await;
        match &record.outcome {
            ApiCallOutcome::Failed { reason } => {
                prepared.warnings.push(CalculationWarning::EnrichmentFallback {
                    provider: record.provider.clone(),
                    reason: reason.clone(),
                });
            }
            ApiCallOutcome::TimedOut => {
                prepared.warnings.push(CalculationWarning::EnrichmentFallback {
                    provider: record.provider.clone(),
                    reason: "timed out".to_string(),
                });
            }
            ApiCallOutcome::Succeeded { .. } => {}
        }
        self.finish(prepared, vec![record])
    }

    fn prepare(&self, item: CalculationItem) -> Result<Prepared, CalculationError> {
        let taxable_amount = validate_amounts(&item)?;
        let mut warnings = Vec::new();

        let category = match find_category(self.catalog, &item.service_type) {
            Some(c) => c.clone(),
            None if self.options.allow_default_category => {
                warnings.push(CalculationWarning::DefaultCategory {
                    service_type: item.service_type.to_string(),
                });
                TaxCategory::system_default()
            }
            None => {
                return Err(ConfigurationError::NoCategory {
                    service_type: item.service_type.to_string(),
                }
                .into())
            }
        };

        let profile = resolve_profile(self.catalog, &category);
        let mut raw = item.fields.clone();
        if let Some(n) = item.line_count {
            raw.entry("line_count".to_string()).or_insert_with(|| Value::from(n));
        }
        if let Some(m) = item.minutes {
            raw.entry("minutes".to_string())
                .or_insert_with(|| Value::String(m.to_string()));
        }
        let inputs = profile.validate_inputs(&raw)?;

        let context = match profile.engine {
            CalculationEngine::VoipTelecom => RateContext {
                line_count: decimal_field(&inputs, "line_count")
                    .or(item.line_count.map(Decimal::from))
                    .unwrap_or(Decimal::ONE),
                minutes: decimal_field(&inputs, "minutes")
                    .or(item.minutes)
                    .unwrap_or(Decimal::ZERO),
            },
            CalculationEngine::General => RateContext::default(),
        };

        let (treatment, treatment_rule) = {
            let ctx = RuleContext {
                base_amount: taxable_amount,
                service_type: &item.service_type,
                state_code: item.address.state(),
                fields: &inputs,
            };
            let (t, rule) = category.treatment_for(&ctx);
            (t, rule.map(str::to_string))
        };
        if treatment == TaxTreatment::Special {
            warnings.push(CalculationWarning::SpecialTreatment {
                category: category.name.clone(),
                rule: treatment_rule.clone(),
            });
        }

        let resolution = if category.requires_jurisdiction_detection {
            let resolution = find_jurisdictions_for_address(self.catalog, &item.address);
            if resolution.is_ambiguous() {
                tracing::warn!(
                    company_id = %self.catalog.company_id,
                    service_type = %item.service_type,
                    "address matched no jurisdiction beyond federal"
                );
                warnings.push(CalculationWarning::AmbiguousJurisdiction {
                    message: "address matched no jurisdiction beyond federal".to_string(),
                });
            }
            resolution
        } else {
            find_jurisdictions_for_address(self.catalog, &item.address).federal_only()
        };

        let composition = compose(&ComposeInput {
            catalog: self.catalog,
            jurisdictions: &resolution.matches,
            category: &category,
            treatment,
            service_type: &item.service_type,
            base_amount: taxable_amount,
            context,
            client_id: item.client_id.as_ref(),
            at: item.date,
        })?;

        Ok(Prepared {
            profile_id: profile.id,
            engine: profile.engine,
            item,
            category,
            treatment,
            treatment_rule,
            taxable_amount,
            inputs,
            composition,
            warnings,
        })
    }

    fn finish(
        &self,
        p: Prepared,
        api_calls: Vec<ApiCallRecord>,
    ) -> Result<CalculationResult, CalculationError> {
        let Composition {
            lines,
            breakdown,
            jurisdictions,
            exemptions_applied,
            errors,
            total_tax,
            inclusive_tax,
        } = p.composition;
        let final_amount = p
            .taxable_amount
            .checked_add(total_tax)
            .ok_or(TotalsOverflow)?;
        let effective_tax_rate = if p.taxable_amount.is_zero() {
            Decimal::ZERO
        } else {
            total_tax
                .checked_mul(Decimal::ONE_HUNDRED)
                .and_then(|t| t.checked_div(p.taxable_amount))
                .map(round_tax)
                .ok_or(TotalsOverflow)?
        };

        let view = DigestView {
            company_id: &self.catalog.company_id,
            service_type: &p.item.service_type,
            category_id: &p.category.id,
            profile_id: &p.profile_id,
            treatment: p.treatment,
            base_amount: p.item.base_amount,
            quantity: p.item.quantity,
            inputs: &p.inputs,
            date: &p.item.date,
            lines: &lines,
            breakdown: &breakdown,
            exemptions_applied: &exemptions_applied,
            errors: &errors,
            total_tax,
            inclusive_tax,
            final_amount,
        };
        let digest = sha256_digest(&CanonicalBytes::new(&view)?).to_string();

        tracing::debug!(
            company_id = %self.catalog.company_id,
            service_type = %p.item.service_type,
            total_tax = %total_tax,
            lines = lines.len(),
            "line item calculated"
        );

        Ok(CalculationResult {
            company_id: self.catalog.company_id,
            service_type: p.item.service_type,
            category: AppliedCategory {
                id: p.category.id,
                name: p.category.name.clone(),
                category_type: p.category.category_type,
                is_system_default: p.category.is_system_default(),
            },
            profile_id: p.profile_id,
            engine: p.engine,
            treatment: p.treatment,
            treatment_rule: p.treatment_rule,
            base_amount: p.item.base_amount,
            quantity: p.item.quantity,
            taxable_amount: p.taxable_amount,
            inputs: p.inputs,
            date: p.item.date,
            lines,
            breakdown,
            jurisdictions,
            exemptions_applied,
            errors,
            total_tax,
            inclusive_tax,
            final_amount,
            effective_tax_rate,
            warnings: p.warnings,
            api_calls,
            digest,
        })
    }
}

/// Check amounts and return the taxable amount.
fn validate_amounts(item: &CalculationItem) -> Result<Decimal, CalculationError> {
    let mut fields = Vec::new();
    let mut reject = |field: &str, message: &str| {
        fields.push(vtax_catalog::FieldError {
            field: field.to_string(),
            message: message.to_string(),
        })
    };
    if item.base_amount.is_sign_negative() && !item.base_amount.is_zero() {
        reject("base_amount", "must not be negative");
    }
    if item.quantity <= Decimal::ZERO {
        reject("quantity", "must be greater than zero");
    }
    if item.minutes.is_some_and(|m| m.is_sign_negative() && !m.is_zero()) {
        reject("minutes", "must not be negative");
    }
    let taxable = item
        .base_amount
        .checked_mul(item.quantity)
        .filter(|t| *t <= MAX_TAXABLE_AMOUNT);
    if taxable.is_none() {
        reject("base_amount", "base_amount * quantity exceeds the maximum taxable amount");
    }
    match taxable {
        Some(t) if fields.is_empty() => Ok(t),
        _ => Err(CalculationError::Validation { fields }),
    }
}
