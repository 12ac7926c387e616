//! # Two-Pass Composition
//!
//! Combines every applicable rate across the resolved jurisdictions into tax
//! lines and totals.
//!
//! ## Passes
//!
//! **Pass one** walks the jurisdictions in resolution order and, within
//! each, the active rates in priority order, evaluating every non-compound
//! rate on the line's base amount.
//!
//! **Pass two** evaluates every compound rate on `base + S`, where `S` is
//! the sum of the non-inclusive pass-one amounts. Compound rates are
//! evaluated simultaneously on that same base; they never see each other.
//!
//! Inclusive amounts are recorded and reported separately. They are never
//! added to the total and never feed the compound base.
//!
//! ## Treatments and exemptions
//!
//! A reduced treatment scales each line by `reduced_rate_percent / 100`. An
//! exemption then removes its percentage from the line; when several match,
//! the highest percentage wins, ties broken by id. [`LinePolicy`] applies
//! both steps, to configured rates here and to provider lines during
//! enrichment.
//!
//! Rate-level overflow fails that rate only. Totals that leave the decimal
//! range fail the whole composition with [`TotalsOverflow`].
//!
//! A rate that cannot be evaluated contributes nothing and is listed in
//! [`Composition::errors`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vtax_catalog::{
    CalculationMethod, ExemptionScope, JurisdictionType, RateType, TaxCatalog, TaxCategory,
    TaxExemption, TaxTreatment, TaxType, VoipTaxRate,
};
use vtax_core::{round_tax, ClientId, ExemptionId, JurisdictionId, RateId, ServiceType, Timestamp};

use crate::rate::{calculate_compound_amount, RateContext, RateEvaluationError};
use crate::resolver::{JurisdictionMatch, MatchKind};

/// Which pass produced a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// Evaluated on the original base.
    Base,
    /// Evaluated on base plus the pass-one subtotal.
    Compound,
    /// Supplied by an external provider.
    External,
}

/// Where a line's amount came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineSource {
    /// A configured rate.
    Rate {
        /// The rate.
        rate_id: RateId,
        /// Rate version at calculation time.
        rate_version: u32,
    },
    /// An external enrichment provider.
    External {
        /// Provider name.
        provider: String,
    },
}

/// One computed tax line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    /// Origin of the amount.
    pub source: LineSource,
    /// Jurisdiction id, when the jurisdiction is in the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<JurisdictionId>,
    /// Jurisdiction code.
    pub jurisdiction_code: String,
    /// Jurisdiction name.
    pub jurisdiction_name: String,
    /// Display name of the tax.
    pub tax_name: String,
    /// Breakdown label.
    pub tax_type: TaxType,
    /// Formula family, for configured rates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_type: Option<RateType>,
    /// Combination method.
    pub calculation_method: CalculationMethod,
    /// Pass that produced the line.
    pub pass: Pass,
    /// Base the rate was evaluated on.
    pub taxable_base: Decimal,
    /// Amount before exemptions.
    pub gross_amount: Decimal,
    /// Amount removed by an exemption.
    pub exempted_amount: Decimal,
    /// Amount charged (or, for inclusive lines, extracted).
    pub amount: Decimal,
    /// Whether the amount is already inside the base.
    pub is_inclusive: bool,
    /// Whether the buyer may recover the tax.
    pub is_recoverable: bool,
}

/// An exemption applied to one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedExemption {
    /// The exemption.
    pub exemption_id: ExemptionId,
    /// Exemption type.
    pub exemption_type: String,
    /// Certificate on file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    /// Rate whose line was reduced; absent for provider lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_id: Option<RateId>,
    /// Jurisdiction of the line, when the catalog knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<JurisdictionId>,
    /// Tax type of the line.
    pub tax_type: TaxType,
    /// Percent exempted.
    pub exemption_percent: Decimal,
    /// Amount removed.
    pub exempted_amount: Decimal,
}

/// A rate skipped because it could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateFailure {
    /// The rate.
    pub rate_id: RateId,
    /// Its jurisdiction.
    pub jurisdiction_id: JurisdictionId,
    /// Its display name.
    pub tax_name: String,
    /// What went wrong.
    pub reason: String,
}

/// Tax totals left the decimal range.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("tax totals exceed the supported decimal range")]
pub struct TotalsOverflow;

/// Per-jurisdiction totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionBreakdown {
    /// Jurisdiction id; absent for external-only jurisdictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<JurisdictionId>,
    /// Jurisdiction code.
    pub code: String,
    /// Jurisdiction name.
    pub name: String,
    /// Level, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_type: Option<JurisdictionType>,
    /// How it was matched, when resolved internally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchKind>,
    /// Tax charged, excluding inclusive amounts.
    pub tax_amount: Decimal,
    /// Inclusive amounts extracted.
    pub inclusive_amount: Decimal,
}

impl JurisdictionBreakdown {
    /// Whether `line` is credited to this row. Catalog lines match by id;
    /// provider lines without an id match external rows by code.
    fn owns(&self, line: &TaxLine) -> bool {
        match line.jurisdiction_id {
            Some(id) => self.jurisdiction_id == Some(id),
            None => {
                self.jurisdiction_id.is_none()
                    && self.code.eq_ignore_ascii_case(&line.jurisdiction_code)
            }
        }
    }
}

/// Result of composing the rates for one line item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    /// Lines in evaluation order: pass one, pass two, external.
    pub lines: Vec<TaxLine>,
    /// Sum of charged amounts per tax type. Sums to `total_tax`.
    pub breakdown: BTreeMap<TaxType, Decimal>,
    /// Per-jurisdiction totals, in resolution order.
    pub jurisdictions: Vec<JurisdictionBreakdown>,
    /// Exemptions applied.
    pub exemptions_applied: Vec<AppliedExemption>,
    /// Rates skipped.
    pub errors: Vec<RateFailure>,
    /// Sum of non-inclusive line amounts.
    pub total_tax: Decimal,
    /// Sum of inclusive line amounts.
    pub inclusive_tax: Decimal,
}

impl Composition {
    /// Recompute `breakdown`, `jurisdictions` totals, `total_tax` and
    /// `inclusive_tax` from `lines`.
    ///
    /// On overflow nothing is changed.
    pub fn recompute_totals(&mut self) -> Result<(), TotalsOverflow> {
        let mut breakdown: BTreeMap<TaxType, Decimal> = BTreeMap::new();
        let mut total_tax = Decimal::ZERO;
        let mut inclusive_tax = Decimal::ZERO;
        let mut per_jurisdiction = vec![(Decimal::ZERO, Decimal::ZERO); self.jurisdictions.len()];

        for line in &self.lines {
            let slot = self
                .jurisdictions
                .iter()
                .position(|j| j.owns(line))
                .and_then(|i| per_jurisdiction.get_mut(i));
            if line.is_inclusive {
                inclusive_tax = checked_sum(inclusive_tax, line.amount)?;
                if let Some((_, inclusive)) = slot {
                    *inclusive = checked_sum(*inclusive, line.amount)?;
                }
            } else {
                total_tax = checked_sum(total_tax, line.amount)?;
                let by_type = breakdown.entry(line.tax_type).or_insert(Decimal::ZERO);
                *by_type = checked_sum(*by_type, line.amount)?;
                if let Some((charged, _)) = slot {
                    *charged = checked_sum(*charged, line.amount)?;
                }
            }
        }

        for (j, (charged, inclusive)) in self.jurisdictions.iter_mut().zip(per_jurisdiction) {
            j.tax_amount = charged;
            j.inclusive_amount = inclusive;
        }
        self.breakdown = breakdown;
        self.total_tax = total_tax;
        self.inclusive_tax = inclusive_tax;
        Ok(())
    }

    /// Whether a line for `jurisdiction_code` and `tax_type` already exists.
    pub fn covers(&self, jurisdiction_code: &str, tax_type: TaxType) -> bool {
        self.lines
            .iter()
            .any(|l| l.tax_type == tax_type && l.jurisdiction_code.eq_ignore_ascii_case(jurisdiction_code))
    }
}

fn checked_sum(a: Decimal, b: Decimal) -> Result<Decimal, TotalsOverflow> {
    a.checked_add(b).ok_or(TotalsOverflow)
}

/// Reductions every line goes through before it is accumulated: the
/// category treatment scale, then the client's best exemption.
#[derive(Debug, Clone, Copy)]
pub struct LinePolicy<'a> {
    /// Exemptions on file for the tenant.
    pub exemptions: &'a [TaxExemption],
    /// Category of the line item.
    pub category: &'a TaxCategory,
    /// Treatment decided by the category rules.
    pub treatment: TaxTreatment,
    /// Client being billed.
    pub client_id: Option<&'a ClientId>,
    /// Calculation date.
    pub at: Timestamp,
}

/// The tax line a [`LinePolicy`] is applied to.
#[derive(Debug, Clone, Copy)]
pub struct LineKey {
    /// Configured rate, if any.
    pub rate_id: Option<RateId>,
    /// Catalog jurisdiction, if known.
    pub jurisdiction_id: Option<JurisdictionId>,
    /// Breakdown label.
    pub tax_type: TaxType,
}

/// A line amount after treatment and exemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    /// After the treatment scale, before exemptions.
    pub gross: Decimal,
    /// Removed by an exemption.
    pub exempted: Decimal,
}

impl Settled {
    /// Amount charged.
    pub fn charged(&self) -> Decimal {
        self.gross - self.exempted
    }
}

impl<'a> LinePolicy<'a> {
    /// Multiplier the treatment applies to every line.
    pub fn scale(&self) -> Decimal {
        match self.treatment {
            TaxTreatment::Reduced => {
                self.category
                    .reduced_rate_percent
                    .unwrap_or(Decimal::ONE_HUNDRED)
                    / Decimal::ONE_HUNDRED
            }
            _ => Decimal::ONE,
        }
    }

    /// Scale `raw` by the treatment and remove the best matching exemption,
    /// recording it in `applied`. `None` when scaling overflows.
    pub fn settle(&self, raw: Decimal, key: LineKey, applied: &mut Vec<AppliedExemption>) -> Option<Settled> {
        let gross = round_tax(raw.checked_mul(self.scale())?);
        let exemption = self.client_id.and_then(|client_id| self.best_exemption(client_id, &key));
        let exempted = exemption.map_or(Decimal::ZERO, |e| round_tax(e.exempted_amount(gross)));
        if let Some(e) = exemption.filter(|_| !exempted.is_zero()) {
            applied.push(AppliedExemption {
                exemption_id: e.id,
                exemption_type: e.exemption_type.clone(),
                certificate_number: e.certificate_number.clone(),
                rate_id: key.rate_id,
                jurisdiction_id: key.jurisdiction_id,
                tax_type: key.tax_type,
                exemption_percent: e.exemption_percent,
                exempted_amount: exempted,
            });
        }
        Some(Settled { gross, exempted })
    }

    fn best_exemption(&self, client_id: &ClientId, key: &LineKey) -> Option<&'a TaxExemption> {
        let scope = ExemptionScope {
            client_id,
            jurisdiction_id: key.jurisdiction_id.as_ref(),
            category_id: &self.category.id,
            tax_type: key.tax_type,
            at: self.at,
        };
        self.exemptions
            .iter()
            .filter(|e| {
                e.matches(&scope)
                    && self
                        .category
                        .honours_exemption(&e.exemption_type, e.certificate_number.is_some())
            })
            .min_by(|a, b| {
                b.exemption_percent
                    .cmp(&a.exemption_percent)
                    .then_with(|| a.id.cmp(&b.id))
            })
    }
}

/// Everything the composer reads for one line item.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    /// Tenant catalog.
    pub catalog: &'a TaxCatalog,
    /// Resolved jurisdictions, in order.
    pub jurisdictions: &'a [JurisdictionMatch<'a>],
    /// Category of the line.
    pub category: &'a TaxCategory,
    /// Treatment decided by the category rules.
    pub treatment: TaxTreatment,
    /// Service type of the line.
    pub service_type: &'a ServiceType,
    /// Taxable base.
    pub base_amount: Decimal,
    /// Line-level inputs.
    pub context: RateContext,
    /// Client being billed, for exemptions.
    pub client_id: Option<&'a ClientId>,
    /// Calculation date.
    pub at: Timestamp,
}

impl<'a> ComposeInput<'a> {
    /// Treatment and exemptions for this line item.
    pub fn policy(&self) -> LinePolicy<'a> {
        LinePolicy {
            exemptions: &self.catalog.exemptions,
            category: self.category,
            treatment: self.treatment,
            client_id: self.client_id,
            at: self.at,
        }
    }
}

struct Evaluated<'a> {
    rate: &'a VoipTaxRate,
    matched: &'a JurisdictionMatch<'a>,
}

/// Compose the tax lines for one line item.
///
/// Fails only when the totals leave the decimal range; a single rate that
/// cannot be evaluated is reported in [`Composition::errors`] instead.
pub fn compose(input: &ComposeInput<'_>) -> Result<Composition, TotalsOverflow> {
    let mut out = Composition {
        jurisdictions: input
            .jurisdictions
            .iter()
            .map(|m| JurisdictionBreakdown {
                jurisdiction_id: Some(m.jurisdiction.id),
                code: m.jurisdiction.code.clone(),
                name: m.jurisdiction.name.clone(),
                jurisdiction_type: Some(m.jurisdiction.jurisdiction_type),
                matched_by: Some(m.matched_by),
                tax_amount: Decimal::ZERO,
                inclusive_amount: Decimal::ZERO,
            })
            .collect(),
        ..Composition::default()
    };

    if !input.category.is_taxable || input.treatment == TaxTreatment::Exempt {
        return Ok(out);
    }
    let policy = input.policy();

    let mut compound: Vec<Evaluated<'_>> = Vec::new();
    let mut subtotal = Decimal::ZERO;
    for matched in input.jurisdictions {
        let rates = input.catalog.rates_for(
            &matched.jurisdiction.id,
            &input.category.id,
            input.service_type,
            input.at,
        );
        for rate in rates {
            let ev = Evaluated { rate, matched };
            if rate.is_compounding() {
                compound.push(ev);
                continue;
            }
            if let Some(line) = evaluate(input, &policy, &ev, input.base_amount, Pass::Base, &mut out) {
                if !line.is_inclusive {
                    subtotal = checked_sum(subtotal, line.amount)?;
                }
                out.lines.push(line);
            }
        }
    }

    if !compound.is_empty() {
        let compound_base = checked_sum(input.base_amount, subtotal)?;
        for ev in &compound {
            if let Some(line) = evaluate(input, &policy, ev, compound_base, Pass::Compound, &mut out) {
                out.lines.push(line);
            }
        }
    }

    out.recompute_totals()?;
    Ok(out)
}

fn evaluate(
    input: &ComposeInput<'_>,
    policy: &LinePolicy<'_>,
    ev: &Evaluated<'_>,
    base: Decimal,
    pass: Pass,
    out: &mut Composition,
) -> Option<TaxLine> {
    let rate = ev.rate;
    let jurisdiction = ev.matched.jurisdiction;
    let fail = |out: &mut Composition, reason: String| {
        tracing::warn!(rate_id = %rate.id, error = %reason, "rate skipped");
        out.errors.push(RateFailure {
            rate_id: rate.id,
            jurisdiction_id: jurisdiction.id,
            tax_name: rate.tax_name.clone(),
            reason,
        });
    };

    let raw = match calculate_compound_amount(rate, input.base_amount, base, &input.context) {
        Ok(amount) => amount,
        Err(e) => {
            fail(out, e.to_string());
            return None;
        }
    };
    let key = LineKey {
        rate_id: Some(rate.id),
        jurisdiction_id: Some(jurisdiction.id),
        tax_type: rate.tax_type,
    };
    let Some(settled) = policy.settle(raw, key, &mut out.exemptions_applied) else {
        fail(out, RateEvaluationError::Overflow { rate_id: rate.id }.to_string());
        return None;
    };

    Some(TaxLine {
        source: LineSource::Rate {
            rate_id: rate.id,
            rate_version: rate.version,
        },
        jurisdiction_id: Some(jurisdiction.id),
        jurisdiction_code: jurisdiction.code.clone(),
        jurisdiction_name: jurisdiction.name.clone(),
        tax_name: rate.tax_name.clone(),
        tax_type: rate.tax_type,
        rate_type: Some(rate.rate_type()),
        calculation_method: rate.calculation_method,
        pass,
        taxable_base: base,
        gross_amount: settled.gross,
        exempted_amount: settled.exempted,
        amount: settled.charged(),
        is_inclusive: rate.is_inclusive(),
        is_recoverable: rate.is_recoverable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vtax_catalog::{CategoryType, ExemptionRule, Jurisdiction, RateModel};
    use vtax_core::CompanyId;

    struct Fixture {
        catalog: TaxCatalog,
        category: TaxCategory,
    }

    fn ts() -> Timestamp {
        Timestamp::parse("2026-03-01T00:00:00Z").unwrap()
    }

    fn fixture() -> Fixture {
        let mut catalog = TaxCatalog::new(CompanyId::new());
        let fed = Jurisdiction::new(JurisdictionType::Federal, "United States", "US", 1);
        let tx = Jurisdiction::new(JurisdictionType::State, "Texas", "TX", 10).with_state_code("TX");
        let aus = Jurisdiction::new(JurisdictionType::City, "Austin", "TX-AUS", 30);
        let category = TaxCategory::new("VoIP", CategoryType::VoipFixed, 10);
        let effective = Timestamp::parse("2026-01-01T00:00:00Z").unwrap();
        catalog.rates = vec![
            VoipTaxRate::new(
                fed.id,
                category.id,
                TaxType::Federal,
                "Federal Excise",
                RateModel::Percentage {
                    percentage_rate: dec!(3),
                },
                effective,
            ),
            VoipTaxRate::new(
                tx.id,
                category.id,
                TaxType::State,
                "Texas Telecom",
                RateModel::Percentage {
                    percentage_rate: dec!(5),
                },
                effective,
            )
            .with_method(CalculationMethod::Compound),
            VoipTaxRate::new(
                aus.id,
                category.id,
                TaxType::Local,
                "Austin 911",
                RateModel::Fixed {
                    fixed_amount: dec!(1.50),
                },
                effective,
            ),
        ];
        catalog.jurisdictions = vec![fed, tx, aus];
        catalog.categories = vec![category.clone()];
        Fixture { catalog, category }
    }

    fn matches(catalog: &TaxCatalog) -> Vec<JurisdictionMatch<'_>> {
        catalog
            .jurisdictions
            .iter()
            .map(|j| JurisdictionMatch {
                jurisdiction: j,
                matched_by: MatchKind::StateCode,
            })
            .collect()
    }

    fn run(f: &Fixture, treatment: TaxTreatment, client: Option<&ClientId>) -> Composition {
        let st = ServiceType::new("voip_fixed").unwrap();
        let js = matches(&f.catalog);
        compose(&ComposeInput {
            catalog: &f.catalog,
            jurisdictions: &js,
            category: &f.category,
            treatment,
            service_type: &st,
            base_amount: dec!(100),
            context: RateContext::default(),
            client_id: client,
            at: ts(),
        })
        .unwrap()
    }

    #[test]
    fn compound_rate_sees_pass_one_subtotal() {
        let out = run(&fixture(), TaxTreatment::Standard, None);
        let amounts: Vec<_> = out.lines.iter().map(|l| (l.tax_name.as_str(), l.amount)).collect();
        assert_eq!(
            amounts,
            vec![
                ("Federal Excise", dec!(3)),
                ("Austin 911", dec!(1.5)),
                ("Texas Telecom", dec!(5.225)),
            ]
        );
        assert_eq!(out.lines[2].taxable_base, dec!(104.5));
        assert_eq!(out.total_tax, dec!(9.725));
        assert_eq!(out.breakdown[&TaxType::State], dec!(5.225));
        assert_eq!(out.breakdown.values().copied().sum::<Decimal>(), out.total_tax);
        assert_eq!(out.jurisdictions[1].tax_amount, dec!(5.225));
    }

    #[test]
    fn compound_rates_do_not_see_each_other() {
        let mut f = fixture();
        let tx = f.catalog.jurisdictions[1].id;
        f.catalog.rates.push(
            VoipTaxRate::new(
                tx,
                f.category.id,
                TaxType::SpecialDistrict,
                "Texas USF",
                RateModel::Percentage {
                    percentage_rate: dec!(10),
                },
                Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            )
            .with_method(CalculationMethod::Compound)
            .with_priority(200),
        );
        let out = run(&f, TaxTreatment::Standard, None);
        let usf = out.lines.iter().find(|l| l.tax_name == "Texas USF").unwrap();
        assert_eq!(usf.taxable_base, dec!(104.5));
        assert_eq!(usf.amount, dec!(10.45));
    }

    #[test]
    fn inclusive_lines_are_excluded_from_total_and_compound_base() {
        let mut f = fixture();
        let fed = f.catalog.jurisdictions[0].id;
        f.catalog.rates.push(
            VoipTaxRate::new(
                fed,
                f.category.id,
                TaxType::Federal,
                "Included Fee",
                RateModel::Percentage {
                    percentage_rate: dec!(10),
                },
                Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            )
            .with_method(CalculationMethod::Inclusive),
        );
        let out = run(&f, TaxTreatment::Standard, None);
        assert_eq!(out.total_tax, dec!(9.725));
        assert_eq!(out.inclusive_tax, dec!(9.0909));
        assert_eq!(out.jurisdictions[0].inclusive_amount, dec!(9.0909));
    }

    #[test]
    fn exempt_treatment_and_non_taxable_category_produce_nothing() {
        let f = fixture();
        let out = run(&f, TaxTreatment::Exempt, None);
        assert!(out.lines.is_empty());
        assert_eq!(out.total_tax, Decimal::ZERO);
        assert_eq!(out.jurisdictions.len(), 3);

        let mut f = fixture();
        f.category.is_taxable = false;
        assert!(run(&f, TaxTreatment::Standard, None).lines.is_empty());
    }

    #[test]
    fn reduced_treatment_scales_lines() {
        let mut f = fixture();
        f.category.reduced_rate_percent = Some(dec!(50));
        let out = run(&f, TaxTreatment::Reduced, None);
        assert_eq!(out.lines[0].amount, dec!(1.5));
        assert_eq!(out.lines[1].amount, dec!(0.75));
        // compound base still uses the reduced subtotal
        assert_eq!(out.lines[2].taxable_base, dec!(102.25));
    }

    #[test]
    fn highest_matching_exemption_applies() {
        let mut f = fixture();
        let client = ClientId::new();
        let fed = f.catalog.jurisdictions[0].id;
        let exemption = |percent: Decimal, jurisdiction: Option<JurisdictionId>| TaxExemption {
            id: ExemptionId::new(),
            client_id: client,
            exemption_type: "reseller".into(),
            certificate_number: Some("RS-1".into()),
            jurisdiction_id: jurisdiction,
            category_id: None,
            tax_types: vec![],
            exemption_percent: percent,
            effective_date: Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            expiry_date: None,
            is_active: true,
        };
        f.catalog.exemptions = vec![exemption(dec!(50), None), exemption(dec!(100), Some(fed))];

        let out = run(&f, TaxTreatment::Standard, Some(&client));
        let federal = &out.lines[0];
        assert_eq!(federal.gross_amount, dec!(3));
        assert_eq!(federal.amount, Decimal::ZERO);
        assert_eq!(out.lines[1].amount, dec!(0.75));
        assert_eq!(out.exemptions_applied.len(), 3);

        // other clients are unaffected
        let out = run(&f, TaxTreatment::Standard, Some(&ClientId::new()));
        assert_eq!(out.total_tax, dec!(9.725));
    }

    #[test]
    fn category_rules_can_refuse_an_exemption_type() {
        let mut f = fixture();
        let client = ClientId::new();
        f.category.exemption_rules = vec![ExemptionRule {
            exemption_type: "government".into(),
            requires_certificate: true,
        }];
        f.catalog.exemptions = vec![TaxExemption {
            id: ExemptionId::new(),
            client_id: client,
            exemption_type: "government".into(),
            certificate_number: None,
            jurisdiction_id: None,
            category_id: None,
            tax_types: vec![],
            exemption_percent: dec!(100),
            effective_date: Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            expiry_date: None,
            is_active: true,
        }];
        let out = run(&f, TaxTreatment::Standard, Some(&client));
        assert!(out.exemptions_applied.is_empty());
        assert_eq!(out.total_tax, dec!(9.725));
    }

    #[test]
    fn failing_rate_is_reported_and_skipped() {
        let mut f = fixture();
        f.catalog.rates[2].model = RateModel::Tiered {
            conditions: vtax_catalog::TierConditions { tiers: vec![] },
        };
        let out = run(&f, TaxTreatment::Standard, None);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].tax_name, "Austin 911");
        // compound base is 103
        assert_eq!(out.total_tax, dec!(3) + dec!(5.15));
    }

    #[test]
    fn lines_are_credited_by_jurisdiction_id() {
        let mut catalog = TaxCatalog::new(CompanyId::new());
        let state = Jurisdiction::new(JurisdictionType::State, "Texas", "TX", 10);
        let county = Jurisdiction::new(JurisdictionType::County, "Texas County", "TX", 20);
        let category = TaxCategory::new("VoIP", CategoryType::VoipFixed, 10);
        catalog.rates = vec![VoipTaxRate::new(
            county.id,
            category.id,
            TaxType::County,
            "County 911",
            RateModel::Fixed {
                fixed_amount: dec!(2),
            },
            Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
        )];
        catalog.jurisdictions = vec![state, county];
        catalog.categories = vec![category.clone()];
        let out = run(&Fixture { catalog, category }, TaxTreatment::Standard, None);
        assert_eq!(out.jurisdictions[0].tax_amount, Decimal::ZERO);
        assert_eq!(out.jurisdictions[1].tax_amount, dec!(2));
    }

    #[test]
    fn compound_threshold_uses_the_line_amount() {
        let mut f = fixture();
        // 100 < 102, although the compound base of 104.5 is not.
        f.catalog.rates[1].minimum_threshold = Some(dec!(102));
        let out = run(&f, TaxTreatment::Standard, None);
        assert_eq!(out.lines[2].tax_name, "Texas Telecom");
        assert_eq!(out.lines[2].amount, Decimal::ZERO);
        assert_eq!(out.total_tax, dec!(4.5));
    }

    #[test]
    fn totals_out_of_range_fail_the_composition() {
        let mut f = fixture();
        let fed = f.catalog.jurisdictions[0].id;
        for name in ["Huge A", "Huge B"] {
            f.catalog.rates.push(VoipTaxRate::new(
                fed,
                f.category.id,
                TaxType::Federal,
                name,
                RateModel::Fixed {
                    fixed_amount: Decimal::MAX,
                },
                Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            ));
        }
        let st = ServiceType::new("voip_fixed").unwrap();
        let js = matches(&f.catalog);
        let result = compose(&ComposeInput {
            catalog: &f.catalog,
            jurisdictions: &js,
            category: &f.category,
            treatment: TaxTreatment::Standard,
            service_type: &st,
            base_amount: dec!(100),
            context: RateContext::default(),
            client_id: None,
            at: ts(),
        });
        assert_eq!(result, Err(TotalsOverflow));
    }

    #[test]
    fn recompute_leaves_totals_untouched_on_overflow() {
        let mut out = run(&fixture(), TaxTreatment::Standard, None);
        let before = out.clone();
        let mut huge = out.lines[0].clone();
        huge.amount = Decimal::MAX;
        out.lines.push(huge);
        assert_eq!(out.recompute_totals(), Err(TotalsOverflow));
        assert_eq!(out.total_tax, before.total_tax);
        assert_eq!(out.jurisdictions, before.jurisdictions);
    }
}
