//! # VoIP Tax Rates
//!
//! A [`VoipTaxRate`] is one tax rule inside a jurisdiction × category pair,
//! e.g. "federal excise 3%" or "Travis County 911 surcharge $0.50 per line".
//!
//! ## Rate models
//!
//! The formula family is a tagged union ([`RateModel`]) keyed by
//! `rate_type`. Each variant carries exactly the parameters it reads, so a
//! tiered rate cannot accidentally carry a percentage and a per-line rate
//! cannot lack its fixed amount. Tier brackets are checked with
//! [`validate_tiers`] at load time and again by the engine before evaluation.
//!
//! ## Activity window
//!
//! A rate is active at instant `t` iff `is_active` and
//! `effective_date <= t <= expiry_date` (an absent expiry never ends).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vtax_core::{CategoryId, JurisdictionId, RateId, ServiceType, Timestamp};

/// The tax label a rate contributes to in the breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    /// Federal tax or surcharge.
    Federal,
    /// State tax.
    State,
    /// Local tax not otherwise classified.
    Local,
    /// Municipal tax.
    Municipal,
    /// County tax.
    County,
    /// Special district (911, transit, ...).
    SpecialDistrict,
}

impl TaxType {
    /// Return the string representation of this tax type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Federal => "federal",
            Self::State => "state",
            Self::Local => "local",
            Self::Municipal => "municipal",
            Self::County => "county",
            Self::SpecialDistrict => "special_district",
        }
    }

    /// Return all tax types.
    pub fn all() -> &'static [TaxType] {
        &[
            Self::Federal,
            Self::State,
            Self::Local,
            Self::Municipal,
            Self::County,
            Self::SpecialDistrict,
        ]
    }
}

impl std::fmt::Display for TaxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formula family, without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    /// Percentage of the base amount.
    Percentage,
    /// Constant amount.
    Fixed,
    /// Bracketed percentage or fixed amounts.
    Tiered,
    /// Fixed amount per line.
    PerLine,
    /// Fixed amount per minute of usage.
    PerMinute,
}

impl RateType {
    /// Return the string representation of this rate type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
            Self::Tiered => "tiered",
            Self::PerLine => "per_line",
            Self::PerMinute => "per_minute",
        }
    }
}

impl std::fmt::Display for RateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rate's amount combines with the others in a composition pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    /// Computed on the original base and added.
    Standard,
    /// Computed on base plus the pass-one subtotal.
    Compound,
    /// Same arithmetic as standard.
    Additive,
    /// Already included in the base; extracted, not added.
    Inclusive,
    /// Same arithmetic as standard, shown separately from the price.
    Exclusive,
}

impl CalculationMethod {
    /// Return the string representation of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Compound => "compound",
            Self::Additive => "additive",
            Self::Inclusive => "inclusive",
            Self::Exclusive => "exclusive",
        }
    }
}

impl std::fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rate applied within one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TierRate {
    /// Percentage of the slice of the base inside the bracket.
    Percentage {
        /// Percent, e.g. `5.0` for 5%.
        rate: Decimal,
    },
    /// Constant charged once when any of the base falls in the bracket.
    Fixed {
        /// Amount charged.
        amount: Decimal,
    },
}

/// One bracket `[min, max)` of a tiered rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Inclusive lower bound.
    pub min: Decimal,
    /// Exclusive upper bound. `None` is unbounded and must be the last tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    /// Rate applied to the slice inside this bracket.
    pub rate: TierRate,
}

impl Tier {
    /// Portion of `amount` that falls inside this bracket.
    pub fn slice_of(&self, amount: Decimal) -> Decimal {
        let upper = match self.max {
            Some(max) => amount.min(max),
            None => amount,
        };
        (upper - self.min).max(Decimal::ZERO)
    }
}

/// Tier bracket definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConditions {
    /// Brackets. Sorted by `min` before evaluation, so file order is
    /// irrelevant.
    pub tiers: Vec<Tier>,
}

/// Malformed tier configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    /// No tiers configured.
    #[error("tiered rate has no tiers")]
    Empty,

    /// A tier's upper bound does not exceed its lower bound.
    #[error("tier {index} has max {max} <= min {min}")]
    InvalidBounds {
        index: usize,
        min: Decimal,
        max: Decimal,
    },

    /// Brackets leave part of the range uncovered.
    #[error("tier {index} starts at {found} leaving a gap after {expected}")]
    Gap {
        index: usize,
        expected: Decimal,
        found: Decimal,
    },

    /// Brackets cover part of the range twice.
    #[error("tier {index} starts at {found} overlapping the previous tier ending at {expected}")]
    Overlap {
        index: usize,
        expected: Decimal,
        found: Decimal,
    },

    /// An unbounded tier is followed by another tier.
    #[error("tier {index} is unbounded but is not the last tier")]
    UnboundedNotLast { index: usize },

    /// A tier carries a negative rate or amount.
    #[error("tier {index} has a negative rate")]
    NegativeRate { index: usize },
}

/// Sort brackets ascending by `min` and check they are contiguous and
/// non-overlapping. Indexes in errors refer to the sorted order.
pub fn validate_tiers(tiers: &[Tier]) -> Result<Vec<Tier>, TierError> {
    if tiers.is_empty() {
        return Err(TierError::Empty);
    }
    let mut sorted = tiers.to_vec();
    sorted.sort_by(|a, b| a.min.cmp(&b.min));

    let last = sorted.len() - 1;
    for (index, tier) in sorted.iter().enumerate() {
        let negative = match tier.rate {
            TierRate::Percentage { rate } => rate.is_sign_negative(),
            TierRate::Fixed { amount } => amount.is_sign_negative(),
        };
        if negative {
            return Err(TierError::NegativeRate { index });
        }
        match tier.max {
            Some(max) if max <= tier.min => {
                return Err(TierError::InvalidBounds {
                    index,
                    min: tier.min,
                    max,
                })
            }
            None if index != last => return Err(TierError::UnboundedNotLast { index }),
            _ => {}
        }
        if index > 0 {
            // Previous tier is bounded, otherwise UnboundedNotLast fired.
            let expected = sorted[index - 1].max.unwrap_or(tier.min);
            if tier.min > expected {
                return Err(TierError::Gap {
                    index,
                    expected,
                    found: tier.min,
                });
            }
            if tier.min < expected {
                return Err(TierError::Overlap {
                    index,
                    expected,
                    found: tier.min,
                });
            }
        }
    }
    Ok(sorted)
}

/// Formula family with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rate_type", rename_all = "snake_case")]
pub enum RateModel {
    /// `base * percentage_rate / 100`.
    Percentage {
        /// Percent, e.g. `3.0` for 3%.
        percentage_rate: Decimal,
    },
    /// `fixed_amount`, independent of the base.
    Fixed {
        /// Amount charged.
        fixed_amount: Decimal,
    },
    /// Sum over brackets in `conditions.tiers`.
    Tiered {
        /// Bracket definitions.
        conditions: TierConditions,
    },
    /// `fixed_amount * line_count`.
    PerLine {
        /// Amount per line.
        fixed_amount: Decimal,
    },
    /// `fixed_amount * minutes`.
    PerMinute {
        /// Amount per minute.
        fixed_amount: Decimal,
    },
}

impl RateModel {
    /// The formula family.
    pub fn rate_type(&self) -> RateType {
        match self {
            Self::Percentage { .. } => RateType::Percentage,
            Self::Fixed { .. } => RateType::Fixed,
            Self::Tiered { .. } => RateType::Tiered,
            Self::PerLine { .. } => RateType::PerLine,
            Self::PerMinute { .. } => RateType::PerMinute,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_method() -> CalculationMethod {
    CalculationMethod::Standard
}

fn default_version() -> u32 {
    1
}

/// One tax rule within a jurisdiction × category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoipTaxRate {
    /// Unique identifier.
    pub id: RateId,
    /// Jurisdiction imposing the tax.
    pub jurisdiction_id: JurisdictionId,
    /// Category the tax applies to.
    pub category_id: CategoryId,
    /// Breakdown label.
    pub tax_type: TaxType,
    /// Display name, e.g. "Federal Excise Tax".
    pub tax_name: String,
    /// Formula and its parameters.
    #[serde(flatten)]
    pub model: RateModel,
    /// Bases below this produce exactly zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_threshold: Option<Decimal>,
    /// Cap on the computed amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_amount: Option<Decimal>,
    /// Combination semantics.
    #[serde(default = "default_method")]
    pub calculation_method: CalculationMethod,
    /// Legacy compound flag; compounding if this or the method says so.
    #[serde(default)]
    pub is_compound: bool,
    /// Whether the tax is recoverable by the buyer.
    #[serde(default)]
    pub is_recoverable: bool,
    /// Evaluation order within a jurisdiction. Lower first.
    pub priority: u32,
    /// Start of the activity window.
    pub effective_date: Timestamp,
    /// End of the activity window, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Timestamp>,
    /// Service types the rate is restricted to. `None` covers all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_types: Option<Vec<ServiceType>>,
    /// Administrative on/off switch.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Bumped on every administrative edit.
    #[serde(default = "default_version")]
    pub version: u32,
}

impl VoipTaxRate {
    /// Create an active standard rate effective from `effective_date`.
    pub fn new(
        jurisdiction_id: JurisdictionId,
        category_id: CategoryId,
        tax_type: TaxType,
        tax_name: impl Into<String>,
        model: RateModel,
        effective_date: Timestamp,
    ) -> Self {
        Self {
            id: RateId::new(),
            jurisdiction_id,
            category_id,
            tax_type,
            tax_name: tax_name.into(),
            model,
            minimum_threshold: None,
            maximum_amount: None,
            calculation_method: CalculationMethod::Standard,
            is_compound: false,
            is_recoverable: false,
            priority: 100,
            effective_date,
            expiry_date: None,
            service_types: None,
            is_active: true,
            version: 1,
        }
    }

    /// Set the combination method.
    pub fn with_method(mut self, method: CalculationMethod) -> Self {
        self.calculation_method = method;
        self
    }

    /// Set the minimum threshold.
    pub fn with_threshold(mut self, threshold: Decimal) -> Self {
        self.minimum_threshold = Some(threshold);
        self
    }

    /// Set the cap.
    pub fn with_cap(mut self, cap: Decimal) -> Self {
        self.maximum_amount = Some(cap);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// The formula family.
    pub fn rate_type(&self) -> RateType {
        self.model.rate_type()
    }

    /// Whether the rate is evaluated at instant `at`.
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        self.is_active
            && self.effective_date <= at
            && self.expiry_date.map_or(true, |expiry| at <= expiry)
    }

    /// Whether the rate applies to `service_type`.
    pub fn applies_to_service(&self, service_type: &ServiceType) -> bool {
        match &self.service_types {
            None => true,
            Some(types) => types.contains(service_type),
        }
    }

    /// Whether the rate is evaluated in the compound pass.
    pub fn is_compounding(&self) -> bool {
        self.is_compound || self.calculation_method == CalculationMethod::Compound
    }

    /// Whether the amount is already included in the base.
    pub fn is_inclusive(&self) -> bool {
        self.calculation_method == CalculationMethod::Inclusive
    }
}

/// An administrative edit to a rate. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatePatch {
    /// Replace the formula.
    #[serde(flatten)]
    pub model: Option<RateModel>,
    /// Replace the display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_name: Option<String>,
    /// Replace the threshold. Zero removes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_threshold: Option<Decimal>,
    /// Replace the cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_amount: Option<Decimal>,
    /// Remove the cap.
    #[serde(default)]
    pub clear_maximum_amount: bool,
    /// Replace the combination method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_method: Option<CalculationMethod>,
    /// Replace the priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// Replace the start of the activity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<Timestamp>,
    /// Replace the end of the activity window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Timestamp>,
    /// Switch the rate on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl RatePatch {
    /// Apply the patch to a copy of `rate`. Does not bump the version.
    pub fn apply_to(&self, rate: &VoipTaxRate) -> VoipTaxRate {
        let mut next = rate.clone();
        if let Some(model) = &self.model {
            next.model = model.clone();
        }
        if let Some(name) = &self.tax_name {
            next.tax_name = name.clone();
        }
        if let Some(threshold) = self.minimum_threshold {
            next.minimum_threshold = (!threshold.is_zero()).then_some(threshold);
        }
        if self.clear_maximum_amount {
            next.maximum_amount = None;
        } else if let Some(cap) = self.maximum_amount {
            next.maximum_amount = Some(cap);
        }
        if let Some(method) = self.calculation_method {
            next.calculation_method = method;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(effective) = self.effective_date {
            next.effective_date = effective;
        }
        if let Some(expiry) = self.expiry_date {
            next.expiry_date = Some(expiry);
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }
        next
    }
}
