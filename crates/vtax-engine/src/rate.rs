//! # Rate Evaluation
//!
//! [`calculate_tax_amount`] turns one [`VoipTaxRate`] and a base amount into
//! a tax amount:
//!
//! 1. a service amount below `minimum_threshold` yields exactly zero
//! 2. the rate model computes the raw amount
//! 3. `maximum_amount` caps it
//! 4. the result is rounded to [`TAX_SCALE`](vtax_core::TAX_SCALE) places
//!
//! Tiered rates use bracket semantics: each tier taxes only the slice of the
//! base inside `[min, max)`; a fixed tier is charged once when its slice is
//! non-empty. Brackets are re-validated here so a lenient-loaded catalog
//! with malformed tiers fails for that rate only.
//!
//! Inclusive percentage rates extract the tax already contained in the
//! base: `base - base / (1 + rate / 100)`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vtax_catalog::{validate_tiers, RateModel, TierError, TierRate, VoipTaxRate};
use vtax_core::{round_tax, RateId};

/// Line-level inputs some rate models read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateContext {
    /// Number of lines, for per-line rates.
    pub line_count: Decimal,
    /// Minutes of usage, for per-minute rates.
    pub minutes: Decimal,
}

impl Default for RateContext {
    fn default() -> Self {
        Self {
            line_count: Decimal::ONE,
            minutes: Decimal::ZERO,
        }
    }
}

/// A rate that could not be evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateEvaluationError {
    /// Tier brackets are malformed.
    #[error("rate {rate_id} has malformed tiers: {source}")]
    MalformedTiers {
        rate_id: RateId,
        #[source]
        source: TierError,
    },

    /// Arithmetic exceeded the decimal range.
    #[error("rate {rate_id} overflowed while computing the tax amount")]
    Overflow { rate_id: RateId },
}

/// Evaluate one rate against `base_amount`.
pub fn calculate_tax_amount(
    rate: &VoipTaxRate,
    base_amount: Decimal,
    ctx: &RateContext,
) -> Result<Decimal, RateEvaluationError> {
    calculate_compound_amount(rate, base_amount, base_amount, ctx)
}

/// Evaluate one rate on `taxable_base` while testing `minimum_threshold`
/// against `service_amount`.
///
/// Compound rates are evaluated on the service amount plus the pass-one
/// subtotal, but their threshold still refers to the service amount.
pub fn calculate_compound_amount(
    rate: &VoipTaxRate,
    service_amount: Decimal,
    taxable_base: Decimal,
    ctx: &RateContext,
) -> Result<Decimal, RateEvaluationError> {
    if let Some(threshold) = rate.minimum_threshold {
        if service_amount < threshold {
            return Ok(Decimal::ZERO);
        }
    }
    let base_amount = taxable_base;
    let overflow = || RateEvaluationError::Overflow { rate_id: rate.id };

    let raw = match &rate.model {
        RateModel::Percentage { percentage_rate } if rate.is_inclusive() => {
            extract_inclusive(base_amount, *percentage_rate).ok_or_else(overflow)?
        }
        RateModel::Percentage { percentage_rate } => {
            percent_of(base_amount, *percentage_rate).ok_or_else(overflow)?
        }
        RateModel::Fixed { fixed_amount } => *fixed_amount,
        RateModel::PerLine { fixed_amount } => fixed_amount
            .checked_mul(ctx.line_count)
            .ok_or_else(overflow)?,
        RateModel::PerMinute { fixed_amount } => {
            fixed_amount.checked_mul(ctx.minutes).ok_or_else(overflow)?
        }
        RateModel::Tiered { conditions } => {
            let tiers = validate_tiers(&conditions.tiers).map_err(|source| {
                RateEvaluationError::MalformedTiers {
                    rate_id: rate.id,
                    source,
                }
            })?;
            let mut total = Decimal::ZERO;
            for tier in &tiers {
                let slice = tier.slice_of(base_amount);
                if slice.is_zero() {
                    continue;
                }
                let amount = match tier.rate {
                    TierRate::Percentage { rate } => percent_of(slice, rate).ok_or_else(overflow)?,
                    TierRate::Fixed { amount } => amount,
                };
                total = total.checked_add(amount).ok_or_else(overflow)?;
            }
            total
        }
    };

    let capped = match rate.maximum_amount {
        Some(cap) => raw.min(cap),
        None => raw,
    };
    Ok(round_tax(capped.max(Decimal::ZERO)))
}

fn percent_of(amount: Decimal, percent: Decimal) -> Option<Decimal> {
    amount.checked_mul(percent)?.checked_div(Decimal::ONE_HUNDRED)
}

fn extract_inclusive(gross: Decimal, percent: Decimal) -> Option<Decimal> {
    let divisor = Decimal::ONE.checked_add(percent.checked_div(Decimal::ONE_HUNDRED)?)?;
    gross.checked_sub(gross.checked_div(divisor)?)
}
