//! # Money Arithmetic
//!
//! Amounts, rates and quantities are [`Decimal`] end to end. Rate-level
//! amounts keep [`TAX_SCALE`] places so that aggregating many sub-cent
//! surcharges does not drift; totals shown to a customer are rounded to
//! [`DISPLAY_SCALE`].
//!
//! Rounding is half away from zero at both scales.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ValidationError;

/// Decimal places retained on every rate-level tax amount.
pub const TAX_SCALE: u32 = 4;

/// Decimal places used for display and invoice totals.
pub const DISPLAY_SCALE: u32 = 2;

/// Round a rate-level tax amount to [`TAX_SCALE`] places.
pub fn round_tax(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(TAX_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an amount to [`DISPLAY_SCALE`] places for presentation.
pub fn round_display(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a non-negative decimal amount from a string such as `"100.00"`.
///
/// Surrounding whitespace is ignored. Scientific notation is rejected.
pub fn parse_amount(s: &str) -> Result<Decimal, ValidationError> {
    let trimmed = s.trim();
    let value: Decimal = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidAmount(s.to_string()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::NegativeAmount(trimmed.to_string()));
    }
    Ok(value)
}
