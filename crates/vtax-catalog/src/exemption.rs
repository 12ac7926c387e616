//! # Tax Exemptions
//!
//! A [`TaxExemption`] reduces or removes specific tax lines for a client,
//! usually backed by an exemption certificate (resale, government,
//! non-profit). Scope is narrowed optionally by jurisdiction, category and
//! tax types; an unset scope matches everything.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vtax_core::{CategoryId, ClientId, ExemptionId, JurisdictionId, Timestamp};

use crate::rate::TaxType;

fn default_true() -> bool {
    true
}

fn full_exemption() -> Decimal {
    Decimal::ONE_HUNDRED
}

/// An exemption on file for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxExemption {
    /// Unique identifier.
    pub id: ExemptionId,
    /// Client holding the exemption.
    pub client_id: ClientId,
    /// Kind of exemption, e.g. `resale`, `government`.
    pub exemption_type: String,
    /// Certificate reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    /// Restrict to one jurisdiction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<JurisdictionId>,
    /// Restrict to one category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    /// Restrict to these tax types. Empty covers all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_types: Vec<TaxType>,
    /// Share of the tax removed, in percent. 100 removes it entirely.
    #[serde(default = "full_exemption")]
    pub exemption_percent: Decimal,
    /// Start of validity.
    pub effective_date: Timestamp,
    /// End of validity, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Timestamp>,
    /// Administrative on/off switch.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// The line an exemption is tested against.
#[derive(Debug, Clone, Copy)]
pub struct ExemptionScope<'a> {
    /// Client being billed.
    pub client_id: &'a ClientId,
    /// Jurisdiction imposing the tax. `None` for a jurisdiction the
    /// catalog does not know, which only unscoped exemptions cover.
    pub jurisdiction_id: Option<&'a JurisdictionId>,
    /// Category of the line.
    pub category_id: &'a CategoryId,
    /// Tax type of the rate.
    pub tax_type: TaxType,
    /// Calculation date.
    pub at: Timestamp,
}

impl TaxExemption {
    /// Whether this exemption covers the given line.
    pub fn matches(&self, scope: &ExemptionScope<'_>) -> bool {
        self.is_active
            && self.client_id == *scope.client_id
            && self.effective_date <= scope.at
            && self.expiry_date.map_or(true, |e| scope.at <= e)
            && self
                .jurisdiction_id
                .map_or(true, |j| scope.jurisdiction_id == Some(&j))
            && self.category_id.map_or(true, |c| c == *scope.category_id)
            && (self.tax_types.is_empty() || self.tax_types.contains(&scope.tax_type))
    }

    /// Amount removed from a tax line of `amount`.
    pub fn exempted_amount(&self, amount: Decimal) -> Decimal {
        let pct = self.exemption_percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        amount * (pct / Decimal::ONE_HUNDRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn exemption(client: ClientId) -> TaxExemption {
        TaxExemption {
            id: ExemptionId::new(),
            client_id: client,
            exemption_type: "resale".into(),
            certificate_number: Some("RS-1".into()),
            jurisdiction_id: None,
            category_id: None,
            tax_types: Vec::new(),
            exemption_percent: dec!(100),
            effective_date: ts("2026-01-01T00:00:00Z"),
            expiry_date: None,
            is_active: true,
        }
    }

    #[test]
    fn unscoped_exemption_covers_all_lines_for_client() {
        let client = ClientId::new();
        let e = exemption(client);
        let (j, c) = (JurisdictionId::new(), CategoryId::new());
        let scope = ExemptionScope {
            client_id: &client,
            jurisdiction_id: Some(&j),
            category_id: &c,
            tax_type: TaxType::State,
            at: ts("2026-05-01T00:00:00Z"),
        };
        assert!(e.matches(&scope));

        let other = ClientId::new();
        assert!(!e.matches(&ExemptionScope {
            client_id: &other,
            ..scope
        }));
        assert!(!e.matches(&ExemptionScope {
            at: ts("2025-05-01T00:00:00Z"),
            ..scope
        }));
    }

    #[test]
    fn scope_narrows_by_jurisdiction_and_tax_type() {
        let client = ClientId::new();
        let j = JurisdictionId::new();
        let c = CategoryId::new();
        let mut e = exemption(client);
        e.jurisdiction_id = Some(j);
        e.tax_types = vec![TaxType::State];
        let scope = ExemptionScope {
            client_id: &client,
            jurisdiction_id: Some(&j),
            category_id: &c,
            tax_type: TaxType::State,
            at: ts("2026-05-01T00:00:00Z"),
        };
        assert!(e.matches(&scope));
        assert!(!e.matches(&ExemptionScope {
            tax_type: TaxType::Federal,
            ..scope
        }));
        let elsewhere = JurisdictionId::new();
        assert!(!e.matches(&ExemptionScope {
            jurisdiction_id: Some(&elsewhere),
            ..scope
        }));
        assert!(!e.matches(&ExemptionScope {
            jurisdiction_id: None,
            ..scope
        }));
    }

    #[test]
    fn unknown_jurisdiction_matches_only_unscoped_exemptions() {
        let client = ClientId::new();
        let c = CategoryId::new();
        let scope = ExemptionScope {
            client_id: &client,
            jurisdiction_id: None,
            category_id: &c,
            tax_type: TaxType::SpecialDistrict,
            at: ts("2026-05-01T00:00:00Z"),
        };
        assert!(exemption(client).matches(&scope));
    }

    #[test]
    fn partial_exemption_scales_amount() {
        let mut e = exemption(ClientId::new());
        e.exemption_percent = dec!(25);
        assert_eq!(e.exempted_amount(dec!(4.00)), dec!(1.00));
        e.exemption_percent = dec!(150);
        assert_eq!(e.exempted_amount(dec!(4.00)), dec!(4.00));
    }
}
