//! # Tax Categories
//!
//! A [`TaxCategory`] classifies a billable service for tax purposes and
//! decides how it is treated: taxed normally, exempt, taxed at a reduced
//! share, or flagged for special handling.
//!
//! Treatment is decided by the category's conditional [`CategoryRule`]s
//! (first match wins), falling back to `default_tax_treatment`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vtax_core::{CategoryId, ServiceType};

/// Classification of a billable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    /// Local exchange voice service.
    LocalService,
    /// Intrastate or interstate long distance.
    LongDistance,
    /// International calling.
    International,
    /// Fixed (non-nomadic) interconnected VoIP.
    VoipFixed,
    /// Nomadic interconnected VoIP.
    VoipNomadic,
    /// Internet access and data.
    Data,
    /// Handsets, routers and other equipment.
    Equipment,
    /// Catch-all used when nothing else matches.
    General,
}

impl CategoryType {
    /// Return the string representation of this category type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalService => "local_service",
            Self::LongDistance => "long_distance",
            Self::International => "international",
            Self::VoipFixed => "voip_fixed",
            Self::VoipNomadic => "voip_nomadic",
            Self::Data => "data",
            Self::Equipment => "equipment",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a category's items are taxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxTreatment {
    /// Every applicable rate is computed.
    Standard,
    /// No tax is computed.
    Exempt,
    /// Each rate is scaled by the category's `reduced_rate_percent`.
    Reduced,
    /// Computed like standard and flagged for manual review.
    Special,
}

impl TaxTreatment {
    /// Return the string representation of this treatment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Exempt => "exempt",
            Self::Reduced => "reduced",
            Self::Special => "special",
        }
    }
}

impl std::fmt::Display for TaxTreatment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about a line item that category rules may test.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Pre-tax amount of the line.
    pub base_amount: Decimal,
    /// Service type being billed.
    pub service_type: &'a ServiceType,
    /// State code of the service address, if known.
    pub state_code: Option<&'a str>,
    /// Validated profile inputs.
    pub fields: &'a BTreeMap<String, serde_json::Value>,
}

/// A predicate over a [`RuleContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Base amount is at least `amount`.
    AmountAtLeast {
        /// Inclusive lower bound.
        amount: Decimal,
    },
    /// Base amount is strictly below `amount`.
    AmountBelow {
        /// Exclusive upper bound.
        amount: Decimal,
    },
    /// Service address is in one of the listed states.
    StateIn {
        /// Two-letter state codes, compared case-insensitively.
        state_codes: Vec<String>,
    },
    /// Service type is one of the listed types.
    ServiceTypeIn {
        /// Accepted service types.
        service_types: Vec<ServiceType>,
    },
    /// A profile input equals the given value.
    FieldEquals {
        /// Input field name.
        field: String,
        /// Expected value after profile normalization.
        value: serde_json::Value,
    },
}

impl RuleCondition {
    /// Evaluate this condition.
    pub fn matches(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            Self::AmountAtLeast { amount } => ctx.base_amount >= *amount,
            Self::AmountBelow { amount } => ctx.base_amount < *amount,
            Self::StateIn { state_codes } => ctx
                .state_code
                .map(|s| state_codes.iter().any(|c| c.eq_ignore_ascii_case(s)))
                .unwrap_or(false),
            Self::ServiceTypeIn { service_types } => service_types.contains(ctx.service_type),
            Self::FieldEquals { field, value } => ctx.fields.get(field) == Some(value),
        }
    }
}

/// A conditional treatment override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Human-readable label recorded with the calculation.
    pub name: String,
    /// When the rule applies.
    pub condition: RuleCondition,
    /// Treatment used when the condition matches.
    pub treatment: TaxTreatment,
}

/// An exemption kind this category honours, e.g. `resale` or `government`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptionRule {
    /// Exemption type matched against [`crate::TaxExemption::exemption_type`].
    pub exemption_type: String,
    /// Whether a certificate number must be on file.
    #[serde(default)]
    pub requires_certificate: bool,
}

fn default_true() -> bool {
    true
}

fn default_treatment() -> TaxTreatment {
    TaxTreatment::Standard
}

/// A tax category in a tenant's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCategory {
    /// Unique identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Classification.
    pub category_type: CategoryType,
    /// Service types this category covers. `None` covers everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_types: Option<Vec<ServiceType>>,
    /// Non-taxable categories produce no tax at all.
    #[serde(default = "default_true")]
    pub is_taxable: bool,
    /// Descriptive: service crosses state lines.
    #[serde(default)]
    pub is_interstate: bool,
    /// Descriptive: service crosses national borders.
    #[serde(default)]
    pub is_international: bool,
    /// When false, address resolution is skipped and only federal
    /// jurisdictions apply.
    #[serde(default = "default_true")]
    pub requires_jurisdiction_detection: bool,
    /// Treatment used when no rule matches.
    #[serde(default = "default_treatment")]
    pub default_tax_treatment: TaxTreatment,
    /// Share of normal tax retained under [`TaxTreatment::Reduced`], in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_rate_percent: Option<Decimal>,
    /// Conditional overrides, evaluated in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_rules: Vec<CategoryRule>,
    /// Exemption kinds honoured. Empty honours every kind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exemption_rules: Vec<ExemptionRule>,
    /// Lower wins when several categories cover a service type.
    pub priority: u32,
    /// Inactive categories are never selected.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl TaxCategory {
    /// Create an active, taxable, standard-treatment category.
    pub fn new(name: impl Into<String>, category_type: CategoryType, priority: u32) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.into(),
            category_type,
            service_types: None,
            is_taxable: true,
            is_interstate: false,
            is_international: false,
            requires_jurisdiction_detection: true,
            default_tax_treatment: TaxTreatment::Standard,
            reduced_rate_percent: None,
            tax_rules: Vec::new(),
            exemption_rules: Vec::new(),
            priority,
            is_active: true,
        }
    }

    /// Restrict the category to the given service types.
    pub fn with_service_types(mut self, service_types: Vec<ServiceType>) -> Self {
        self.service_types = Some(service_types);
        self
    }

    /// The catch-all "general" category used when no configured category
    /// covers a service type. Non-taxable, with a fixed nil identifier so
    /// fallback results are reproducible.
    pub fn system_default() -> Self {
        Self {
            id: CategoryId::from_uuid(Uuid::nil()),
            is_taxable: false,
            requires_jurisdiction_detection: false,
            priority: u32::MAX,
            ..Self::new("General", CategoryType::General, u32::MAX)
        }
    }

    /// Whether this is the built-in fallback category.
    pub fn is_system_default(&self) -> bool {
        self.id.as_uuid().is_nil()
    }

    /// Whether this category covers `service_type`.
    pub fn covers(&self, service_type: &ServiceType) -> bool {
        match &self.service_types {
            None => true,
            Some(types) => types.contains(service_type),
        }
    }

    /// Decide the treatment for a line. Returns the treatment and the name
    /// of the rule that produced it, if any.
    pub fn treatment_for(&self, ctx: &RuleContext<'_>) -> (TaxTreatment, Option<&str>) {
        self.tax_rules
            .iter()
            .find(|r| r.condition.matches(ctx))
            .map(|r| (r.treatment, Some(r.name.as_str())))
            .unwrap_or((self.default_tax_treatment, None))
    }

    /// Whether an exemption of `exemption_type` is honoured, and whether
    /// it needs a certificate on file.
    pub fn honours_exemption(&self, exemption_type: &str, has_certificate: bool) -> bool {
        if self.exemption_rules.is_empty() {
            return true;
        }
        self.exemption_rules.iter().any(|r| {
            r.exemption_type.eq_ignore_ascii_case(exemption_type)
                && (!r.requires_certificate || has_certificate)
        })
    }
}
