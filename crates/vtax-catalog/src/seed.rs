//! # Default Configuration
//!
//! Starter configuration for a new tenant: a federal jurisdiction, the
//! standard VoIP/telecom categories, matching profiles and a small set of
//! federal rates. Tenants edit these afterwards; the values are a starting
//! point, not a statement of current law.

use rust_decimal::Decimal;
use serde_json::json;
use vtax_core::{ActorId, CompanyId, ServiceType, Timestamp};

use crate::catalog::TaxCatalog;
use crate::category::{CategoryType, TaxCategory};
use crate::error::CatalogResult;
use crate::jurisdiction::{FilingFrequency, FilingRequirements, Jurisdiction, JurisdictionType, TaxAuthority};
use crate::profile::{CalculationEngine, FieldDefinition, FieldType, TaxProfile};
use crate::rate::{RateModel, TaxType, VoipTaxRate};

fn service_types(names: &[&str]) -> Vec<ServiceType> {
    names.iter().filter_map(|n| ServiceType::new(*n).ok()).collect()
}

/// The federal jurisdiction. Priority 1, no parent.
pub fn federal_jurisdiction() -> Jurisdiction {
    let mut fed = Jurisdiction::new(JurisdictionType::Federal, "United States", "US", 1);
    fed.authority = Some(TaxAuthority {
        name: "Internal Revenue Service".into(),
        website: Some("https://www.irs.gov".into()),
        contact: None,
    });
    fed.filing_requirements = Some(FilingRequirements {
        frequency: FilingFrequency::Quarterly,
        due_day: Some(30),
        registration_required: true,
    });
    fed
}

/// The standard telecom categories, in priority order.
pub fn default_voip_categories() -> Vec<TaxCategory> {
    let mut international = TaxCategory::new("International", CategoryType::International, 30)
        .with_service_types(service_types(&["international"]));
    international.is_international = true;
    international.requires_jurisdiction_detection = false;

    let mut long_distance = TaxCategory::new("Long Distance", CategoryType::LongDistance, 20)
        .with_service_types(service_types(&["long_distance"]));
    long_distance.is_interstate = true;

    let mut nomadic = TaxCategory::new("VoIP Nomadic", CategoryType::VoipNomadic, 11)
        .with_service_types(service_types(&["voip_nomadic"]));
    nomadic.is_interstate = true;

    let mut data = TaxCategory::new("Internet Access", CategoryType::Data, 40)
        .with_service_types(service_types(&["data", "internet"]));
    data.is_taxable = false;

    vec![
        TaxCategory::new("Local Service", CategoryType::LocalService, 5)
            .with_service_types(service_types(&["local_service"])),
        TaxCategory::new("VoIP Fixed", CategoryType::VoipFixed, 10)
            .with_service_types(service_types(&["voip_fixed", "voip_unlimited", "hosted_pbx"])),
        nomadic,
        long_distance,
        international,
        data,
        TaxCategory::new("Equipment", CategoryType::Equipment, 50)
            .with_service_types(service_types(&["equipment", "hardware"])),
    ]
}

/// Profiles for the given categories. VoIP categories get per-line and
/// usage inputs; long distance gets minutes; everything else is general.
pub fn default_profiles(categories: &[TaxCategory]) -> Vec<TaxProfile> {
    let line_count = FieldDefinition::new(FieldType::Integer)
        .with_default(json!(1))
        .with_min(Decimal::ONE);
    let minutes = FieldDefinition::new(FieldType::Decimal)
        .with_default(json!("0"))
        .with_min(Decimal::ZERO);

    categories
        .iter()
        .map(|c| {
            let mut profile = match c.category_type {
                CategoryType::VoipFixed | CategoryType::VoipNomadic | CategoryType::LocalService => {
                    TaxProfile::new(format!("{} Profile", c.name), CalculationEngine::VoipTelecom)
                        .with_field("line_count", line_count.clone(), true)
                        .with_field("minutes", minutes.clone(), false)
                }
                CategoryType::LongDistance | CategoryType::International => {
                    TaxProfile::new(format!("{} Profile", c.name), CalculationEngine::VoipTelecom)
                        .with_field("minutes", minutes.clone(), false)
                }
                _ => TaxProfile::new(format!("{} Profile", c.name), CalculationEngine::General),
            };
            profile.category_id = Some(c.id);
            profile
        })
        .collect()
}

/// Federal rates for the given categories.
pub fn default_federal_rates(
    federal: &Jurisdiction,
    categories: &[TaxCategory],
    effective_date: Timestamp,
) -> Vec<VoipTaxRate> {
    let mut rates = Vec::new();
    for c in categories.iter().filter(|c| c.is_taxable) {
        match c.category_type {
            CategoryType::LocalService
            | CategoryType::LongDistance
            | CategoryType::VoipFixed
            | CategoryType::VoipNomadic => {
                rates.push(
                    VoipTaxRate::new(
                        federal.id,
                        c.id,
                        TaxType::Federal,
                        "Federal Excise Tax",
                        RateModel::Percentage {
                            percentage_rate: Decimal::new(3, 0),
                        },
                        effective_date,
                    )
                    .with_priority(10),
                );
            }
            _ => {}
        }
        if matches!(c.category_type, CategoryType::VoipFixed | CategoryType::VoipNomadic) {
            rates.push(
                VoipTaxRate::new(
                    federal.id,
                    c.id,
                    TaxType::Federal,
                    "Regulatory Recovery Fee",
                    RateModel::PerLine {
                        fixed_amount: Decimal::new(25, 2),
                    },
                    effective_date,
                )
                .with_priority(20),
            );
        }
    }
    rates
}

/// A complete starter catalog for `company_id`.
pub fn default_catalog(
    company_id: CompanyId,
    actor_id: ActorId,
    effective_date: Timestamp,
) -> CatalogResult<TaxCatalog> {
    let mut catalog = TaxCatalog::new(company_id);
    let federal = federal_jurisdiction();
    let categories = default_voip_categories();
    catalog.profiles = default_profiles(&categories);
    for rate in default_federal_rates(&federal, &categories, effective_date) {
        catalog.add_rate(rate, actor_id, effective_date)?;
    }
    catalog.jurisdictions.push(federal);
    catalog.categories = categories;
    Ok(catalog)
}
