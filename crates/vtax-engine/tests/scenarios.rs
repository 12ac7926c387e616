//! # End-to-End Calculation Scenarios
//!
//! Runs the calculator against `fixtures/voip-catalog.yaml`: federal,
//! Texas, Travis County, Austin and a downtown 911 district.

use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vtax_catalog::{load_catalog, LoadMode, TaxCatalog, TaxTreatment, TaxType};
use vtax_core::{round_display, ClientId, ServiceType, Timestamp};
use vtax_engine::{
    CalculationError, CalculationItem, CalculationWarning, EnrichmentError, EnrichmentRequest,
    EnrichmentResponse, ExternalTaxLine, Pass, ServiceAddress, TaxCalculator, TaxEnrichment,
    MAX_TAXABLE_AMOUNT,
};

fn fixture() -> TaxCatalog {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/voip-catalog.yaml");
    let loaded = load_catalog(&path, LoadMode::Strict).expect("fixture catalog loads");
    loaded.catalog
}

fn item(service: &str, base: Decimal, address: ServiceAddress) -> CalculationItem {
    CalculationItem::new(
        ServiceType::new(service).unwrap(),
        base,
        Timestamp::parse("2026-03-15T12:00:00Z").unwrap(),
    )
    .with_address(address)
}

fn austin() -> ServiceAddress {
    ServiceAddress {
        street: Some("301 W 2nd St".into()),
        city: Some("Austin".into()),
        state_code: Some("TX".into()),
        zip_code: Some("78701".into()),
        ..ServiceAddress::default()
    }
}

fn downtown() -> ServiceAddress {
    ServiceAddress {
        latitude: Some(dec!(30.2672)),
        longitude: Some(dec!(-97.7431)),
        ..austin()
    }
}

#[test]
fn federal_local_and_compound_state_tax() {
    let catalog = fixture();
    let r = TaxCalculator::new(&catalog)
        .calculate(item("voip_fixed", dec!(100.00), austin()))
        .unwrap();

    let lines: Vec<_> = r
        .lines
        .iter()
        .map(|l| (l.jurisdiction_code.as_str(), l.pass, l.amount))
        .collect();
    assert_eq!(
        lines,
        vec![
            ("US", Pass::Base, dec!(3.00)),
            ("TX-AUS", Pass::Base, dec!(1.50)),
            ("TX", Pass::Compound, dec!(5.225)),
        ]
    );
    assert_eq!(r.total_tax, dec!(9.725));
    assert_eq!(r.final_amount, dec!(109.725));
    assert_eq!(round_display(r.total_tax), dec!(9.73));
    assert_eq!(r.breakdown[&TaxType::Federal], dec!(3));
    assert_eq!(r.breakdown[&TaxType::Local], dec!(1.5));
    assert_eq!(r.breakdown[&TaxType::State], dec!(5.225));
    assert!(r.errors.is_empty());
    assert!(r.warnings.is_empty());
}

#[test]
fn coordinates_pull_in_the_special_district() {
    let catalog = fixture();
    let r = TaxCalculator::new(&catalog)
        .calculate(item("voip_fixed", dec!(100), downtown()))
        .unwrap();
    let codes: Vec<_> = r.jurisdictions.iter().map(|j| j.code.as_str()).collect();
    assert_eq!(codes, vec!["US", "TX", "TX-AUS", "TX-AUS-911D"]);
    // 3 + 1.50 + 0.10, then 5% of 104.60
    assert_eq!(r.total_tax, dec!(9.93));
}

#[test]
fn base_below_threshold_contributes_zero() {
    let catalog = fixture();
    let r = TaxCalculator::new(&catalog)
        .calculate(item("voip_fixed", dec!(5), downtown()))
        .unwrap();
    let district = r
        .lines
        .iter()
        .find(|l| l.jurisdiction_code == "TX-AUS-911D")
        .unwrap();
    assert_eq!(district.amount, Decimal::ZERO);
}

#[test]
fn address_without_usable_fields_taxes_federal_only_with_warning() {
    let catalog = fixture();
    let bare = ServiceAddress {
        street: Some("somewhere".into()),
        ..ServiceAddress::default()
    };
    let r = TaxCalculator::new(&catalog)
        .calculate(item("voip_fixed", dec!(100), bare))
        .unwrap();
    assert!(r.has_ambiguous_jurisdiction());
    assert_eq!(r.jurisdictions.len(), 1);
    assert_eq!(r.jurisdictions[0].code, "US");
    assert_eq!(r.total_tax, dec!(3));
}

#[test]
fn tiered_county_tax_on_long_distance() {
    let catalog = fixture();
    let travis = ServiceAddress {
        fips_code: Some("4845305000".into()),
        ..ServiceAddress::default()
    };
    let r = TaxCalculator::new(&catalog)
        .calculate(item("long_distance", dec!(300), travis))
        .unwrap();
    // 50 * 2% + 150 * 1% + 1.00 fixed
    assert_eq!(r.breakdown[&TaxType::County], dec!(3.5));
    assert_eq!(r.breakdown[&TaxType::Federal], dec!(9));
    assert_eq!(r.total_tax, dec!(12.5));
}

#[test]
fn international_usage_is_taxed_per_minute_without_address() {
    let catalog = fixture();
    let mut i = item("international", dec!(40), ServiceAddress::default());
    i.minutes = Some(dec!(1000));
    let r = TaxCalculator::new(&catalog).calculate(i).unwrap();
    assert_eq!(r.total_tax, dec!(2));
    assert!(!r.has_ambiguous_jurisdiction());

    let missing = item("international", dec!(40), ServiceAddress::default());
    match TaxCalculator::new(&catalog).calculate(missing) {
        Err(CalculationError::Validation { fields }) => assert_eq!(fields[0].field, "minutes"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn government_exemption_removes_state_tax() {
    let catalog = fixture();
    let mut i = item("voip_fixed", dec!(100), austin());
    let client: ClientId =
        serde_json::from_value(serde_json::json!("0b6f3c2e-0006-4000-8000-000000000001")).unwrap();
    i.client_id = Some(client);
    let r = TaxCalculator::new(&catalog).calculate(i).unwrap();
    assert_eq!(r.total_tax, dec!(4.5));
    assert_eq!(r.exemptions_applied.len(), 1);
    assert_eq!(r.exemptions_applied[0].tax_type, TaxType::State);
}

#[test]
fn de_minimis_rule_and_non_taxable_category() {
    let catalog = fixture();
    let small = TaxCalculator::new(&catalog)
        .calculate(item("voip_fixed", dec!(0.25), austin()))
        .unwrap();
    assert_eq!(small.treatment, TaxTreatment::Exempt);
    assert_eq!(small.total_tax, Decimal::ZERO);

    let data = TaxCalculator::new(&catalog)
        .calculate(item("internet", dec!(80), austin()))
        .unwrap();
    assert!(data.lines.is_empty());
    assert_eq!(data.final_amount, dec!(80));
}

#[test]
fn taxable_amount_is_bounded() {
    let catalog = fixture();
    let calc = TaxCalculator::new(&catalog);
    let at_limit = calc
        .calculate(item("voip_fixed", MAX_TAXABLE_AMOUNT, austin()))
        .unwrap();
    assert!(at_limit.total_tax > Decimal::ZERO);

    for base in [MAX_TAXABLE_AMOUNT + Decimal::ONE, Decimal::MAX] {
        match calc.calculate(item("voip_fixed", base, austin())) {
            Err(CalculationError::Validation { fields }) => {
                assert_eq!(fields[0].field, "base_amount");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    // Quantity can push an in-range unit price over the limit.
    let mut i = item("voip_fixed", dec!(1000000), austin());
    i.quantity = Decimal::new(1_000_000_000_000, 0);
    assert!(matches!(calc.calculate(i), Err(CalculationError::Validation { .. })));
}

#[test]
fn recalculation_is_byte_identical() {
    let catalog = fixture();
    let calc = TaxCalculator::new(&catalog);
    let a = calc.calculate(item("voip_fixed", dec!(123.45), downtown())).unwrap();
    let b = calc.calculate(item("voip_fixed", dec!(123.45), downtown())).unwrap();
    assert_eq!(a.digest, b.digest);
    assert_eq!(
        serde_json::to_vec(&a.breakdown).unwrap(),
        serde_json::to_vec(&b.breakdown).unwrap()
    );
    assert_eq!(
        serde_json::to_vec(&a.lines).unwrap(),
        serde_json::to_vec(&b.lines).unwrap()
    );
}

struct CityProvider;

impl TaxEnrichment for CityProvider {
    fn provider(&self) -> &str {
        "city-feed"
    }

    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
        assert_eq!(request.base_amount, dec!(100));
        Ok(EnrichmentResponse {
            lines: vec![
                ExternalTaxLine {
                    jurisdiction_code: "TX-AUS".into(),
                    jurisdiction_name: "Austin".into(),
                    tax_type: TaxType::Local,
                    tax_name: "Duplicate 911".into(),
                    amount: dec!(7),
                },
                ExternalTaxLine {
                    jurisdiction_code: "TX-AUS".into(),
                    jurisdiction_name: "Austin".into(),
                    tax_type: TaxType::Municipal,
                    tax_name: "Right-of-Way Fee".into(),
                    amount: dec!(0.35),
                },
            ],
        })
    }
}

struct DistrictProvider;

impl TaxEnrichment for DistrictProvider {
    fn provider(&self) -> &str {
        "district-feed"
    }

    async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
        Ok(EnrichmentResponse {
            lines: vec![ExternalTaxLine {
                jurisdiction_code: "TX".into(),
                jurisdiction_name: "Texas".into(),
                tax_type: TaxType::SpecialDistrict,
                tax_name: "Texas Transit Fee".into(),
                amount: dec!(2.00),
            }],
        })
    }
}

struct DownProvider;

impl TaxEnrichment for DownProvider {
    fn provider(&self) -> &str {
        "down"
    }

    async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
        Err(EnrichmentError::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn enrichment_adds_uncovered_lines_only() {
    let catalog = fixture();
    let r = TaxCalculator::new(&catalog)
        .calculate_enriched(item("voip_fixed", dec!(100), austin()), &CityProvider)
        .await
        .unwrap();
    assert_eq!(r.total_tax, dec!(10.075));
    assert_eq!(r.breakdown[&TaxType::Municipal], dec!(0.35));
    assert_eq!(r.api_calls.len(), 1);
    assert!(!r.api_calls[0].is_fallback());
}

#[tokio::test]
async fn enrichment_failure_keeps_internal_result() {
    let catalog = fixture();
    let calc = TaxCalculator::new(&catalog);
    let internal = calc.calculate(item("voip_fixed", dec!(100), austin())).unwrap();
    let r = calc
        .calculate_enriched(item("voip_fixed", dec!(100), austin()), &DownProvider)
        .await
        .unwrap();
    assert_eq!(r.total_tax, internal.total_tax);
    assert_eq!(r.digest, internal.digest);
    assert!(matches!(
        r.warnings.last(),
        Some(CalculationWarning::EnrichmentFallback { provider, .. }) if provider == "down"
    ));
    assert_eq!(r.api_calls.len(), 1);
    assert!(r.api_calls[0].is_fallback());
}

#[tokio::test]
async fn enrichment_is_skipped_for_untaxed_lines() {
    let catalog = fixture();
    let r = TaxCalculator::new(&catalog)
        .calculate_enriched(item("internet", dec!(80), austin()), &CityProvider)
        .await
        .unwrap();
    assert!(r.api_calls.is_empty());
}

#[tokio::test]
async fn exemptions_cover_provider_lines() {
    let catalog = fixture();
    let calc = TaxCalculator::new(&catalog);

    let billed = calc
        .calculate_enriched(item("voip_fixed", dec!(100), austin()), &DistrictProvider)
        .await
        .unwrap();
    assert_eq!(billed.total_tax, dec!(11.725));

    // The government client is exempt from everything Texas levies.
    let mut i = item("voip_fixed", dec!(100), austin());
    i.client_id = Some(
        serde_json::from_value(serde_json::json!("0b6f3c2e-0006-4000-8000-000000000001")).unwrap(),
    );
    let exempt = calc.calculate_enriched(i, &DistrictProvider).await.unwrap();
    assert_eq!(exempt.total_tax, dec!(4.5));
    let fee = exempt
        .lines
        .iter()
        .find(|l| l.pass == Pass::External)
        .unwrap();
    assert_eq!(fee.gross_amount, dec!(2));
    assert_eq!(fee.amount, Decimal::ZERO);
    assert_eq!(exempt.exemptions_applied.len(), 2);
    assert!(exempt.exemptions_applied.iter().any(|e| e.rate_id.is_none()));
    let texas = exempt.jurisdictions.iter().find(|j| j.code == "TX").unwrap();
    assert_eq!(texas.tax_amount, Decimal::ZERO);
}
