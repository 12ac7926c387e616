//! # External Enrichment
//!
//! An optional third-party tax service can add tax lines the tenant catalog
//! does not configure. The seam is the [`TaxEnrichment`] trait; the HTTP
//! client lives in the API crate, and [`NoEnrichment`] disables the step.
//!
//! Enrichment is strictly additive and bounded:
//!
//! - the call is cut off after a timeout, and any failure falls back to the
//!   internal result with a warning;
//! - an external line is merged only when no internal line exists for the
//!   same jurisdiction code and tax type;
//! - merged lines get the same treatment scale and exemptions as configured
//!   rates;
//! - provider amounts that would overflow the totals discard the whole
//!   response;
//! - every attempt is recorded as an [`ApiCallRecord`].

use std::future::Future;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vtax_catalog::{CalculationMethod, TaxType};
use vtax_core::{CompanyId, ServiceType, Timestamp};

use crate::address::ServiceAddress;
use crate::composer::{
    Composition, JurisdictionBreakdown, LineKey, LinePolicy, LineSource, Pass, TaxLine, TotalsOverflow,
};

/// What the provider is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    /// Tenant.
    pub company_id: CompanyId,
    /// Service type of the line.
    pub service_type: ServiceType,
    /// Taxable base.
    pub base_amount: Decimal,
    /// Service address.
    pub address: ServiceAddress,
    /// Calculation date.
    pub date: Timestamp,
}

/// One tax line reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTaxLine {
    /// Jurisdiction code, matched against catalog codes.
    pub jurisdiction_code: String,
    /// Jurisdiction name.
    pub jurisdiction_name: String,
    /// Breakdown label.
    pub tax_type: TaxType,
    /// Display name.
    pub tax_name: String,
    /// Amount charged.
    pub amount: Decimal,
}

/// A provider's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    /// Tax lines.
    #[serde(default)]
    pub lines: Vec<ExternalTaxLine>,
}

/// Why enrichment failed.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("provider returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The answer could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A source of additional tax lines.
pub trait TaxEnrichment: Send + Sync {
    /// Provider name, recorded on merged lines and call records.
    fn provider(&self) -> &str;

    /// Ask the provider about one line item.
    fn enrich(
        &self,
        request: &EnrichmentRequest,
    ) -> impl Future<Output = Result<EnrichmentResponse, EnrichmentError>> + Send;
}

/// Enrichment disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl TaxEnrichment for NoEnrichment {
    fn provider(&self) -> &str {
        "none"
    }

    async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
        Ok(EnrichmentResponse { lines: Vec::new() })
    }
}

/// Outcome of one provider call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiCallOutcome {
    /// Answer received; `merged` of `returned` lines were added.
    Succeeded { returned: usize, merged: usize },
    /// The call failed.
    Failed { reason: String },
    /// No answer within the timeout.
    TimedOut,
}

/// Record of one provider call, kept with the calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallRecord {
    /// Provider name.
    pub provider: String,
    /// What happened.
    pub outcome: ApiCallOutcome,
    /// Wall-clock latency.
    pub latency_ms: u64,
    /// When the call started.
    pub called_at: Timestamp,
}

impl ApiCallRecord {
    /// Whether the call fell back to the internal result.
    pub fn is_fallback(&self) -> bool {
        !matches!(self.outcome, ApiCallOutcome::Succeeded { .. })
    }
}

/// Call `provider` with a deadline and merge its lines into `composition`.
///
/// Merged lines go through `policy` like configured rates do. Never fails:
/// errors, timeouts and provider amounts that overflow the totals leave
/// `composition` untouched and are reflected in the returned record.
pub async fn enrich_composition<E: TaxEnrichment>(
    provider: &E,
    request: &EnrichmentRequest,
    timeout: Duration,
    policy: &LinePolicy<'_>,
    composition: &mut Composition,
) -> ApiCallRecord {
    let called_at = Timestamp::now();
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, provider.enrich(request)).await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let outcome = match result {
        Ok(Ok(response)) => {
            let returned = response.lines.len();
            let mut enriched = composition.clone();
            match merge_external(&mut enriched, provider.provider(), policy, response) {
                Ok(merged) => {
                    *composition = enriched;
                    tracing::debug!(provider = provider.provider(), returned, merged, "enrichment merged");
                    ApiCallOutcome::Succeeded { returned, merged }
                }
                Err(e) => {
                    tracing::warn!(provider = provider.provider(), error = %e, "enrichment discarded, using internal result");
                    ApiCallOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(provider = provider.provider(), error = %e, "enrichment failed, using internal result");
            ApiCallOutcome::Failed {
                reason: e.to_string(),
            }
        }
        Err(_) => {
            tracing::warn!(
                provider = provider.provider(),
                timeout_ms = timeout.as_millis() as u64,
                "enrichment timed out, using internal result"
            );
            ApiCallOutcome::TimedOut
        }
    };

    ApiCallRecord {
        provider: provider.provider().to_string(),
        outcome,
        latency_ms,
        called_at,
    }
}

/// Add the external lines not already covered internally, reduced by
/// `policy`. Returns how many were added.
///
/// A line whose code names a resolved jurisdiction is credited to it and
/// sees that jurisdiction's exemptions; any other code gets its own row.
/// On error `composition` may hold part of the response.
pub fn merge_external(
    composition: &mut Composition,
    provider: &str,
    policy: &LinePolicy<'_>,
    response: EnrichmentResponse,
) -> Result<usize, TotalsOverflow> {
    let mut merged = 0;
    for ext in response.lines {
        if ext.amount.is_sign_negative() || composition.covers(&ext.jurisdiction_code, ext.tax_type) {
            continue;
        }
        let known = composition
            .jurisdictions
            .iter()
            .find(|j| j.code.eq_ignore_ascii_case(&ext.jurisdiction_code))
            .map(|j| (j.jurisdiction_id, j.code.clone()));
        let (jurisdiction_id, code) = match known {
            Some(found) => found,
            None => {
                composition.jurisdictions.push(JurisdictionBreakdown {
                    jurisdiction_id: None,
                    code: ext.jurisdiction_code.clone(),
                    name: ext.jurisdiction_name.clone(),
                    jurisdiction_type: None,
                    matched_by: None,
                    tax_amount: Decimal::ZERO,
                    inclusive_amount: Decimal::ZERO,
                });
                (None, ext.jurisdiction_code.clone())
            }
        };
        let key = LineKey {
            rate_id: None,
            jurisdiction_id,
            tax_type: ext.tax_type,
        };
        let settled = policy
            .settle(ext.amount, key, &mut composition.exemptions_applied)
            .ok_or(TotalsOverflow)?;
        composition.lines.push(TaxLine {
            source: LineSource::External {
                provider: provider.to_string(),
            },
            jurisdiction_id,
            jurisdiction_code: code,
            jurisdiction_name: ext.jurisdiction_name,
            tax_name: ext.tax_name,
            tax_type: ext.tax_type,
            rate_type: None,
            calculation_method: CalculationMethod::Standard,
            pass: Pass::External,
            taxable_base: Decimal::ZERO,
            gross_amount: settled.gross,
            exempted_amount: settled.exempted,
            amount: settled.charged(),
            is_inclusive: false,
            is_recoverable: false,
        });
        merged += 1;
    }
    if merged > 0 {
        composition.recompute_totals()?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vtax_catalog::{CategoryType, TaxCategory, TaxExemption, TaxTreatment};
    use vtax_core::{ClientId, ExemptionId, JurisdictionId};

    struct Fixed(Vec<ExternalTaxLine>);

    impl TaxEnrichment for Fixed {
        fn provider(&self) -> &str {
            "fixed"
        }

        async fn enrich(&self, _r: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
            Ok(EnrichmentResponse { lines: self.0.clone() })
        }
    }

    struct Slow;

    impl TaxEnrichment for Slow {
        fn provider(&self) -> &str {
            "slow"
        }

        async fn enrich(&self, _r: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(EnrichmentResponse { lines: Vec::new() })
        }
    }

    struct Broken;

    impl TaxEnrichment for Broken {
        fn provider(&self) -> &str {
            "broken"
        }

        async fn enrich(&self, _r: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
            Err(EnrichmentError::Rejected {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    fn request() -> EnrichmentRequest {
        EnrichmentRequest {
            company_id: CompanyId::new(),
            service_type: ServiceType::new("voip_fixed").unwrap(),
            base_amount: dec!(100),
            address: ServiceAddress::default(),
            date: Timestamp::now(),
        }
    }

    fn voip() -> TaxCategory {
        TaxCategory::new("VoIP", CategoryType::VoipFixed, 10)
    }

    fn policy<'a>(
        category: &'a TaxCategory,
        exemptions: &'a [TaxExemption],
        client_id: Option<&'a ClientId>,
    ) -> LinePolicy<'a> {
        LinePolicy {
            exemptions,
            category,
            treatment: TaxTreatment::Standard,
            client_id,
            at: Timestamp::parse("2026-03-01T00:00:00Z").unwrap(),
        }
    }

    fn internal() -> Composition {
        let mut c = Composition {
            jurisdictions: vec![JurisdictionBreakdown {
                jurisdiction_id: None,
                code: "US".into(),
                name: "United States".into(),
                jurisdiction_type: None,
                matched_by: None,
                tax_amount: Decimal::ZERO,
                inclusive_amount: Decimal::ZERO,
            }],
            ..Composition::default()
        };
        c.lines.push(TaxLine {
            source: LineSource::External {
                provider: "seed".into(),
            },
            jurisdiction_id: None,
            jurisdiction_code: "US".into(),
            jurisdiction_name: "United States".into(),
            tax_name: "Federal Excise".into(),
            tax_type: TaxType::Federal,
            rate_type: None,
            calculation_method: CalculationMethod::Standard,
            pass: Pass::Base,
            taxable_base: dec!(100),
            gross_amount: dec!(3),
            exempted_amount: Decimal::ZERO,
            amount: dec!(3),
            is_inclusive: false,
            is_recoverable: false,
        });
        c.recompute_totals().unwrap();
        c
    }

    fn ext(code: &str, tax_type: TaxType, amount: Decimal) -> ExternalTaxLine {
        ExternalTaxLine {
            jurisdiction_code: code.into(),
            jurisdiction_name: code.into(),
            tax_type,
            tax_name: format!("{code} {tax_type}"),
            amount,
        }
    }

    #[tokio::test]
    async fn merges_only_uncovered_pairs() {
        let provider = Fixed(vec![
            ext("us", TaxType::Federal, dec!(99)),
            ext("US", TaxType::SpecialDistrict, dec!(0.40)),
            ext("TX-AUS", TaxType::Municipal, dec!(1.10)),
        ]);
        let mut c = internal();
        let category = voip();
        let record = enrich_composition(
            &provider,
            &request(),
            Duration::from_secs(1),
            &policy(&category, &[], None),
            &mut c,
        )
        .await;
        assert_eq!(
            record.outcome,
            ApiCallOutcome::Succeeded {
                returned: 3,
                merged: 2
            }
        );
        assert!(!record.is_fallback());
        assert_eq!(c.total_tax, dec!(4.50));
        assert_eq!(c.jurisdictions.len(), 2);
        assert_eq!(c.jurisdictions[1].tax_amount, dec!(1.10));
        assert_eq!(c.lines[1].pass, Pass::External);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back_to_internal_result() {
        let mut c = internal();
        let before = c.clone();
        let category = voip();
        let record = enrich_composition(
            &Slow,
            &request(),
            Duration::from_millis(2000),
            &policy(&category, &[], None),
            &mut c,
        )
        .await;
        assert_eq!(record.outcome, ApiCallOutcome::TimedOut);
        assert!(record.is_fallback());
        assert_eq!(c, before);
    }

    #[tokio::test]
    async fn provider_error_falls_back_to_internal_result() {
        let mut c = internal();
        let before = c.clone();
        let category = voip();
        let record = enrich_composition(
            &Broken,
            &request(),
            Duration::from_secs(1),
            &policy(&category, &[], None),
            &mut c,
        )
        .await;
        assert!(matches!(record.outcome, ApiCallOutcome::Failed { ref reason } if reason.contains("503")));
        assert_eq!(c, before);
    }

    #[tokio::test]
    async fn no_enrichment_adds_nothing() {
        let mut c = internal();
        let category = voip();
        let record = enrich_composition(
            &NoEnrichment,
            &request(),
            Duration::from_secs(1),
            &policy(&category, &[], None),
            &mut c,
        )
        .await;
        assert_eq!(
            record.outcome,
            ApiCallOutcome::Succeeded {
                returned: 0,
                merged: 0
            }
        );
        assert_eq!(c.total_tax, dec!(3));
    }

    #[tokio::test]
    async fn exempt_client_is_not_charged_provider_lines() {
        let us = JurisdictionId::new();
        let client = ClientId::new();
        let exemptions = vec![TaxExemption {
            id: ExemptionId::new(),
            client_id: client,
            exemption_type: "government".into(),
            certificate_number: Some("GOV-7".into()),
            jurisdiction_id: Some(us),
            category_id: None,
            tax_types: vec![],
            exemption_percent: dec!(100),
            effective_date: Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
            expiry_date: None,
            is_active: true,
        }];
        let mut c = internal();
        c.jurisdictions[0].jurisdiction_id = Some(us);
        c.lines[0].jurisdiction_id = Some(us);
        c.recompute_totals().unwrap();

        let provider = Fixed(vec![ext("US", TaxType::SpecialDistrict, dec!(4.00))]);
        let category = voip();
        let record = enrich_composition(
            &provider,
            &request(),
            Duration::from_secs(1),
            &policy(&category, &exemptions, Some(&client)),
            &mut c,
        )
        .await;
        assert!(!record.is_fallback());
        let merged = &c.lines[1];
        assert_eq!(merged.gross_amount, dec!(4));
        assert_eq!(merged.exempted_amount, dec!(4));
        assert_eq!(merged.amount, Decimal::ZERO);
        assert_eq!(c.jurisdictions[0].tax_amount, dec!(3));
        assert_eq!(c.exemptions_applied.len(), 1);
        assert_eq!(c.exemptions_applied[0].rate_id, None);
        assert_eq!(c.exemptions_applied[0].jurisdiction_id, Some(us));
    }

    #[tokio::test]
    async fn reduced_treatment_scales_provider_lines() {
        let mut category = voip();
        category.reduced_rate_percent = Some(dec!(50));
        let reduced = LinePolicy {
            treatment: TaxTreatment::Reduced,
            ..policy(&category, &[], None)
        };
        let provider = Fixed(vec![ext("TX-AUS", TaxType::Municipal, dec!(1.10))]);
        let mut c = internal();
        enrich_composition(&provider, &request(), Duration::from_secs(1), &reduced, &mut c).await;
        assert_eq!(c.lines[1].amount, dec!(0.55));
        assert_eq!(c.total_tax, dec!(3.55));
    }

    #[tokio::test]
    async fn overflowing_provider_amounts_fall_back() {
        let provider = Fixed(vec![
            ext("TX", TaxType::State, Decimal::MAX),
            ext("TX-AUS", TaxType::Municipal, Decimal::MAX),
        ]);
        let mut c = internal();
        let before = c.clone();
        let category = voip();
        let record = enrich_composition(
            &provider,
            &request(),
            Duration::from_secs(1),
            &policy(&category, &[], None),
            &mut c,
        )
        .await;
        assert!(record.is_fallback());
        assert!(matches!(record.outcome, ApiCallOutcome::Failed { ref reason } if reason.contains("decimal range")));
        assert_eq!(c, before);
    }
}
