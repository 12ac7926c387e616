//! # Calculation API
//!
//! - **POST `/v1/tax/calculate`**: calculate a line item without recording it
//! - **POST `/v1/tax/calculations`**: calculate and record in the ledger
//! - **GET `/v1/tax/calculations`**: list the tenant's calculations,
//!   optionally for one quote or invoice
//! - **GET `/v1/tax/calculations/{id}`**: one calculation record
//! - **GET `/v1/tax/calculations/{id}/history`**: status history and events
//! - **POST `/v1/tax/calculations/{id}/validate`**: reviewer sign-off
//! - **POST `/v1/tax/calculations/{id}/apply`**: commit to the billing document
//! - **POST `/v1/tax/calculations/{id}/void`**: cancel
//! - **POST `/v1/tax/calculations/{id}/adjust`**: recompute and supersede
//!
//! Mutations accept an optional `expected_version`; a stale version is
//! rejected with 409 and the record is left untouched.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vtax_core::CalculationId;
use vtax_engine::{CalculationItem, CalculationResult, CalculatorOptions, TaxCalculator};
use vtax_ledger::{
    CalculableKind, CalculableRef, CalculationType, LedgerEvent, NewCalculation, StatusChange,
    TaxCalculation, TransitionEvidence,
};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Record a calculation for a quote or invoice.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PersistCalculationRequest {
    #[schema(value_type = String)]
    pub calculable_kind: CalculableKind,
    pub calculable_id: Uuid,
    #[schema(value_type = String)]
    pub calculation_type: CalculationType,
    /// The line item, as accepted by `POST /v1/tax/calculate`.
    #[schema(value_type = Object)]
    pub item: CalculationItem,
}

impl Validate for PersistCalculationRequest {
    fn validate(&self) -> Result<(), String> {
        match self.calculation_type {
            CalculationType::Preview => {
                Err("preview calculations are not recorded; use POST /v1/tax/calculate".into())
            }
            CalculationType::Adjustment => {
                Err("adjustments are created with POST /v1/tax/calculations/{id}/adjust".into())
            }
            CalculationType::Quote | CalculationType::Invoice => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub calculable_kind: Option<CalculableKind>,
    pub calculable_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ValidateRequest {
    pub expected_version: Option<u64>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApplyRequest {
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoidRequest {
    pub expected_version: Option<u64>,
    pub reason: String,
}

impl Validate for VoidRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustRequest {
    pub expected_version: Option<u64>,
    pub reason: String,
    /// Replacement input. Defaults to the original input recalculated
    /// against the current catalog.
    #[schema(value_type = Option<Object>)]
    pub item: Option<CalculationItem>,
}

impl Validate for AdjustRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    #[schema(value_type = Vec<Object>)]
    pub status_history: Vec<StatusChange>,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<LedgerEvent>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdjustResponse {
    /// The prior calculation, now `adjusted`.
    #[schema(value_type = Object)]
    pub superseded: TaxCalculation,
    /// The new `adjustment` calculation.
    #[schema(value_type = Object)]
    pub replacement: TaxCalculation,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tax/calculate", post(calculate_preview))
        .route(
            "/v1/tax/calculations",
            get(list_calculations).post(persist_calculation),
        )
        .route("/v1/tax/calculations/{id}", get(get_calculation))
        .route("/v1/tax/calculations/{id}/history", get(calculation_history))
        .route("/v1/tax/calculations/{id}/validate", post(validate_calculation))
        .route("/v1/tax/calculations/{id}/apply", post(apply_calculation))
        .route("/v1/tax/calculations/{id}/void", post(void_calculation))
        .route("/v1/tax/calculations/{id}/adjust", post(adjust_calculation))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run one line item against the caller's current catalog snapshot,
/// consulting the external provider when one is configured.
pub(crate) async fn calculate_for(
    state: &AppState,
    caller: &CallerIdentity,
    item: CalculationItem,
) -> Result<CalculationResult, AppError> {
    let catalog = state.catalog(&caller.company_id)?;
    let mut options = CalculatorOptions::default();
    if let Some(enrichment) = &state.config.enrichment {
        options.enrichment_timeout = enrichment.timeout;
    }
    let calculator = TaxCalculator::new(&catalog).with_options(options);
    let result = match &state.enrichment {
        Some(provider) => calculator.calculate_enriched(item, provider).await?,
        None => calculator.calculate(item)?,
    };
    tracing::debug!(
        company_id = %caller.company_id,
        service_type = %result.service_type,
        total_tax = %result.total_tax,
        digest = %result.digest,
        "line item calculated"
    );
    Ok(result)
}

/// Map an optional JSON body to its default when the request has none.
fn optional_json<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match body {
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        other => extract_json(other),
    }
}

fn evidence(caller: &CallerIdentity, reason: impl Into<String>) -> TransitionEvidence {
    TransitionEvidence::new(caller.actor_id, reason)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/tax/calculate
#[utoipa::path(
    post,
    path = "/v1/tax/calculate",
    request_body(content = Object, description = "Line item to tax"),
    responses(
        (status = 200, description = "Calculation result with per-jurisdiction breakdown"),
        (status = 422, description = "Configuration or input validation error", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn calculate_preview(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CalculationItem>, JsonRejection>,
) -> Result<Json<CalculationResult>, AppError> {
    require_role(&caller, Role::Operator)?;
    let item = extract_json(body)?;
    Ok(Json(calculate_for(&state, &caller, item).await?))
}

/// POST /v1/tax/calculations
#[utoipa::path(
    post,
    path = "/v1/tax/calculations",
    request_body = PersistCalculationRequest,
    responses(
        (status = 201, description = "Calculation recorded in calculated status"),
        (status = 422, description = "Configuration or input validation error", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn persist_calculation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<PersistCalculationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaxCalculation>), AppError> {
    require_role(&caller, Role::Operator)?;
    let req = extract_validated_json(body)?;
    let result = calculate_for(&state, &caller, req.item.clone()).await?;

    let write = state.ledger.create(
        NewCalculation {
            company_id: caller.company_id,
            calculable: CalculableRef::new(req.calculable_kind, req.calculable_id),
            calculation_type: req.calculation_type,
            input: req.item,
            result,
        },
        &evidence(&caller, "calculated"),
    );
    state.persist_ledger(&[&write]).await?;
    Ok((StatusCode::CREATED, Json(write.record)))
}

/// GET /v1/tax/calculations
#[utoipa::path(
    get,
    path = "/v1/tax/calculations",
    params(
        ("calculable_kind" = Option<String>, Query, description = "quote, invoice, quote_item or invoice_item"),
        ("calculable_id" = Option<String>, Query, description = "Billing document id"),
    ),
    responses((status = 200, description = "Calculations, oldest first")),
    tag = "calculations"
)]
pub(crate) async fn list_calculations(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TaxCalculation>>, AppError> {
    require_role(&caller, Role::Operator)?;
    let calculable = match (query.calculable_kind, query.calculable_id) {
        (Some(kind), Some(id)) => Some(CalculableRef::new(kind, id)),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "calculable_kind and calculable_id must be given together".into(),
            ))
        }
    };
    Ok(Json(state.ledger.list(&caller.company_id, calculable.as_ref())))
}

/// GET /v1/tax/calculations/{id}
#[utoipa::path(
    get,
    path = "/v1/tax/calculations/{id}",
    params(("id" = String, Path, description = "Calculation id")),
    responses(
        (status = 200, description = "Calculation record"),
        (status = 404, description = "No such calculation for this company", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn get_calculation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<TaxCalculation>, AppError> {
    require_role(&caller, Role::Operator)?;
    let id = CalculationId::from_uuid(id);
    state
        .ledger
        .get(&caller.company_id, &id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("calculation {id} not found")))
}

/// GET /v1/tax/calculations/{id}/history
#[utoipa::path(
    get,
    path = "/v1/tax/calculations/{id}/history",
    params(("id" = String, Path, description = "Calculation id")),
    responses(
        (status = 200, description = "Status history and event log", body = HistoryResponse),
        (status = 404, description = "No such calculation for this company", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn calculation_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    require_role(&caller, Role::Operator)?;
    let id = CalculationId::from_uuid(id);
    Ok(Json(HistoryResponse {
        status_history: state.ledger.history(&caller.company_id, &id)?,
        events: state.ledger.events(&caller.company_id, &id)?,
    }))
}

/// POST /v1/tax/calculations/{id}/validate
#[utoipa::path(
    post,
    path = "/v1/tax/calculations/{id}/validate",
    params(("id" = String, Path, description = "Calculation id")),
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Calculation validated (repeat validation is a no-op)"),
        (status = 403, description = "Reviewer role required", body = crate::error::ErrorBody),
        (status = 409, description = "Voided or stale version", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn validate_calculation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<TaxCalculation>, AppError> {
    require_role(&caller, Role::Reviewer)?;
    let req: ValidateRequest = optional_json(body)?;
    let write = state.ledger.validate(
        &caller.company_id,
        &CalculationId::from_uuid(id),
        req.expected_version,
        req.notes,
        &evidence(&caller, "validated"),
    )?;
    if !write.events.is_empty() {
        state.persist_ledger(&[&write]).await?;
    }
    Ok(Json(write.record))
}

/// POST /v1/tax/calculations/{id}/apply
#[utoipa::path(
    post,
    path = "/v1/tax/calculations/{id}/apply",
    params(("id" = String, Path, description = "Calculation id")),
    request_body = ApplyRequest,
    responses(
        (status = 200, description = "Calculation applied"),
        (status = 409, description = "Illegal transition or stale version", body = crate::error::ErrorBody),
        (status = 422, description = "Calculation is incomplete", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn apply_calculation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<Json<TaxCalculation>, AppError> {
    require_role(&caller, Role::Operator)?;
    let req: ApplyRequest = optional_json(body)?;
    let write = state.ledger.apply(
        &caller.company_id,
        &CalculationId::from_uuid(id),
        req.expected_version,
        &evidence(&caller, "applied"),
    )?;
    state.persist_ledger(&[&write]).await?;
    Ok(Json(write.record))
}

/// POST /v1/tax/calculations/{id}/void
#[utoipa::path(
    post,
    path = "/v1/tax/calculations/{id}/void",
    params(("id" = String, Path, description = "Calculation id")),
    request_body = VoidRequest,
    responses(
        (status = 200, description = "Calculation voided"),
        (status = 409, description = "Illegal transition or stale version", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn void_calculation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<VoidRequest>, JsonRejection>,
) -> Result<Json<TaxCalculation>, AppError> {
    require_role(&caller, Role::Operator)?;
    let req = extract_validated_json(body)?;
    let write = state.ledger.void(
        &caller.company_id,
        &CalculationId::from_uuid(id),
        req.expected_version,
        &evidence(&caller, req.reason.trim()),
    )?;
    state.persist_ledger(&[&write]).await?;
    Ok(Json(write.record))
}

/// POST /v1/tax/calculations/{id}/adjust
#[utoipa::path(
    post,
    path = "/v1/tax/calculations/{id}/adjust",
    params(("id" = String, Path, description = "Calculation id")),
    request_body = AdjustRequest,
    responses(
        (status = 201, description = "Prior calculation adjusted and replacement recorded", body = AdjustResponse),
        (status = 409, description = "Illegal transition or stale version", body = crate::error::ErrorBody),
        (status = 422, description = "Replacement failed to calculate", body = crate::error::ErrorBody),
    ),
    tag = "calculations"
)]
pub(crate) async fn adjust_calculation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AdjustRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AdjustResponse>), AppError> {
    require_role(&caller, Role::Operator)?;
    let req = extract_validated_json(body)?;
    let id = CalculationId::from_uuid(id);
    let prior = state
        .ledger
        .get(&caller.company_id, &id)
        .ok_or_else(|| AppError::NotFound(format!("calculation {id} not found")))?;

    let input = req.item.unwrap_or(prior.input);
    let result = calculate_for(&state, &caller, input.clone()).await?;
    let adjustment = state.ledger.adjust(
        &caller.company_id,
        &id,
        req.expected_version,
        input,
        result,
        &evidence(&caller, req.reason.trim()),
    )?;
    state
        .persist_ledger(&[&adjustment.superseded, &adjustment.replacement])
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AdjustResponse {
            superseded: adjustment.superseded.record,
            replacement: adjustment.replacement.record,
        }),
    ))
}
