//! # Catalog Administration API
//!
//! - **GET `/v1/tax/catalog`**: the caller's current catalog snapshot
//! - **PUT `/v1/tax/catalog`**: replace it (validated before install)
//! - **POST `/v1/tax/catalog/seed`**: install the default catalog for a
//!   tenant that has none
//! - **PATCH `/v1/tax/rates/{id}`**: edit one rate, recording the change
//! - **GET `/v1/tax/rates/{id}/history`**: a rate's change history
//!
//! Writes require the `admin` role. Calculations already in flight keep
//! the snapshot they started with.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vtax_catalog::loader::check;
use vtax_catalog::seed::default_catalog;
use vtax_catalog::{CatalogValidation, LoadMode, RateChange, RatePatch, TaxCatalog, VoipTaxRate};
use vtax_core::{RateId, Timestamp};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CatalogUpdateResponse {
    #[schema(value_type = Object)]
    pub validation: CatalogValidation,
    pub jurisdictions: usize,
    pub categories: usize,
    pub profiles: usize,
    pub rates: usize,
}

impl CatalogUpdateResponse {
    fn new(catalog: &TaxCatalog, validation: CatalogValidation) -> Self {
        Self {
            validation,
            jurisdictions: catalog.jurisdictions.len(),
            categories: catalog.categories.len(),
            profiles: catalog.profiles.len(),
            rates: catalog.rates.len(),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SeedRequest {
    /// When the seeded federal rates take effect. Defaults to now.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub effective_date: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tax/catalog", get(get_catalog).put(replace_catalog))
        .route("/v1/tax/catalog/seed", post(seed_catalog))
        .route("/v1/tax/rates/{id}", patch(update_rate))
        .route("/v1/tax/rates/{id}/history", get(rate_history))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /v1/tax/catalog
#[utoipa::path(
    get,
    path = "/v1/tax/catalog",
    responses(
        (status = 200, description = "Current catalog snapshot"),
        (status = 422, description = "No catalog configured", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub(crate) async fn get_catalog(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<TaxCatalog>, AppError> {
    require_role(&caller, Role::Operator)?;
    let catalog = state.catalog(&caller.company_id)?;
    Ok(Json(TaxCatalog::clone(&catalog)))
}

/// PUT /v1/tax/catalog
#[utoipa::path(
    put,
    path = "/v1/tax/catalog",
    request_body(content = Object, description = "Complete tenant catalog"),
    responses(
        (status = 200, description = "Catalog installed", body = CatalogUpdateResponse),
        (status = 403, description = "Admin role required or foreign company", body = crate::error::ErrorBody),
        (status = 422, description = "Catalog failed validation", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub(crate) async fn replace_catalog(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<TaxCatalog>, JsonRejection>,
) -> Result<Json<CatalogUpdateResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let catalog = extract_json(body)?;
    if catalog.company_id != caller.company_id {
        return Err(AppError::Forbidden(
            "catalog company_id does not match the caller's company".into(),
        ));
    }

    let loaded = check(catalog, LoadMode::Strict)?;
    let snapshot = state.catalogs.replace(loaded.catalog);
    tracing::info!(
        company_id = %caller.company_id,
        actor_id = %caller.actor_id,
        rates = snapshot.rates.len(),
        "tax catalog replaced"
    );
    state
        .persist_catalog(&snapshot, caller.actor_id, Timestamp::now())
        .await?;
    Ok(Json(CatalogUpdateResponse::new(&snapshot, loaded.validation)))
}

/// POST /v1/tax/catalog/seed
#[utoipa::path(
    post,
    path = "/v1/tax/catalog/seed",
    request_body = SeedRequest,
    responses(
        (status = 201, description = "Default catalog installed", body = CatalogUpdateResponse),
        (status = 409, description = "Company already has a catalog", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub(crate) async fn seed_catalog(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SeedRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CatalogUpdateResponse>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = match body {
        Err(JsonRejection::MissingJsonContentType(_)) => SeedRequest::default(),
        other => extract_json(other)?,
    };
    let now = Timestamp::now();
    let catalog = default_catalog(
        caller.company_id,
        caller.actor_id,
        req.effective_date.unwrap_or(now),
    )?;
    let loaded = check(catalog, LoadMode::Strict)?;

    let (snapshot, inserted) = state.catalogs.insert_if_absent(loaded.catalog);
    if !inserted {
        return Err(AppError::Conflict(format!(
            "company {} already has a tax catalog",
            caller.company_id
        )));
    }
    tracing::info!(company_id = %caller.company_id, "default tax catalog seeded");
    state.persist_catalog(&snapshot, caller.actor_id, now).await?;
    Ok((
        StatusCode::CREATED,
        Json(CatalogUpdateResponse::new(&snapshot, loaded.validation)),
    ))
}

/// PATCH /v1/tax/rates/{id}
#[utoipa::path(
    patch,
    path = "/v1/tax/rates/{id}",
    params(("id" = String, Path, description = "Rate id")),
    request_body(content = Object, description = "Fields to change"),
    responses(
        (status = 200, description = "Rate after the edit"),
        (status = 404, description = "No such rate", body = crate::error::ErrorBody),
        (status = 422, description = "Edit would leave the rate malformed", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub(crate) async fn update_rate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RatePatch>, JsonRejection>,
) -> Result<Json<VoipTaxRate>, AppError> {
    require_role(&caller, Role::Admin)?;
    let patch = extract_json(body)?;
    let rate_id = RateId::from_uuid(id);
    let now = Timestamp::now();

    let (rate, snapshot) = state
        .catalogs
        .try_update(&caller.company_id, |catalog| {
            catalog
                .update_rate(&rate_id, &patch, caller.actor_id, now)
                .cloned()
        })
        .ok_or_else(|| {
            AppError::Configuration(format!(
                "no tax catalog configured for company {}",
                caller.company_id
            ))
        })??;
    state.persist_catalog(&snapshot, caller.actor_id, now).await?;
    Ok(Json(rate))
}

/// GET /v1/tax/rates/{id}/history
#[utoipa::path(
    get,
    path = "/v1/tax/rates/{id}/history",
    params(("id" = String, Path, description = "Rate id")),
    responses(
        (status = 200, description = "Rate changes, oldest first"),
        (status = 404, description = "No such rate", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub(crate) async fn rate_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RateChange>>, AppError> {
    require_role(&caller, Role::Operator)?;
    let rate_id = RateId::from_uuid(id);
    let catalog = state.catalog(&caller.company_id)?;
    if catalog.rate(&rate_id).is_none() {
        return Err(AppError::NotFound(format!("rate {rate_id} not found")));
    }
    Ok(Json(
        catalog.rate_history(&rate_id).into_iter().cloned().collect(),
    ))
}
