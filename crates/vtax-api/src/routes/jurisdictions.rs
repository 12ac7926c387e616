//! # Resolution API
//!
//! - **POST `/v1/tax/jurisdictions/resolve`**: which jurisdictions tax a
//!   service address, in evaluation order
//! - **GET `/v1/tax/categories/resolve?service_type=`**: which category and
//!   profile a service type falls under

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vtax_catalog::{JurisdictionType, TaxCategory, TaxProfile};
use vtax_core::{JurisdictionId, ServiceType};
use vtax_engine::{
    find_category, find_jurisdictions_for_address, resolve_category, resolve_profile, MatchKind,
    ServiceAddress,
};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolvedJurisdiction {
    #[schema(value_type = String, format = Uuid)]
    pub id: JurisdictionId,
    pub name: String,
    pub code: String,
    #[schema(value_type = String)]
    pub jurisdiction_type: JurisdictionType,
    pub priority: u32,
    /// Which address field matched.
    #[schema(value_type = String)]
    pub matched_by: MatchKind,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveJurisdictionsResponse {
    /// Ascending priority, ties by code.
    pub jurisdictions: Vec<ResolvedJurisdiction>,
    /// Nothing beyond federal matched; taxes will be federal only.
    pub ambiguous: bool,
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub service_type: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveCategoryResponse {
    #[schema(value_type = Object)]
    pub category: TaxCategory,
    #[schema(value_type = Object)]
    pub profile: TaxProfile,
    /// No tenant category covers the service type; the system default applies.
    pub is_fallback: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tax/jurisdictions/resolve", post(resolve_jurisdictions))
        .route("/v1/tax/categories/resolve", get(resolve_service_category))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/tax/jurisdictions/resolve
#[utoipa::path(
    post,
    path = "/v1/tax/jurisdictions/resolve",
    request_body(content = Object, description = "Service address"),
    responses(
        (status = 200, description = "Matching jurisdictions", body = ResolveJurisdictionsResponse),
        (status = 422, description = "No catalog for this company", body = crate::error::ErrorBody),
    ),
    tag = "resolution"
)]
pub(crate) async fn resolve_jurisdictions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ServiceAddress>, JsonRejection>,
) -> Result<Json<ResolveJurisdictionsResponse>, AppError> {
    require_role(&caller, Role::Operator)?;
    let address = extract_json(body)?;
    let catalog = state.catalog(&caller.company_id)?;

    let resolution = find_jurisdictions_for_address(&catalog, &address);
    let ambiguous = resolution.is_ambiguous();
    if ambiguous {
        tracing::warn!(
            company_id = %caller.company_id,
            "address matched no jurisdiction beyond federal"
        );
    }
    let jurisdictions = resolution
        .matches
        .iter()
        .map(|m| ResolvedJurisdiction {
            id: m.jurisdiction.id,
            name: m.jurisdiction.name.clone(),
            code: m.jurisdiction.code.clone(),
            jurisdiction_type: m.jurisdiction.jurisdiction_type,
            priority: m.jurisdiction.priority,
            matched_by: m.matched_by,
        })
        .collect();

    Ok(Json(ResolveJurisdictionsResponse {
        jurisdictions,
        ambiguous,
    }))
}

/// GET /v1/tax/categories/resolve?service_type=
#[utoipa::path(
    get,
    path = "/v1/tax/categories/resolve",
    params(("service_type" = String, Query, description = "Service type key, e.g. voip_fixed")),
    responses(
        (status = 200, description = "Resolved category and profile", body = ResolveCategoryResponse),
        (status = 422, description = "Invalid service type or no catalog", body = crate::error::ErrorBody),
    ),
    tag = "resolution"
)]
pub(crate) async fn resolve_service_category(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<ResolveCategoryResponse>, AppError> {
    require_role(&caller, Role::Operator)?;
    let service_type = ServiceType::new(query.service_type)?;
    let catalog = state.catalog(&caller.company_id)?;

    let is_fallback = find_category(&catalog, &service_type).is_none();
    let category = resolve_category(&catalog, &service_type).into_owned();
    let profile = resolve_profile(&catalog, &category).into_owned();

    Ok(Json(ResolveCategoryResponse {
        category,
        profile,
        is_fallback,
    }))
}
