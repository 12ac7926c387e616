//! # OpenAPI Document Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI 3.1 document,
//! served at `/openapi.json`. Engine, catalog and ledger types are
//! documented as opaque objects; their JSON shape is the serde shape of the
//! corresponding Rust type.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "VoIP Tax Engine API",
        version = "0.1.0",
        description = "Jurisdiction resolution, VoIP tax calculation, calculation ledger and tenant catalog administration.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Resolution
        crate::routes::jurisdictions::resolve_jurisdictions,
        crate::routes::jurisdictions::resolve_service_category,
        // Calculations
        crate::routes::calculations::calculate_preview,
        crate::routes::calculations::persist_calculation,
        crate::routes::calculations::list_calculations,
        crate::routes::calculations::get_calculation,
        crate::routes::calculations::calculation_history,
        crate::routes::calculations::validate_calculation,
        crate::routes::calculations::apply_calculation,
        crate::routes::calculations::void_calculation,
        crate::routes::calculations::adjust_calculation,
        // Catalog
        crate::routes::catalog::get_catalog,
        crate::routes::catalog::replace_catalog,
        crate::routes::catalog::seed_catalog,
        crate::routes::catalog::update_rate,
        crate::routes::catalog::rate_history,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::auth::Role,
        crate::routes::jurisdictions::ResolvedJurisdiction,
        crate::routes::jurisdictions::ResolveJurisdictionsResponse,
        crate::routes::jurisdictions::ResolveCategoryResponse,
        crate::routes::calculations::PersistCalculationRequest,
        crate::routes::calculations::ValidateRequest,
        crate::routes::calculations::ApplyRequest,
        crate::routes::calculations::VoidRequest,
        crate::routes::calculations::AdjustRequest,
        crate::routes::calculations::HistoryResponse,
        crate::routes::calculations::AdjustResponse,
        crate::routes::catalog::CatalogUpdateResponse,
        crate::routes::catalog::SeedRequest,
    )),
    tags(
        (name = "resolution", description = "Jurisdiction and category resolution"),
        (name = "calculations", description = "Tax calculation and the calculation ledger"),
        (name = "catalog", description = "Tenant tax catalog administration"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
