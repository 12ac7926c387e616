//! # vtax-api: HTTP Service for the VoIP Tax Engine
//!
//! Axum service exposing jurisdiction and category resolution, calculation
//! preview, the calculation ledger lifecycle and tenant catalog
//! administration.
//!
//! ## Layers
//!
//! ```text
//! TraceLayer -> auth (CallerIdentity: role, company, actor) -> routes
//! ```
//!
//! Every route is tenant-scoped: the company comes from the caller's
//! identity, never from the request body or path. Health probes sit
//! outside authentication.
//!
//! ## Persistence
//!
//! In-memory by default. With `DATABASE_URL` set, ledger mutations and
//! catalog edits are written through to Postgres and reloaded on startup.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
        default_company: state.config.default_company,
    };

    let api = Router::new()
        .merge(routes::jurisdictions::router())
        .merge(routes::calculations::router())
        .merge(routes::catalog::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    // Unauthenticated health probes.
    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness() -> &'static str {
    "ready"
}
