//! # Service Bootstrap
//!
//! Builds [`AppState`] from configuration at startup:
//!
//! 1. **Enrichment client**: built when `TAX_API_URL` is set.
//! 2. **Catalog file**: loaded and validated when `TAX_CATALOG_PATH` is set.
//! 3. **Banner**: one structured log line describing the running mode.
//!
//! Database hydration runs after bootstrap, so catalogs edited through the
//! API and persisted in Postgres take precedence over the file.

use sqlx::PgPool;
use vtax_catalog::CatalogError;

use crate::config::AppConfig;
use crate::enrichment::{ClientInitError, HttpEnrichment};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to load tax catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to configure tax enrichment client: {0}")]
    Enrichment(#[from] ClientInitError),
}

pub fn bootstrap(config: AppConfig, db_pool: Option<PgPool>) -> Result<AppState, BootstrapError> {
    let enrichment = config
        .enrichment
        .as_ref()
        .map(HttpEnrichment::new)
        .transpose()?;

    let state = AppState::with_config(config, db_pool, enrichment);

    if let Some(path) = state.config.catalog_path.clone() {
        let loaded = vtax_catalog::load_catalog(&path, state.config.catalog_mode)?;
        tracing::info!(
            path = %path.display(),
            company_id = %loaded.catalog.company_id,
            jurisdictions = loaded.catalog.jurisdictions.len(),
            rates = loaded.catalog.rates.len(),
            warnings = loaded.validation.warnings.len(),
            "tax catalog loaded from file"
        );
        state.catalogs.replace(loaded.catalog);
    }

    log_banner(&state);
    Ok(state)
}

fn log_banner(state: &AppState) {
    tracing::info!(
        port = state.config.port,
        auth = if state.config.auth_token.is_some() { "bearer" } else { "disabled" },
        persistence = if state.db_pool.is_some() { "postgres" } else { "in-memory" },
        enrichment = state
            .config
            .enrichment
            .as_ref()
            .map_or("disabled".to_string(), |e| e.base_url.to_string()),
        catalogs = state.catalogs.len(),
        "VoIP tax service configured"
    );
}
