//! # Database Persistence Layer
//!
//! Optional Postgres persistence via SQLx. When `DATABASE_URL` is set the
//! API writes every ledger mutation and catalog replacement through to
//! Postgres and hydrates its in-memory state from it on startup. When
//! absent, the API runs in-memory only.
//!
//! ## Tables
//!
//! - `tax_calculations`: one row per calculation, the full record as JSONB
//! - `tax_calculation_events`: append-only ledger events, keyed by
//!   `(calculation_id, version)`
//! - `tax_catalogs`: one catalog document per tenant

pub mod calculations;
pub mod catalogs;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only. \
             Calculations will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
