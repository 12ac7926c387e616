//! Tenant catalog persistence. One JSONB document per company.

use sqlx::PgPool;
use vtax_catalog::TaxCatalog;
use vtax_core::{ActorId, Timestamp};

#[derive(sqlx::FromRow)]
struct CatalogRow {
    catalog: serde_json::Value,
}

/// Replace the stored catalog for `catalog.company_id`.
pub async fn upsert(
    pool: &PgPool,
    catalog: &TaxCatalog,
    actor: ActorId,
    at: Timestamp,
) -> Result<(), sqlx::Error> {
    let json = serde_json::to_value(catalog).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query(
        "INSERT INTO tax_catalogs (company_id, catalog, updated_by, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (company_id) DO UPDATE SET
            catalog = EXCLUDED.catalog,
            updated_by = EXCLUDED.updated_by,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(*catalog.company_id.as_uuid())
    .bind(json)
    .bind(*actor.as_uuid())
    .bind(*at.as_datetime())
    .execute(pool)
    .await?;
    Ok(())
}

/// Load every tenant catalog, for startup hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<TaxCatalog>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CatalogRow>("SELECT catalog FROM tax_catalogs")
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| serde_json::from_value(row.catalog).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .collect()
}
