//! Calculation ledger persistence.
//!
//! Each [`LedgerWrite`] is stored in one transaction: the record row is
//! upserted and its events appended. The version guard on the upsert keeps
//! an older write from overwriting a newer one.

use std::collections::BTreeMap;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use vtax_ledger::{LedgerEvent, LedgerWrite, TaxCalculation};

fn encode_err(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Encode(Box::new(e))
}

fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

async fn upsert_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &TaxCalculation,
) -> Result<(), sqlx::Error> {
    let json = serde_json::to_value(record).map_err(encode_err)?;
    let version = i64::try_from(record.version).map_err(encode_err)?;
    sqlx::query(
        "INSERT INTO tax_calculations (id, company_id, calculable_kind, calculable_id,
         calculation_type, status, total_tax, digest, version, record, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            record = EXCLUDED.record,
            updated_at = EXCLUDED.updated_at
         WHERE tax_calculations.version < EXCLUDED.version",
    )
    .bind(*record.id.as_uuid())
    .bind(*record.company_id.as_uuid())
    .bind(record.calculable.kind.as_str())
    .bind(record.calculable.id)
    .bind(record.calculation_type.as_str())
    .bind(record.status.as_str())
    .bind(record.result.total_tax)
    .bind(&record.result.digest)
    .bind(version)
    .bind(json)
    .bind(*record.created_at.as_datetime())
    .bind(*record.updated_at.as_datetime())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_events(
    tx: &mut Transaction<'_, Postgres>,
    events: &[LedgerEvent],
) -> Result<(), sqlx::Error> {
    for event in events {
        let payload = serde_json::to_value(event).map_err(encode_err)?;
        let version = i64::try_from(event.version).map_err(encode_err)?;
        sqlx::query(
            "INSERT INTO tax_calculation_events (calculation_id, version, company_id,
             event_type, actor_id, payload, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (calculation_id, version) DO NOTHING",
        )
        .bind(*event.calculation_id.as_uuid())
        .bind(version)
        .bind(*event.company_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(*event.actor.as_uuid())
        .bind(payload)
        .bind(*event.at.as_datetime())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Persist one or more ledger writes atomically.
pub async fn persist(pool: &PgPool, writes: &[&LedgerWrite]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for write in writes {
        upsert_record(&mut tx, &write.record).await?;
        insert_events(&mut tx, &write.events).await?;
    }
    tx.commit().await
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    record: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    calculation_id: Uuid,
    payload: serde_json::Value,
}

/// Load every calculation with its events, for startup hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<(TaxCalculation, Vec<LedgerEvent>)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RecordRow>(
        "SELECT record FROM tax_calculations ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    let event_rows = sqlx::query_as::<_, EventRow>(
        "SELECT calculation_id, payload FROM tax_calculation_events
         ORDER BY calculation_id, version",
    )
    .fetch_all(pool)
    .await?;

    let mut events: BTreeMap<Uuid, Vec<LedgerEvent>> = BTreeMap::new();
    for row in event_rows {
        let event: LedgerEvent = serde_json::from_value(row.payload).map_err(decode_err)?;
        events.entry(row.calculation_id).or_default().push(event);
    }

    rows.into_iter()
        .map(|row| {
            let record: TaxCalculation = serde_json::from_value(row.record).map_err(decode_err)?;
            let record_events = events.remove(record.id.as_uuid()).unwrap_or_default();
            Ok((record, record_events))
        })
        .collect()
}
