//! # Application State
//!
//! Shared state for the HTTP service:
//!
//! - [`CatalogStore`]: one immutable [`TaxCatalog`] snapshot per tenant.
//!   Calculations clone the `Arc` and run against it without holding a
//!   lock; administrative edits build a new snapshot and swap it in.
//! - [`CalculationLedger`]: the calculation audit records.
//! - Optional Postgres pool for write-through persistence.
//! - Optional [`HttpEnrichment`] client.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sqlx::PgPool;
use vtax_catalog::TaxCatalog;
use vtax_core::{ActorId, CompanyId, Timestamp};
use vtax_ledger::{CalculationLedger, LedgerWrite};

use crate::config::AppConfig;
use crate::enrichment::HttpEnrichment;
use crate::error::AppError;

/// Per-tenant catalog snapshots.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    inner: Arc<RwLock<BTreeMap<CompanyId, Arc<TaxCatalog>>>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, company_id: &CompanyId) -> Option<Arc<TaxCatalog>> {
        self.inner.read().get(company_id).cloned()
    }

    /// Install `catalog` as its tenant's current snapshot.
    pub fn replace(&self, catalog: TaxCatalog) -> Arc<TaxCatalog> {
        let snapshot = Arc::new(catalog);
        self.inner
            .write()
            .insert(snapshot.company_id, Arc::clone(&snapshot));
        snapshot
    }

    /// Install `catalog` unless the tenant already has one.
    ///
    /// Returns the tenant's snapshot and whether it was inserted.
    pub fn insert_if_absent(&self, catalog: TaxCatalog) -> (Arc<TaxCatalog>, bool) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.get(&catalog.company_id) {
            return (Arc::clone(existing), false);
        }
        let snapshot = Arc::new(catalog);
        inner.insert(snapshot.company_id, Arc::clone(&snapshot));
        (snapshot, true)
    }

    /// Edit a copy of the tenant's catalog and swap it in if `f` succeeds.
    ///
    /// Runs under the write lock, so concurrent edits serialize. Readers
    /// holding the previous snapshot are unaffected.
    pub fn try_update<R, E>(
        &self,
        company_id: &CompanyId,
        f: impl FnOnce(&mut TaxCatalog) -> Result<R, E>,
    ) -> Option<Result<(R, Arc<TaxCatalog>), E>> {
        let mut inner = self.inner.write();
        let current = inner.get(company_id)?;
        let mut draft = TaxCatalog::clone(current);
        Some(f(&mut draft).map(|r| {
            let snapshot = Arc::new(draft);
            inner.insert(*company_id, Arc::clone(&snapshot));
            (r, snapshot)
        }))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Shared application state, cheaply cloneable.
#[derive(Debug, Clone)]
pub struct AppState {
    pub catalogs: CatalogStore,
    pub ledger: CalculationLedger,
    /// `None` in in-memory-only mode.
    pub db_pool: Option<PgPool>,
    /// `None` when no external provider is configured.
    pub enrichment: Option<HttpEnrichment>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None, None)
    }

    pub fn with_config(
        config: AppConfig,
        db_pool: Option<PgPool>,
        enrichment: Option<HttpEnrichment>,
    ) -> Self {
        Self {
            catalogs: CatalogStore::new(),
            ledger: CalculationLedger::new(),
            db_pool,
            enrichment,
            config,
        }
    }

    /// The tenant's current catalog snapshot.
    pub fn catalog(&self, company_id: &CompanyId) -> Result<Arc<TaxCatalog>, AppError> {
        self.catalogs.get(company_id).ok_or_else(|| {
            AppError::Configuration(format!("no tax catalog configured for company {company_id}"))
        })
    }

    /// Write ledger mutations through to Postgres, if configured.
    ///
    /// The in-memory ledger is already updated when this runs; a failure is
    /// surfaced so the caller knows the write will not survive a restart.
    /// The log names each record as `id@version` so memory and database can
    /// be reconciled.
    pub async fn persist_ledger(&self, writes: &[&LedgerWrite]) -> Result<(), AppError> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };
        if let Err(e) = crate::db::calculations::persist(pool, writes).await {
            let company_id = writes.first().map(|w| w.record.company_id.to_string());
            tracing::error!(
                company_id = ?company_id,
                unpersisted = ?unpersisted_versions(writes),
                error = %e,
                "failed to persist tax calculation"
            );
            return Err(AppError::Internal(
                "tax calculation recorded in-memory but database persist failed".to_string(),
            ));
        }
        Ok(())
    }

    /// Write a catalog snapshot through to Postgres, if configured.
    pub async fn persist_catalog(
        &self,
        catalog: &TaxCatalog,
        actor: ActorId,
        at: Timestamp,
    ) -> Result<(), AppError> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };
        if let Err(e) = crate::db::catalogs::upsert(pool, catalog, actor, at).await {
            tracing::error!(company_id = %catalog.company_id, error = %e, "failed to persist tax catalog");
            return Err(AppError::Internal(
                "tax catalog updated in-memory but database persist failed".to_string(),
            ));
        }
        Ok(())
    }

    /// Hydrate catalogs and the ledger from the database.
    ///
    /// Called once on startup when a pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        let catalogs = crate::db::catalogs::load_all(pool)
            .await
            .map_err(|e| format!("failed to load tax catalogs: {e}"))?;
        let catalog_count = catalogs.len();
        for catalog in catalogs {
            self.catalogs.replace(catalog);
        }

        let calculations = crate::db::calculations::load_all(pool)
            .await
            .map_err(|e| format!("failed to load tax calculations: {e}"))?;
        let calculation_count = calculations.len();
        for (record, events) in calculations {
            self.ledger.restore(record, events);
        }

        tracing::info!(
            catalogs = catalog_count,
            calculations = calculation_count,
            "Hydrated in-memory state from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// `id@version` for every record in `writes`.
fn unpersisted_versions(writes: &[&LedgerWrite]) -> Vec<String> {
    writes
        .iter()
        .map(|w| format!("{}@{}", w.record.id, w.record.version))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;
    use vtax_catalog::seed::default_catalog;
    use vtax_core::ServiceType;
    use vtax_engine::{CalculationItem, TaxCalculator};
    use vtax_ledger::{
        CalculableKind, CalculableRef, CalculationType, NewCalculation, TransitionEvidence,
    };

    fn catalog(company: CompanyId) -> TaxCatalog {
        default_catalog(
            company,
            ActorId::new(),
            Timestamp::parse("2026-01-01T00:00:00Z").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn snapshots_survive_replacement() {
        let store = CatalogStore::new();
        let company = CompanyId::new();
        let first = store.replace(catalog(company));
        let mut edited = catalog(company);
        edited.rates.clear();
        store.replace(edited);

        assert!(!first.rates.is_empty());
        assert!(store.get(&company).unwrap().rates.is_empty());
    }

    #[test]
    fn failed_update_keeps_snapshot() {
        let store = CatalogStore::new();
        let company = CompanyId::new();
        let before = store.replace(catalog(company));

        let outcome = store.try_update(&company, |c| {
            c.rates.clear();
            Err::<(), _>("rejected")
        });
        assert_eq!(outcome.unwrap().unwrap_err(), "rejected");
        assert!(Arc::ptr_eq(&before, &store.get(&company).unwrap()));
    }

    #[test]
    fn update_of_unknown_tenant_is_none() {
        let store = CatalogStore::new();
        assert!(store
            .try_update(&CompanyId::new(), |_| Ok::<_, ()>(()))
            .is_none());
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let store = CatalogStore::new();
        let company = CompanyId::new();
        let (_, inserted) = store.insert_if_absent(catalog(company));
        assert!(inserted);
        let mut other = catalog(company);
        other.rates.clear();
        let (current, inserted) = store.insert_if_absent(other);
        assert!(!inserted);
        assert!(!current.rates.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_catalog_is_configuration_error() {
        let state = AppState::new();
        let err = state.catalog(&CompanyId::new()).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn unpersisted_writes_are_named_with_their_version() {
        let company = CompanyId::new();
        let catalog = catalog(company);
        let item = CalculationItem::new(
            ServiceType::new("voip_fixed").unwrap(),
            dec!(100),
            Timestamp::parse("2026-03-15T12:00:00Z").unwrap(),
        );
        let result = TaxCalculator::new(&catalog).calculate(item.clone()).unwrap();
        let ledger = CalculationLedger::new();
        let actor = ActorId::new();
        let created = ledger.create(
            NewCalculation {
                company_id: company,
                calculable: CalculableRef::new(CalculableKind::Invoice, Uuid::new_v4()),
                calculation_type: CalculationType::Invoice,
                input: item,
                result,
            },
            &TransitionEvidence::new(actor, "calculated"),
        );
        let id = created.record.id;
        let applied = ledger
            .apply(&company, &id, None, &TransitionEvidence::new(actor, "finalized"))
            .unwrap();

        assert_eq!(
            unpersisted_versions(&[&created, &applied]),
            vec![
                format!("{id}@{}", created.record.version),
                format!("{id}@{}", applied.record.version),
            ]
        );
        assert!(applied.record.version > created.record.version);
    }
}
