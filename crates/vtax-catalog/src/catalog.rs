//! # Tax Catalog
//!
//! [`TaxCatalog`] is one tenant's complete tax configuration: jurisdictions,
//! categories, profiles, rates, exemptions and the rate change history.
//!
//! Calculations read an immutable snapshot of the catalog. Administrative
//! edits produce a new snapshot (the API layer swaps it in atomically), so a
//! calculation never observes a half-applied edit.

use serde::{Deserialize, Serialize};
use vtax_core::{
    ActorId, CategoryId, CompanyId, JurisdictionId, ProfileId, RateId, ServiceType, Timestamp,
};

use crate::category::TaxCategory;
use crate::error::{CatalogError, CatalogResult};
use crate::exemption::TaxExemption;
use crate::history::{diff_fields, RateChange, RateChangeAction};
use crate::jurisdiction::Jurisdiction;
use crate::profile::TaxProfile;
use crate::rate::{validate_tiers, RateModel, RatePatch, VoipTaxRate};

/// One tenant's tax configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCatalog {
    /// Owning tenant.
    pub company_id: CompanyId,
    /// Taxing jurisdictions, including soft-deleted ones.
    #[serde(default)]
    pub jurisdictions: Vec<Jurisdiction>,
    /// Service classifications.
    #[serde(default)]
    pub categories: Vec<TaxCategory>,
    /// Engine bindings and input declarations.
    #[serde(default)]
    pub profiles: Vec<TaxProfile>,
    /// Tax rules.
    #[serde(default)]
    pub rates: Vec<VoipTaxRate>,
    /// Client exemptions.
    #[serde(default)]
    pub exemptions: Vec<TaxExemption>,
    /// Append-only rate edit log.
    #[serde(default)]
    pub rate_history: Vec<RateChange>,
}

impl TaxCatalog {
    /// An empty catalog for `company_id`.
    pub fn new(company_id: CompanyId) -> Self {
        Self {
            company_id,
            jurisdictions: Vec::new(),
            categories: Vec::new(),
            profiles: Vec::new(),
            rates: Vec::new(),
            exemptions: Vec::new(),
            rate_history: Vec::new(),
        }
    }

    /// Look up a jurisdiction, including soft-deleted ones.
    pub fn jurisdiction(&self, id: &JurisdictionId) -> Option<&Jurisdiction> {
        self.jurisdictions.iter().find(|j| j.id == *id)
    }

    /// Look up a category.
    pub fn category(&self, id: &CategoryId) -> Option<&TaxCategory> {
        self.categories.iter().find(|c| c.id == *id)
    }

    /// Look up a profile.
    pub fn profile(&self, id: &ProfileId) -> Option<&TaxProfile> {
        self.profiles.iter().find(|p| p.id == *id)
    }

    /// Look up a rate.
    pub fn rate(&self, id: &RateId) -> Option<&VoipTaxRate> {
        self.rates.iter().find(|r| r.id == *id)
    }

    /// Jurisdictions that are active and not soft-deleted.
    pub fn effective_jurisdictions(&self) -> impl Iterator<Item = &Jurisdiction> {
        self.jurisdictions.iter().filter(|j| j.is_effective())
    }

    /// Parent chain of `id`, nearest first. Stops at a missing parent or a
    /// repeated node, so a malformed tree cannot loop.
    pub fn ancestors(&self, id: &JurisdictionId) -> Vec<&Jurisdiction> {
        let mut chain: Vec<&Jurisdiction> = Vec::new();
        let mut current = self.jurisdiction(id).and_then(|j| j.parent_id);
        while let Some(parent_id) = current {
            if parent_id == *id || chain.iter().any(|j| j.id == parent_id) {
                break;
            }
            match self.jurisdiction(&parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent.parent_id;
                }
                None => break,
            }
        }
        chain
    }

    /// Rates evaluated for a jurisdiction × category on a service type at
    /// `at`, ordered by priority then id.
    pub fn rates_for(
        &self,
        jurisdiction_id: &JurisdictionId,
        category_id: &CategoryId,
        service_type: &ServiceType,
        at: Timestamp,
    ) -> Vec<&VoipTaxRate> {
        let mut rates: Vec<&VoipTaxRate> = self
            .rates
            .iter()
            .filter(|r| {
                r.jurisdiction_id == *jurisdiction_id
                    && r.category_id == *category_id
                    && r.is_active_at(at)
                    && r.applies_to_service(service_type)
            })
            .collect();
        rates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
        rates
    }

    /// History of a rate, oldest first.
    pub fn rate_history(&self, id: &RateId) -> Vec<&RateChange> {
        self.rate_history.iter().filter(|c| c.rate_id == *id).collect()
    }

    /// Add a rate and record its creation.
    pub fn add_rate(&mut self, rate: VoipTaxRate, actor_id: ActorId, at: Timestamp) -> CatalogResult<()> {
        check_rate_shape(&rate)?;
        let after = serde_json::to_value(&rate)?;
        self.rate_history.push(RateChange {
            rate_id: rate.id,
            version: rate.version,
            action: RateChangeAction::Created,
            changes: diff_fields(&serde_json::Value::Null, &after),
            actor_id,
            changed_at: at,
        });
        self.rates.push(rate);
        Ok(())
    }

    /// Apply an administrative edit to a rate.
    ///
    /// Bumps the version and appends a [`RateChange`]. A patch that changes
    /// nothing is accepted without a history entry. The edit is rejected
    /// whole if the result would be malformed.
    pub fn update_rate(
        &mut self,
        id: &RateId,
        patch: &RatePatch,
        actor_id: ActorId,
        at: Timestamp,
    ) -> CatalogResult<&VoipTaxRate> {
        let idx = self
            .rates
            .iter()
            .position(|r| r.id == *id)
            .ok_or(CatalogError::UnknownRate(*id))?;

        let current = &self.rates[idx];
        let mut next = patch.apply_to(current);
        check_rate_shape(&next)?;

        let before = serde_json::to_value(current)?;
        let after = serde_json::to_value(&next)?;
        let changes = diff_fields(&before, &after);
        if changes.is_empty() {
            return Ok(&self.rates[idx]);
        }

        next.version = current.version + 1;
        let action = if current.is_active && !next.is_active {
            RateChangeAction::Deactivated
        } else {
            RateChangeAction::Updated
        };
        tracing::info!(
            rate_id = %id,
            version = next.version,
            fields = changes.len(),
            action = action.as_str(),
            "rate updated"
        );
        self.rate_history.push(RateChange {
            rate_id: *id,
            version: next.version,
            action,
            changes,
            actor_id,
            changed_at: at,
        });
        self.rates[idx] = next;
        Ok(&self.rates[idx])
    }

    /// Soft-delete a jurisdiction.
    pub fn soft_delete_jurisdiction(&mut self, id: &JurisdictionId, at: Timestamp) -> CatalogResult<()> {
        let j = self
            .jurisdictions
            .iter_mut()
            .find(|j| j.id == *id)
            .ok_or(CatalogError::UnknownJurisdiction(*id))?;
        j.soft_delete(at);
        Ok(())
    }
}

/// Reject rate parameter combinations that can never evaluate.
fn check_rate_shape(rate: &VoipTaxRate) -> CatalogResult<()> {
    let reject = |reason: String| CatalogError::InvalidRateUpdate {
        rate_id: rate.id,
        reason,
    };
    match &rate.model {
        RateModel::Percentage { percentage_rate } if percentage_rate.is_sign_negative() => {
            return Err(reject("percentage_rate must not be negative".into()));
        }
        RateModel::Fixed { fixed_amount }
        | RateModel::PerLine { fixed_amount }
        | RateModel::PerMinute { fixed_amount }
            if fixed_amount.is_sign_negative() =>
        {
            return Err(reject("fixed_amount must not be negative".into()));
        }
        RateModel::Tiered { conditions } => {
            validate_tiers(&conditions.tiers).map_err(|e| reject(e.to_string()))?;
        }
        _ => {}
    }
    if let Some(expiry) = rate.expiry_date {
        if expiry < rate.effective_date {
            return Err(reject("expiry_date precedes effective_date".into()));
        }
    }
    Ok(())
}
