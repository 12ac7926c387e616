//! Category and profile selection for a service type.

use std::borrow::Cow;

use vtax_catalog::{TaxCatalog, TaxCategory, TaxProfile};
use vtax_core::ServiceType;

/// The active category covering `service_type` with the lowest priority
/// (ties broken by id), or `None` if no configured category covers it.
pub fn find_category<'a>(catalog: &'a TaxCatalog, service_type: &ServiceType) -> Option<&'a TaxCategory> {
    catalog
        .categories
        .iter()
        .filter(|c| c.is_active && c.covers(service_type))
        .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)))
}

/// Like [`find_category`], falling back to [`TaxCategory::system_default`].
pub fn resolve_category<'a>(catalog: &'a TaxCatalog, service_type: &ServiceType) -> Cow<'a, TaxCategory> {
    match find_category(catalog, service_type) {
        Some(c) => Cow::Borrowed(c),
        None => {
            tracing::debug!(service_type = %service_type, "no category covers service type, using default");
            Cow::Owned(TaxCategory::system_default())
        }
    }
}

/// The profile bound to `category`: a profile naming the category id wins,
/// then one naming its type, then [`TaxProfile::engine_default`].
pub fn resolve_profile<'a>(catalog: &'a TaxCatalog, category: &TaxCategory) -> Cow<'a, TaxProfile> {
    let active = || catalog.profiles.iter().filter(|p| p.is_active);
    let by_id = active()
        .filter(|p| p.category_id == Some(category.id))
        .min_by_key(|p| p.id);
    let by_type = || {
        active()
            .filter(|p| p.category_id.is_none() && p.category_type == Some(category.category_type))
            .min_by_key(|p| p.id)
    };
    match by_id.or_else(by_type) {
        Some(p) => Cow::Borrowed(p),
        None => Cow::Owned(TaxProfile::engine_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtax_catalog::{CalculationEngine, CategoryType};
    use vtax_core::CompanyId;

    fn st(s: &str) -> ServiceType {
        ServiceType::new(s).unwrap()
    }

    #[test]
    fn lowest_priority_covering_category_wins() {
        let mut cat = TaxCatalog::new(CompanyId::new());
        let broad = TaxCategory::new("All Telecom", CategoryType::General, 90);
        let voip = TaxCategory::new("VoIP", CategoryType::VoipFixed, 10)
            .with_service_types(vec![st("voip_fixed")]);
        let voip_id = voip.id;
        cat.categories = vec![broad, voip];

        assert_eq!(resolve_category(&cat, &st("voip_fixed")).id, voip_id);
        assert_eq!(resolve_category(&cat, &st("fax")).name, "All Telecom");
    }

    #[test]
    fn inactive_categories_are_ignored_and_default_is_used() {
        let mut cat = TaxCatalog::new(CompanyId::new());
        let mut voip = TaxCategory::new("VoIP", CategoryType::VoipFixed, 10)
            .with_service_types(vec![st("voip_fixed")]);
        voip.is_active = false;
        cat.categories = vec![voip];

        let resolved = resolve_category(&cat, &st("voip_fixed"));
        assert!(matches!(resolved, Cow::Owned(_)));
        assert!(resolved.is_system_default());
        assert!(!resolved.is_taxable);
        assert!(find_category(&cat, &st("voip_fixed")).is_none());
    }

    #[test]
    fn profile_by_id_beats_profile_by_type() {
        let mut cat = TaxCatalog::new(CompanyId::new());
        let voip = TaxCategory::new("VoIP", CategoryType::VoipFixed, 10);
        let mut by_type = TaxProfile::new("Type", CalculationEngine::General);
        by_type.category_type = Some(CategoryType::VoipFixed);
        let mut by_id = TaxProfile::new("Id", CalculationEngine::VoipTelecom);
        by_id.category_id = Some(voip.id);
        cat.profiles = vec![by_type, by_id];

        assert_eq!(resolve_profile(&cat, &voip).name, "Id");
        cat.profiles.retain(|p| p.name == "Type");
        assert_eq!(resolve_profile(&cat, &voip).name, "Type");
        cat.profiles.clear();
        assert_eq!(resolve_profile(&cat, &voip).engine, CalculationEngine::General);
    }
}
