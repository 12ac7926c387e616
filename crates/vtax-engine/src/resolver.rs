//! # Jurisdiction Resolution
//!
//! Maps a [`ServiceAddress`] to the set of effective jurisdictions that tax
//! it. Each candidate is tested against the address with the matchers below,
//! in precedence order; the first matcher that succeeds is recorded as the
//! [`MatchKind`]:
//!
//! 1. zip code (five-digit prefix of ZIP+4)
//! 2. state code, for state jurisdictions
//! 3. FIPS prefix (the jurisdiction's FIPS code prefixes the address's)
//! 4. boundary polygon containing the coordinates
//! 5. city or municipality name, for local jurisdictions
//!
//! Federal jurisdictions match every address. The result is deduplicated by
//! id and ordered by priority, then code, then id, so the same catalog and
//! address always yield the same list.
//!
//! An address that matches nothing beyond federal is flagged
//! [`JurisdictionResolution::is_ambiguous`]; the calculator turns that into
//! a warning rather than an error.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vtax_catalog::{Jurisdiction, JurisdictionType, TaxCatalog};

use crate::address::ServiceAddress;
use crate::geo::point_in_polygon;

/// Which matcher selected a jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Federal jurisdictions always apply.
    Federal,
    /// Listed zip code.
    ZipCode,
    /// State code of a state jurisdiction.
    StateCode,
    /// FIPS code prefix.
    FipsPrefix,
    /// Boundary polygon contains the coordinates.
    Polygon,
    /// City or municipality name.
    PlaceName,
}

impl MatchKind {
    /// Return the string representation of this match kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Federal => "federal",
            Self::ZipCode => "zip_code",
            Self::StateCode => "state_code",
            Self::FipsPrefix => "fips_prefix",
            Self::Polygon => "polygon",
            Self::PlaceName => "place_name",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One jurisdiction selected for an address.
#[derive(Debug, Clone, Copy)]
pub struct JurisdictionMatch<'a> {
    /// The jurisdiction.
    pub jurisdiction: &'a Jurisdiction,
    /// How it was selected.
    pub matched_by: MatchKind,
}

/// Ordered jurisdictions for an address.
#[derive(Debug, Clone, Default)]
pub struct JurisdictionResolution<'a> {
    /// Matches, ordered by priority, code, id.
    pub matches: Vec<JurisdictionMatch<'a>>,
}

impl<'a> JurisdictionResolution<'a> {
    /// Whether nothing beyond federal matched.
    pub fn is_ambiguous(&self) -> bool {
        self.matches
            .iter()
            .all(|m| m.matched_by == MatchKind::Federal)
    }

    /// Keep federal matches only.
    pub fn federal_only(mut self) -> Self {
        self.matches.retain(|m| m.matched_by == MatchKind::Federal);
        self
    }

    /// Iterate the matched jurisdictions.
    pub fn jurisdictions(&self) -> impl Iterator<Item = &'a Jurisdiction> + '_ {
        self.matches.iter().map(|m| m.jurisdiction)
    }
}

/// Test one jurisdiction against an address, in precedence order.
fn match_kind(j: &Jurisdiction, address: &ServiceAddress) -> Option<MatchKind> {
    if j.jurisdiction_type == JurisdictionType::Federal {
        return Some(MatchKind::Federal);
    }
    if address.zip().is_some_and(|zip| j.covers_zip(zip)) {
        return Some(MatchKind::ZipCode);
    }
    if j.jurisdiction_type == JurisdictionType::State {
        if let (Some(addr), Some(own)) = (address.state(), j.state_code.as_deref()) {
            if addr.eq_ignore_ascii_case(own.trim()) {
                return Some(MatchKind::StateCode);
            }
        }
    }
    if let (Some(addr), Some(own)) = (address.fips(), j.fips_code.as_deref()) {
        let own = own.trim();
        if !own.is_empty() && addr.starts_with(own) {
            return Some(MatchKind::FipsPrefix);
        }
    }
    if let (Some(point), Some(polygon)) = (address.point(), j.polygon()) {
        if point_in_polygon(&point, polygon) {
            return Some(MatchKind::Polygon);
        }
    }
    if j.jurisdiction_type.is_local()
        && address
            .place_names()
            .any(|name| name.eq_ignore_ascii_case(j.name.trim()))
    {
        return Some(MatchKind::PlaceName);
    }
    None
}

/// Find every effective jurisdiction that taxes `address`.
///
/// An address with no usable fields resolves to the federal jurisdictions
/// only.
pub fn find_jurisdictions_for_address<'a>(
    catalog: &'a TaxCatalog,
    address: &ServiceAddress,
) -> JurisdictionResolution<'a> {
    let usable = address.has_usable_fields();
    let mut seen = BTreeSet::new();
    let mut matches: Vec<JurisdictionMatch<'a>> = catalog
        .effective_jurisdictions()
        .filter_map(|j| {
            let kind = if usable {
                match_kind(j, address)?
            } else if j.jurisdiction_type == JurisdictionType::Federal {
                MatchKind::Federal
            } else {
                return None;
            };
            seen.insert(j.id).then_some(JurisdictionMatch {
                jurisdiction: j,
                matched_by: kind,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        let (a, b) = (a.jurisdiction, b.jurisdiction);
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.code.cmp(&b.code))
            .then_with(|| a.id.cmp(&b.id))
    });

    tracing::debug!(
        matched = matches.len(),
        usable_address = usable,
        "jurisdictions resolved"
    );
    JurisdictionResolution { matches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vtax_catalog::GeoPoint;
    use vtax_core::{CompanyId, Timestamp};

    fn catalog() -> TaxCatalog {
        let mut cat = TaxCatalog::new(CompanyId::new());
        let fed = Jurisdiction::new(JurisdictionType::Federal, "United States", "US", 1);
        let tx = Jurisdiction::new(JurisdictionType::State, "Texas", "TX", 10)
            .with_state_code("TX")
            .with_fips_code("48")
            .with_parent(fed.id);
        let travis = Jurisdiction::new(JurisdictionType::County, "Travis County", "TX-TRAVIS", 20)
            .with_state_code("TX")
            .with_fips_code("48453")
            .with_parent(tx.id);
        let austin = Jurisdiction::new(JurisdictionType::City, "Austin", "TX-AUS", 30)
            .with_state_code("TX")
            .with_zip_codes(["78701", "78702"])
            .with_parent(travis.id);
        let district = Jurisdiction::new(
            JurisdictionType::SpecialDistrict,
            "Downtown 911 District",
            "TX-AUS-911",
            40,
        )
        .with_polygon(vec![
            GeoPoint::new(dec!(30.2590), dec!(-97.7550)),
            GeoPoint::new(dec!(30.2590), dec!(-97.7300)),
            GeoPoint::new(dec!(30.2780), dec!(-97.7300)),
            GeoPoint::new(dec!(30.2780), dec!(-97.7550)),
        ]);
        let ca = Jurisdiction::new(JurisdictionType::State, "California", "CA", 10)
            .with_state_code("CA")
            .with_parent(fed.id);
        cat.jurisdictions = vec![district, austin, travis, ca, tx, fed];
        cat
    }

    fn codes(res: &JurisdictionResolution<'_>) -> Vec<String> {
        res.jurisdictions().map(|j| j.code.clone()).collect()
    }

    #[test]
    fn full_address_matches_every_level_in_priority_order() {
        let cat = catalog();
        let addr = ServiceAddress {
            city: Some("Austin".into()),
            state_code: Some("TX".into()),
            zip_code: Some("78701-1234".into()),
            fips_code: Some("4845305000".into()),
            latitude: Some(dec!(30.2672)),
            longitude: Some(dec!(-97.7431)),
            ..ServiceAddress::default()
        };
        let res = find_jurisdictions_for_address(&cat, &addr);
        assert_eq!(codes(&res), vec!["US", "TX", "TX-TRAVIS", "TX-AUS", "TX-AUS-911"]);
        let kinds: Vec<_> = res.matches.iter().map(|m| m.matched_by).collect();
        assert_eq!(
            kinds,
            vec![
                MatchKind::Federal,
                MatchKind::StateCode,
                MatchKind::FipsPrefix,
                MatchKind::ZipCode,
                MatchKind::Polygon,
            ]
        );
        assert!(!res.is_ambiguous());
    }

    #[test]
    fn state_code_does_not_pull_in_counties_or_cities() {
        let cat = catalog();
        let addr = ServiceAddress {
            state_code: Some("tx".into()),
            ..ServiceAddress::default()
        };
        assert_eq!(
            codes(&find_jurisdictions_for_address(&cat, &addr)),
            vec!["US", "TX"]
        );
    }

    #[test]
    fn city_name_matches_local_jurisdictions_only() {
        let cat = catalog();
        let addr = ServiceAddress {
            city: Some("austin".into()),
            ..ServiceAddress::default()
        };
        let res = find_jurisdictions_for_address(&cat, &addr);
        assert_eq!(codes(&res), vec!["US", "TX-AUS"]);
        assert_eq!(res.matches[1].matched_by, MatchKind::PlaceName);
    }

    #[test]
    fn empty_address_resolves_to_federal_only() {
        let cat = catalog();
        let res = find_jurisdictions_for_address(&cat, &ServiceAddress::default());
        assert_eq!(codes(&res), vec!["US"]);
        assert!(res.is_ambiguous());
    }

    #[test]
    fn unmatched_address_is_ambiguous() {
        let cat = catalog();
        let addr = ServiceAddress {
            zip_code: Some("10001".into()),
            state_code: Some("NY".into()),
            ..ServiceAddress::default()
        };
        assert!(find_jurisdictions_for_address(&cat, &addr).is_ambiguous());
    }

    #[test]
    fn soft_deleted_and_inactive_jurisdictions_are_skipped() {
        let mut cat = catalog();
        let tx = cat.jurisdictions.iter().position(|j| j.code == "TX").unwrap();
        cat.jurisdictions[tx].soft_delete(Timestamp::now());
        let aus = cat.jurisdictions.iter().position(|j| j.code == "TX-AUS").unwrap();
        cat.jurisdictions[aus].is_active = false;
        let addr = ServiceAddress {
            state_code: Some("TX".into()),
            zip_code: Some("78701".into()),
            ..ServiceAddress::default()
        };
        assert_eq!(codes(&find_jurisdictions_for_address(&cat, &addr)), vec!["US"]);
    }

    #[test]
    fn equal_priority_orders_by_code() {
        let mut cat = catalog();
        for j in cat.jurisdictions.iter_mut().filter(|j| j.code == "TX" || j.code == "CA") {
            j.zip_codes.push("99999".into());
        }
        let addr = ServiceAddress {
            zip_code: Some("99999".into()),
            ..ServiceAddress::default()
        };
        let res = find_jurisdictions_for_address(&cat, &addr);
        assert_eq!(codes(&res), vec!["US", "CA", "TX"]);
    }

    #[test]
    fn federal_only_drops_geographic_matches() {
        let cat = catalog();
        let addr = ServiceAddress {
            state_code: Some("TX".into()),
            ..ServiceAddress::default()
        };
        let res = find_jurisdictions_for_address(&cat, &addr).federal_only();
        assert_eq!(codes(&res), vec!["US"]);
    }
}
