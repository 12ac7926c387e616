//! # Jurisdictions
//!
//! A [`Jurisdiction`] is a geographic or regulatory authority that can impose
//! a tax: the federal government, a state, a county, a city, a special
//! district, or a single zip code.
//!
//! ## Hierarchy
//!
//! Jurisdictions form a forest through `parent_id`. A federal jurisdiction
//! has no parent; every other jurisdiction has at most one. Cycles and
//! dangling parents are rejected at catalog load (see
//! [`crate::validation`]).
//!
//! ## Lifecycle
//!
//! Jurisdictions are never hard-deleted. [`Jurisdiction::soft_delete`]
//! stamps `deleted_at`, after which the record is ignored by resolution but
//! remains available for reconstructing historical calculations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vtax_core::{JurisdictionId, Timestamp};

/// The level of a jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionType {
    /// National government. Always covers every address.
    Federal,
    /// State or province. Matched by state code.
    State,
    /// County.
    County,
    /// City. Matched by name when nothing more precise is available.
    City,
    /// Municipality. Matched by name like a city.
    Municipality,
    /// Special taxing district (911 district, transit district, ...).
    SpecialDistrict,
    /// A single zip code or set of zip codes.
    ZipCode,
}

impl JurisdictionType {
    /// Return the string representation of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Federal => "federal",
            Self::State => "state",
            Self::County => "county",
            Self::City => "city",
            Self::Municipality => "municipality",
            Self::SpecialDistrict => "special_district",
            Self::ZipCode => "zip_code",
        }
    }

    /// Return all jurisdiction types.
    pub fn all() -> &'static [JurisdictionType] {
        &[
            Self::Federal,
            Self::State,
            Self::County,
            Self::City,
            Self::Municipality,
            Self::SpecialDistrict,
            Self::ZipCode,
        ]
    }

    /// Whether jurisdictions of this type may be matched by place name.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::City | Self::Municipality)
    }
}

impl std::fmt::Display for JurisdictionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point on the globe. Coordinates are decimal degrees so polygon tests
/// are exact and reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    pub latitude: Decimal,
    /// Longitude in decimal degrees.
    pub longitude: Decimal,
}

impl GeoPoint {
    /// Create a point from latitude and longitude.
    pub fn new(latitude: Decimal, longitude: Decimal) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Geographic boundary of a jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundaries {
    /// Closed polygon ring. The last vertex connects back to the first.
    pub polygon: Vec<GeoPoint>,
}

/// The agency that administers taxes in a jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAuthority {
    /// Agency name, e.g. "Texas Comptroller of Public Accounts".
    pub name: String,
    /// Public website.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Filing contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// How often returns are filed with a jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingFrequency {
    /// Monthly returns.
    Monthly,
    /// Quarterly returns.
    Quarterly,
    /// Annual returns.
    Annually,
}

/// Filing obligations for a jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRequirements {
    /// Return frequency.
    pub frequency: FilingFrequency,
    /// Day of the month the return is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_day: Option<u8>,
    /// Whether the jurisdiction requires registration before collecting.
    #[serde(default)]
    pub registration_required: bool,
}

fn default_true() -> bool {
    true
}

/// A taxing jurisdiction in a tenant's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    /// Unique identifier.
    pub id: JurisdictionId,
    /// Level of this jurisdiction.
    pub jurisdiction_type: JurisdictionType,
    /// Display name. Also used for case-insensitive city matching.
    pub name: String,
    /// Short code, e.g. `US`, `TX`, `TX-AUSTIN`.
    pub code: String,
    /// FIPS code. Addresses match when their FIPS code starts with this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fips_code: Option<String>,
    /// Two-letter state code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    /// Single zip code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    /// Additional zip codes covered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zip_codes: Vec<String>,
    /// Geographic boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundaries: Option<Boundaries>,
    /// Containing jurisdiction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JurisdictionId>,
    /// Administering agency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<TaxAuthority>,
    /// Filing obligations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_requirements: Option<FilingRequirements>,
    /// Inactive jurisdictions are skipped by resolution.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Evaluation order. Federal is 1; larger numbers are more local and
    /// are evaluated later.
    pub priority: u32,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl Jurisdiction {
    /// Create an active jurisdiction with no geographic matchers set.
    pub fn new(
        jurisdiction_type: JurisdictionType,
        name: impl Into<String>,
        code: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            id: JurisdictionId::new(),
            jurisdiction_type,
            name: name.into(),
            code: code.into(),
            fips_code: None,
            state_code: None,
            zip_code: None,
            zip_codes: Vec::new(),
            boundaries: None,
            parent_id: None,
            authority: None,
            filing_requirements: None,
            is_active: true,
            priority,
            deleted_at: None,
        }
    }

    /// Set the state code.
    pub fn with_state_code(mut self, state_code: impl Into<String>) -> Self {
        self.state_code = Some(state_code.into());
        self
    }

    /// Set the FIPS code.
    pub fn with_fips_code(mut self, fips_code: impl Into<String>) -> Self {
        self.fips_code = Some(fips_code.into());
        self
    }

    /// Add zip codes.
    pub fn with_zip_codes<I, S>(mut self, zips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zip_codes.extend(zips.into_iter().map(Into::into));
        self
    }

    /// Set the boundary polygon.
    pub fn with_polygon(mut self, polygon: Vec<GeoPoint>) -> Self {
        self.boundaries = Some(Boundaries { polygon });
        self
    }

    /// Set the parent jurisdiction.
    pub fn with_parent(mut self, parent_id: JurisdictionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Active and not soft-deleted.
    pub fn is_effective(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// Whether this jurisdiction lists `zip` in `zip_code` or `zip_codes`.
    ///
    /// ZIP+4 input (`78701-1234`) is compared on its five-digit prefix.
    pub fn covers_zip(&self, zip: &str) -> bool {
        let zip5 = zip.trim().split('-').next().unwrap_or_default();
        if zip5.is_empty() {
            return false;
        }
        self.zip_code.as_deref() == Some(zip5) || self.zip_codes.iter().any(|z| z == zip5)
    }

    /// Boundary polygon, if one with at least three vertices is configured.
    pub fn polygon(&self) -> Option<&[GeoPoint]> {
        self.boundaries
            .as_ref()
            .map(|b| b.polygon.as_slice())
            .filter(|p| p.len() >= 3)
    }

    /// Mark the jurisdiction deleted. Idempotent; the first timestamp wins.
    pub fn soft_delete(&mut self, at: Timestamp) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn jurisdiction_type_roundtrips_through_serde() {
        for t in JurisdictionType::all() {
            let json = serde_json::to_string(t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            let back: JurisdictionType = serde_json::from_str(&json).unwrap();
            assert_eq!(*t, back);
        }
    }

    #[test]
    fn only_city_and_municipality_are_local() {
        let local: Vec<_> = JurisdictionType::all()
            .iter()
            .filter(|t| t.is_local())
            .collect();
        assert_eq!(local, vec![&JurisdictionType::City, &JurisdictionType::Municipality]);
    }

    #[test]
    fn covers_zip_checks_both_fields_and_zip4() {
        let mut j = Jurisdiction::new(JurisdictionType::ZipCode, "Downtown", "Z-78701", 50)
            .with_zip_codes(["78702"]);
        j.zip_code = Some("78701".into());
        assert!(j.covers_zip("78701"));
        assert!(j.covers_zip("78702-0001"));
        assert!(!j.covers_zip("78703"));
        assert!(!j.covers_zip(""));
    }

    #[test]
    fn degenerate_polygon_is_ignored() {
        let j = Jurisdiction::new(JurisdictionType::SpecialDistrict, "D", "D", 40).with_polygon(vec![
            GeoPoint::new(dec!(0), dec!(0)),
            GeoPoint::new(dec!(1), dec!(1)),
        ]);
        assert!(j.polygon().is_none());
    }

    #[test]
    fn soft_delete_keeps_first_timestamp() {
        let mut j = Jurisdiction::new(JurisdictionType::State, "Texas", "TX", 10);
        let first = Timestamp::parse("2026-01-01T00:00:00Z").unwrap();
        let second = Timestamp::parse("2026-02-01T00:00:00Z").unwrap();
        j.soft_delete(first);
        j.soft_delete(second);
        assert_eq!(j.deleted_at, Some(first));
        assert!(!j.is_effective());
    }
}
