//! Service address supplied with a line item.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vtax_catalog::GeoPoint;

/// Where a service is delivered. Every field is optional; resolution uses
/// whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    /// Street line, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    /// City name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Municipality name, when distinct from the postal city.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    /// Two-letter state code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    /// Five-digit zip or ZIP+4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    /// Full FIPS code of the location (state + county + place).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fips_code: Option<String>,
    /// Latitude in decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Decimal>,
    /// Longitude in decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Decimal>,
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ServiceAddress {
    /// Zip code, trimmed, if present.
    pub fn zip(&self) -> Option<&str> {
        non_blank(&self.zip_code)
    }

    /// State code, trimmed, if present.
    pub fn state(&self) -> Option<&str> {
        non_blank(&self.state_code)
    }

    /// FIPS code, trimmed, if present.
    pub fn fips(&self) -> Option<&str> {
        non_blank(&self.fips_code)
    }

    /// City and municipality names that are present.
    pub fn place_names(&self) -> impl Iterator<Item = &str> {
        non_blank(&self.city)
            .into_iter()
            .chain(non_blank(&self.municipality))
    }

    /// Coordinates, when both are present.
    pub fn point(&self) -> Option<GeoPoint> {
        Some(GeoPoint::new(self.latitude?, self.longitude?))
    }

    /// Whether any field usable for jurisdiction matching is present.
    pub fn has_usable_fields(&self) -> bool {
        self.zip().is_some()
            || self.state().is_some()
            || self.fips().is_some()
            || self.point().is_some()
            || self.place_names().next().is_some()
    }
}
