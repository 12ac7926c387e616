//! # Identity Newtypes
//!
//! Identifier newtypes for every tenant-scoped record the tax engine reads
//! or writes. Each identifier is a distinct type; you cannot pass a
//! [`CategoryId`] where a [`JurisdictionId`] is expected.
//!
//! ## Validation
//!
//! UUID-based identifiers are always valid by construction. [`ServiceType`]
//! validates its format at construction time and on deserialization, so a
//! catalog document with a malformed service type is rejected at load.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Implements `Deserialize` by routing through the validating constructor.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

uuid_identifier!(
    /// The tenant (billing company) that owns configuration and calculations.
    CompanyId
);

uuid_identifier!(
    /// The user or service account performing an action.
    ActorId
);

uuid_identifier!(
    /// The billed client a line item belongs to. Exemption certificates are
    /// issued per client.
    ClientId
);

uuid_identifier!(
    /// A persisted tax calculation in the ledger.
    CalculationId
);

uuid_identifier!(
    /// A jurisdiction in the tenant's catalog.
    JurisdictionId
);

uuid_identifier!(
    /// A tax category in the tenant's catalog.
    CategoryId
);

uuid_identifier!(
    /// A tax profile in the tenant's catalog.
    ProfileId
);

uuid_identifier!(
    /// A VoIP tax rate rule in the tenant's catalog.
    RateId
);

uuid_identifier!(
    /// A tax exemption certificate or rule.
    ExemptionId
);

// ---------------------------------------------------------------------------
// String-based identifiers (validated at construction)
// ---------------------------------------------------------------------------

/// A billable service type, e.g. `voip_fixed`, `long_distance`, `equipment`.
///
/// # Validation
///
/// - 1 to 64 characters
/// - lowercase ASCII letters, digits and `_` only
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ServiceType(String);

impl_validating_deserialize!(ServiceType);

impl ServiceType {
    /// Create a service type, validating its format.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = !s.is_empty()
            && s.len() <= 64
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(ValidationError::InvalidServiceType(s));
        }
        Ok(Self(s))
    }

    /// Access the service type string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
