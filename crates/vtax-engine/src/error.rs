//! Calculation errors.
//!
//! Per-rate failures never abort a calculation; they are reported inside
//! the result (see [`RateFailure`](crate::composer::RateFailure)). The
//! errors here stop the whole line item.

use thiserror::Error;
use vtax_catalog::{FieldError, ProfileError};
use vtax_core::CanonicalizationError;

use crate::composer::TotalsOverflow;

/// The tenant's configuration cannot serve this request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No category covers the service type and fallback is disabled.
    #[error("no tax category covers service type '{service_type}'")]
    NoCategory { service_type: String },

    /// The resolved profile requires a field it never defines.
    #[error("profile '{profile}' requires field '{field}' but does not define it")]
    UndefinedRequiredField { profile: String, field: String },
}

/// Why a line item could not be calculated.
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Tenant configuration defect.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Caller input rejected. Lists every failing field.
    #[error("input validation failed: {}", .fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    Validation { fields: Vec<FieldError> },

    /// The result could not be canonicalized for its digest.
    #[error("result digest failed: {0}")]
    Digest(#[from] CanonicalizationError),
}

impl CalculationError {
    /// Validation error for a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            fields: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }
}

impl From<TotalsOverflow> for CalculationError {
    fn from(e: TotalsOverflow) -> Self {
        Self::field("base_amount", e.to_string())
    }
}

impl From<ProfileError> for CalculationError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::UndefinedRequiredField { profile, field } => {
                Self::Configuration(ConfigurationError::UndefinedRequiredField { profile, field })
            }
            ProfileError::InvalidFields { fields } => Self::Validation { fields },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_errors_split_into_configuration_and_validation() {
        let config: CalculationError = ProfileError::UndefinedRequiredField {
            profile: "VoIP".into(),
            field: "line_count".into(),
        }
        .into();
        assert!(matches!(
            config,
            CalculationError::Configuration(ConfigurationError::UndefinedRequiredField { .. })
        ));

        let invalid: CalculationError = ProfileError::InvalidFields {
            fields: vec![FieldError {
                field: "line_count".into(),
                message: "must be >= 1".into(),
            }],
        }
        .into();
        assert_eq!(
            invalid.to_string(),
            "input validation failed: line_count: must be >= 1"
        );
    }
}
