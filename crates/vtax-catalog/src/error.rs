//! Catalog error types.
//!
//! Load and validation errors carry the file path or the catalog path
//! (`rates[3].tiers`) of the offending entry so operators can fix the
//! configuration without guesswork.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vtax_core::{JurisdictionId, RateId};

use crate::validation::ConfigIssue;

/// Errors raised while loading or editing a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// YAML parsing failed.
    #[error("failed to parse YAML at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// JSON parsing failed.
    #[error("failed to parse JSON at {path}: {source}")]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A catalog file was not found.
    #[error("catalog file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// File extension is neither YAML nor JSON.
    #[error("unsupported catalog format at {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: PathBuf },

    /// Load-time validation rejected the catalog.
    #[error("catalog is invalid: {} error(s), first: {}", .issues.len(), .issues.first().map(|i| i.to_string()).unwrap_or_default())]
    Invalid { issues: Vec<ConfigIssue> },

    /// No rate with this id exists.
    #[error("rate not found: {0}")]
    UnknownRate(RateId),

    /// No jurisdiction with this id exists.
    #[error("jurisdiction not found: {0}")]
    UnknownJurisdiction(JurisdictionId),

    /// A rate edit would leave the rate malformed.
    #[error("rejected update to rate {rate_id}: {reason}")]
    InvalidRateUpdate { rate_id: RateId, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic serde_json error (not file-specific).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors from applying a profile's validation rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// The profile requires a field it never defines. This is a
    /// configuration defect, not a caller mistake.
    #[error("profile '{profile}' requires field '{field}' but does not define it")]
    UndefinedRequiredField { profile: String, field: String },

    /// One or more inputs are missing or fail type/range checks.
    #[error("{} invalid input field(s): {}", .fields.len(), .fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    InvalidFields { fields: Vec<FieldError> },
}
