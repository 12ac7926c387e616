//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps engine, ledger and catalog errors to HTTP status codes with a
//! JSON body `{ "error": { "code", "message", "details"? } }`. Internal
//! error details never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use vtax_catalog::{CatalogError, ProfileError};
use vtax_engine::{CalculationError, ConfigurationError};
use vtax_ledger::LedgerError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code, e.g. `NOT_FOUND`, `VALIDATION_ERROR`.
    pub code: String,
    pub message: String,
    /// Per-field or per-issue detail for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Business-rule validation failed (422). `details` lists the
    /// offending fields or catalog paths.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The tenant's catalog cannot serve this request (422).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The calculation cannot be applied (422).
    #[error("incomplete calculation: {0}")]
    IncompleteCalculation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Illegal lifecycle transition (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stale version on an optimistic write (409).
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// Logged, never returned to the client (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::Configuration(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONFIGURATION_ERROR"),
            Self::IncompleteCalculation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INCOMPLETE_CALCULATION")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION"),
            Self::VersionConflict(_) => (StatusCode::CONFLICT, "VERSION_CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let details = match self {
            Self::Validation { details, .. } => details,
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<vtax_core::ValidationError> for AppError {
    fn from(err: vtax_core::ValidationError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<CalculationError> for AppError {
    fn from(err: CalculationError) -> Self {
        match err {
            CalculationError::Configuration(c) => c.into(),
            CalculationError::Validation { fields } => Self::Validation {
                message: format!("{} invalid input field(s)", fields.len()),
                details: serde_json::to_value(&fields).ok(),
            },
            CalculationError::Digest(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ConfigurationError> for AppError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<ProfileError> for AppError {
    fn from(err: ProfileError) -> Self {
        CalculationError::from(err).into()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::NotFound(_) => Self::NotFound(err.to_string()),
            LedgerError::InvalidStateTransition { .. } | LedgerError::Voided { .. } => {
                Self::Conflict(err.to_string())
            }
            LedgerError::IncompleteCalculation { .. } => {
                Self::IncompleteCalculation(err.to_string())
            }
            LedgerError::VersionConflict { .. } => Self::VersionConflict(err.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Invalid { issues } => Self::Validation {
                message: format!("catalog rejected with {} error(s)", issues.len()),
                details: serde_json::to_value(&issues).ok(),
            },
            CatalogError::UnknownRate(_) | CatalogError::UnknownJurisdiction(_) => {
                Self::NotFound(err.to_string())
            }
            CatalogError::InvalidRateUpdate { .. } => Self::validation(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
