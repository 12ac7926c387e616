//! # Error Hierarchy
//!
//! Structured error types shared by every crate in the workspace, built
//! with `thiserror`. No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! Each variant carries the offending input so operators can diagnose
//! misconfiguration without re-running the calculation.

use thiserror::Error;

/// Top-level error type for foundation operations.
#[derive(Error, Debug)]
pub enum VtaxError {
    /// Canonicalization failure during digest computation.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Domain primitive validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Integrity violation (digest mismatch on a stored calculation).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be decimal strings or integers.
    #[error("float values are not permitted in canonical representations; use decimal strings for amounts: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors for domain primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Service type is empty or contains characters outside `[a-z0-9_]`.
    #[error("invalid service type: \"{0}\" (expected lowercase snake_case, 1-64 characters)")]
    InvalidServiceType(String),

    /// Monetary amount could not be parsed as a decimal.
    #[error("invalid amount: \"{0}\" (expected a decimal number such as 100.00)")]
    InvalidAmount(String),

    /// Monetary amount is negative where only non-negative values are allowed.
    #[error("amount must not be negative: {0}")]
    NegativeAmount(String),

    /// Timestamp string is not valid RFC 3339.
    #[error("invalid timestamp: \"{value}\" ({reason})")]
    InvalidTimestamp {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
