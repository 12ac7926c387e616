//! # Calculation Status
//!
//! ```text
//! Draft ──▶ Calculated ──▶ Applied ──▶ Voided
//!               │                        ▲
//!               ├──▶ Adjusted            │
//!               └────────────────────────┘
//! ```
//!
//! `Voided` and `Adjusted` are terminal. An adjusted calculation is replaced
//! by a new record that points back at it; it is never edited in place.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a persisted calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    /// Created but not yet composed. Only seen as the origin of the first
    /// history entry.
    Draft,
    /// Composed and recorded. Committed fact from here on.
    Calculated,
    /// Attached to a finalized invoice.
    Applied,
    /// Superseded by an adjustment calculation.
    Adjusted,
    /// Inert for billing. Nothing leaves this state.
    Voided,
}

impl CalculationStatus {
    /// Every status, in lifecycle order.
    pub fn all() -> &'static [CalculationStatus] {
        &[
            Self::Draft,
            Self::Calculated,
            Self::Applied,
            Self::Adjusted,
            Self::Voided,
        ]
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Calculated => "calculated",
            Self::Applied => "applied",
            Self::Adjusted => "adjusted",
            Self::Voided => "voided",
        }
    }

    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: CalculationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Calculated)
                | (Self::Calculated, Self::Applied)
                | (Self::Calculated, Self::Adjusted)
                | (Self::Calculated, Self::Voided)
                | (Self::Applied, Self::Voided)
        )
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Adjusted | Self::Voided)
    }

    /// Whether the record still counts towards billing.
    pub fn is_billable(&self) -> bool {
        matches!(self, Self::Calculated | Self::Applied)
    }
}

impl std::fmt::Display for CalculationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
