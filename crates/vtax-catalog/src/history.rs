//! # Rate Change History
//!
//! Append-only record of administrative rate edits. Each entry stores a
//! field-level diff computed from the serialized rate before and after the
//! edit, the acting user and the new version number.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vtax_core::{ActorId, RateId, Timestamp};

/// What happened to the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateChangeAction {
    /// Rate added to the catalog.
    Created,
    /// One or more fields changed.
    Updated,
    /// Rate switched off.
    Deactivated,
}

impl RateChangeAction {
    /// Return the string representation of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deactivated => "deactivated",
        }
    }
}

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Value before the edit, `null` if absent.
    pub from: Value,
    /// Value after the edit, `null` if removed.
    pub to: Value,
}

/// One entry in a rate's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateChange {
    /// Rate that changed.
    pub rate_id: RateId,
    /// Version after the change.
    pub version: u32,
    /// Kind of change.
    pub action: RateChangeAction,
    /// Field-level diff, keyed by field name.
    pub changes: BTreeMap<String, FieldChange>,
    /// Who made the change.
    pub actor_id: ActorId,
    /// When the change was made.
    pub changed_at: Timestamp,
}

/// Diff two serialized records at the top level. Fields present on only one
/// side are reported against `null`. The `version` field is ignored.
pub fn diff_fields(before: &Value, after: &Value) -> BTreeMap<String, FieldChange> {
    let empty = serde_json::Map::new();
    let b = before.as_object().unwrap_or(&empty);
    let a = after.as_object().unwrap_or(&empty);

    let mut changes = BTreeMap::new();
    for key in b.keys().chain(a.keys()) {
        if key == "version" || changes.contains_key(key) {
            continue;
        }
        let from = b.get(key).cloned().unwrap_or(Value::Null);
        let to = a.get(key).cloned().unwrap_or(Value::Null);
        if from != to {
            changes.insert(key.clone(), FieldChange { from, to });
        }
    }
    changes
}
