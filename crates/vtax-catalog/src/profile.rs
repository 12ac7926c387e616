//! # Tax Profiles
//!
//! A [`TaxProfile`] binds a category to a calculation engine and declares the
//! extra inputs that engine needs (`line_count`, `minutes`, `data_usage`, ...)
//! with types, defaults and ranges.
//!
//! ## Validation contract
//!
//! Callers run [`TaxProfile::validate_inputs`] before any rate is evaluated.
//! It returns the normalized input map: declared fields coerced to their
//! type, defaults filled in, unknown fields dropped. A missing required
//! field is an error, never a silent zero.
//!
//! Normalized decimals are stored as JSON strings so the map can be
//! canonicalized and digested alongside the calculation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vtax_core::{CategoryId, ProfileId};

use crate::category::CategoryType;
use crate::error::{FieldError, ProfileError};

/// The engine that evaluates a profile's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationEngine {
    /// Jurisdiction-composed VoIP/telecom engine.
    VoipTelecom,
    /// Same composition with no usage-based inputs.
    General,
}

impl CalculationEngine {
    /// Return the string representation of this engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoipTelecom => "voip_telecom",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for CalculationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Whole number.
    Integer,
    /// Exact decimal.
    Decimal,
    /// `true` / `false`.
    Boolean,
    /// Free text, optionally restricted to `allowed_values`.
    String,
}

impl FieldType {
    /// Return the string representation of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }
}

/// Declaration of one input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Value type.
    pub field_type: FieldType,
    /// Label for forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Value used when the caller omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Inclusive lower bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    /// Inclusive upper bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    /// Accepted values for string fields. Empty accepts anything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl FieldDefinition {
    /// A field of the given type with no constraints.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            label: None,
            default: None,
            min: None,
            max: None,
            allowed_values: Vec::new(),
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set an inclusive minimum.
    pub fn with_min(mut self, min: Decimal) -> Self {
        self.min = Some(min);
        self
    }
}

/// A flattened, caller-facing validation rule for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Field name.
    pub field: String,
    /// Whether the field must be present or defaulted.
    pub required: bool,
    /// Value type.
    pub field_type: FieldType,
    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    /// Inclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    /// Accepted string values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// A tax profile in a tenant's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxProfile {
    /// Unique identifier.
    pub id: ProfileId,
    /// Display name.
    pub name: String,
    /// Exact category binding. Takes precedence over `category_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    /// Binding by category type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_type: Option<CategoryType>,
    /// Engine used for bound categories.
    pub engine: CalculationEngine,
    /// Fields that must be present or defaulted.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Declared fields, keyed by name.
    #[serde(default)]
    pub field_definitions: BTreeMap<String, FieldDefinition>,
    /// Inactive profiles are never selected.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl TaxProfile {
    /// Create an active profile with no declared fields.
    pub fn new(name: impl Into<String>, engine: CalculationEngine) -> Self {
        Self {
            id: ProfileId::new(),
            name: name.into(),
            category_id: None,
            category_type: None,
            engine,
            required_fields: Vec::new(),
            field_definitions: BTreeMap::new(),
            is_active: true,
        }
    }

    /// Declare a field. `required` also adds it to `required_fields`.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        definition: FieldDefinition,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required && !self.required_fields.contains(&name) {
            self.required_fields.push(name.clone());
        }
        self.field_definitions.insert(name, definition);
        self
    }

    /// The profile used when a category has none configured: general
    /// engine, no declared inputs.
    pub fn engine_default() -> Self {
        Self {
            id: ProfileId::from_uuid(uuid::Uuid::nil()),
            ..Self::new("Default", CalculationEngine::General)
        }
    }

    /// Every declared field as a validation rule, in name order.
    ///
    /// Fails with [`ProfileError::UndefinedRequiredField`] when a required
    /// field has no definition.
    pub fn get_validation_rules(&self) -> Result<Vec<ValidationRule>, ProfileError> {
        if let Some(missing) = self
            .required_fields
            .iter()
            .find(|f| !self.field_definitions.contains_key(*f))
        {
            return Err(ProfileError::UndefinedRequiredField {
                profile: self.name.clone(),
                field: missing.clone(),
            });
        }
        Ok(self
            .field_definitions
            .iter()
            .map(|(name, def)| ValidationRule {
                field: name.clone(),
                required: self.required_fields.contains(name),
                field_type: def.field_type,
                default: def.default.clone(),
                min: def.min,
                max: def.max,
                allowed_values: def.allowed_values.clone(),
            })
            .collect())
    }

    /// Validate and normalize caller inputs.
    ///
    /// Every field error is collected before returning, so the caller sees
    /// the complete list in one round trip.
    pub fn validate_inputs(
        &self,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ProfileError> {
        let rules = self.get_validation_rules()?;
        let mut normalized = BTreeMap::new();
        let mut errors = Vec::new();

        for rule in &rules {
            let provided = inputs.get(&rule.field).filter(|v| !v.is_null());
            let Some(raw) = provided.or(rule.default.as_ref()) else {
                if rule.required {
                    errors.push(FieldError {
                        field: rule.field.clone(),
                        message: "is required".to_string(),
                    });
                }
                continue;
            };
            match normalize_value(rule, raw) {
                Ok(v) => {
                    normalized.insert(rule.field.clone(), v);
                }
                Err(message) => errors.push(FieldError {
                    field: rule.field.clone(),
                    message,
                }),
            }
        }

        if errors.is_empty() {
            Ok(normalized)
        } else {
            Err(ProfileError::InvalidFields { fields: errors })
        }
    }
}

fn normalize_value(rule: &ValidationRule, raw: &Value) -> Result<Value, String> {
    match rule.field_type {
        FieldType::Integer => {
            let n = match raw {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| "must be an integer".to_string())?;
            check_range(rule, Decimal::from(n))?;
            Ok(Value::from(n))
        }
        FieldType::Decimal => {
            let d = match raw {
                Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
                Value::String(s) => s.trim().parse::<Decimal>().ok(),
                _ => None,
            }
            .ok_or_else(|| "must be a decimal number".to_string())?;
            check_range(rule, d)?;
            Ok(Value::String(d.normalize().to_string()))
        }
        FieldType::Boolean => raw
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| "must be true or false".to_string()),
        FieldType::String => {
            let s = raw.as_str().ok_or_else(|| "must be a string".to_string())?;
            if !rule.allowed_values.is_empty() && !rule.allowed_values.iter().any(|a| a == s) {
                return Err(format!("must be one of: {}", rule.allowed_values.join(", ")));
            }
            Ok(Value::String(s.to_string()))
        }
    }
}

fn check_range(rule: &ValidationRule, value: Decimal) -> Result<(), String> {
    if let Some(min) = rule.min {
        if value < min {
            return Err(format!("must be >= {min}"));
        }
    }
    if let Some(max) = rule.max {
        if value > max {
            return Err(format!("must be <= {max}"));
        }
    }
    Ok(())
}

/// Read a normalized decimal input.
pub fn decimal_field(fields: &BTreeMap<String, Value>, name: &str) -> Option<Decimal> {
    match fields.get(name)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}
