//! JSON key normalization.
//!
//! Alpaca servers disagree on the casing of envelope keys (`ClientTransactionID`
//! vs `ClientTransactionId` vs `clienttransactionid`). Every lookup goes
//! through [`FieldLookup`], which normalizes keys once and then matches,
//! tolerating or rejecting case differences according to [`KeyCasing`].

use alpaca_core::DecodeError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// How JSON object keys are matched against expected field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCasing {
    /// Keys match regardless of ASCII case
    #[default]
    Tolerant,
    /// Keys must match exactly; a case-only difference is a decode error
    Strict,
}

impl KeyCasing {
    /// Maps the `strict_casing` configuration flag.
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            KeyCasing::Strict
        } else {
            KeyCasing::Tolerant
        }
    }
}

/// Normalized form of a key.
pub fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// Field access over one JSON object.
pub struct FieldLookup<'a> {
    object: &'a Map<String, Value>,
    normalized: HashMap<String, &'a str>,
    casing: KeyCasing,
}

impl<'a> FieldLookup<'a> {
    /// Wraps `value`, which must be a JSON object.
    pub fn new(value: &'a Value, casing: KeyCasing) -> Result<Self, DecodeError> {
        let object = value.as_object().ok_or_else(|| DecodeError::NotAnObject {
            actual: json_kind(value).to_string(),
        })?;
        Ok(Self::from_map(object, casing))
    }

    /// Wraps an object map directly.
    pub fn from_map(object: &'a Map<String, Value>, casing: KeyCasing) -> Self {
        let normalized = object
            .keys()
            .map(|k| (normalize_key(k), k.as_str()))
            .collect();
        Self {
            object,
            normalized,
            casing,
        }
    }

    /// Looks up `field`.
    ///
    /// Returns `Ok(None)` when no key matches even after normalization.
    pub fn get(&self, field: &str) -> Result<Option<&'a Value>, DecodeError> {
        if let Some(value) = self.object.get(field) {
            return Ok(Some(value));
        }

        let Some(actual) = self.normalized.get(&normalize_key(field)) else {
            return Ok(None);
        };

        match self.casing {
            KeyCasing::Tolerant => Ok(self.object.get(*actual)),
            KeyCasing::Strict => Err(DecodeError::CasingMismatch {
                expected: field.to_string(),
                found: (*actual).to_string(),
            }),
        }
    }

    /// Looks up a field that must be present.
    pub fn require(&self, field: &str) -> Result<&'a Value, DecodeError> {
        self.get(field)?
            .ok_or_else(|| DecodeError::missing_field(field))
    }

    /// Optional string field; absent and `null` become an empty string.
    pub fn string_or_empty(&self, field: &str) -> Result<String, DecodeError> {
        match self.get(field)? {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(DecodeError::wrong_type(field, "string")),
        }
    }

    /// Optional unsigned 32-bit field.
    pub fn optional_u32(&self, field: &str) -> Result<Option<u32>, DecodeError> {
        match self.get(field)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => as_u32(field, value).map(Some),
        }
    }
}

/// Reads a JSON number as `u32`.
pub(crate) fn as_u32(field: &str, value: &Value) -> Result<u32, DecodeError> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| DecodeError::OutOfRange {
            field: field.to_string(),
            value: n.to_string(),
        });
    }
    if let Some(n) = value.as_i64() {
        return Err(DecodeError::OutOfRange {
            field: field.to_string(),
            value: n.to_string(),
        });
    }
    Err(DecodeError::wrong_type(field, "unsigned integer"))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
