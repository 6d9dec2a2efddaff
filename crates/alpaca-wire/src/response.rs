//! Response envelope decoding.
//!
//! Every Alpaca response body is a JSON object carrying
//! `ClientTransactionID`, `ServerTransactionID`, `ErrorNumber`,
//! `ErrorMessage` and, for successful reads, `Value`. The HTTP status says
//! nothing about the application outcome; `ErrorNumber` does.

use crate::keys::{as_u32, json_kind, FieldLookup, KeyCasing};
use alpaca_core::DecodeError;
use serde_json::Value;

pub const CLIENT_TRANSACTION_ID: &str = "ClientTransactionID";
pub const SERVER_TRANSACTION_ID: &str = "ServerTransactionID";
pub const ERROR_NUMBER: &str = "ErrorNumber";
pub const ERROR_MESSAGE: &str = "ErrorMessage";
pub const VALUE: &str = "Value";

/// How the `Value` field of a successful response is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    /// No value expected (method calls, property writes)
    None,
    Bool,
    Int,
    Double,
    String,
    StringArray,
    IntArray,
    /// Enumeration transmitted as its ordinal
    Ordinal,
    /// Raw JSON, decoded further by the caller
    Json,
}

/// A decoded `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    StringArray(Vec<String>),
    IntArray(Vec<i64>),
    Ordinal(u32),
    Json(Value),
}

impl TypedValue {
    /// Shape this value was decoded as.
    pub fn shape(&self) -> ValueShape {
        match self {
            TypedValue::None => ValueShape::None,
            TypedValue::Bool(_) => ValueShape::Bool,
            TypedValue::Int(_) => ValueShape::Int,
            TypedValue::Double(_) => ValueShape::Double,
            TypedValue::String(_) => ValueShape::String,
            TypedValue::StringArray(_) => ValueShape::StringArray,
            TypedValue::IntArray(_) => ValueShape::IntArray,
            TypedValue::Ordinal(_) => ValueShape::Ordinal,
            TypedValue::Json(_) => ValueShape::Json,
        }
    }
}

/// Application-level error channel of a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorEnvelope {
    pub error_number: i32,
    pub error_message: String,
}

impl ErrorEnvelope {
    pub fn is_success(&self) -> bool {
        self.error_number == 0
    }
}

/// A fully decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub client_transaction_id: Option<u32>,
    pub server_transaction_id: Option<u32>,
    pub error: ErrorEnvelope,
    /// `TypedValue::None` whenever `error` is not a success
    pub value: TypedValue,
}

impl DecodedResponse {
    /// The value on success, the envelope otherwise.
    pub fn into_result(self) -> Result<TypedValue, ErrorEnvelope> {
        if self.error.is_success() {
            Ok(self.value)
        } else {
            Err(self.error)
        }
    }
}

/// Decodes a response body.
///
/// A missing `ErrorNumber` counts as success and a missing `ErrorMessage`
/// as empty. `Value` is only interpreted when `ErrorNumber` is zero, since
/// servers fill it with placeholders on failure.
pub fn decode_response(
    body: &[u8],
    shape: ValueShape,
    casing: KeyCasing,
) -> Result<DecodedResponse, DecodeError> {
    let root: Value = serde_json::from_slice(body)?;
    let lookup = FieldLookup::new(&root, casing)?;

    let client_transaction_id = lookup.optional_u32(CLIENT_TRANSACTION_ID)?;
    let server_transaction_id = lookup.optional_u32(SERVER_TRANSACTION_ID)?;

    let error_number = match lookup.get(ERROR_NUMBER)? {
        None | Some(Value::Null) => 0,
        Some(v) => {
            let n = v
                .as_i64()
                .ok_or_else(|| DecodeError::wrong_type(ERROR_NUMBER, "integer"))?;
            i32::try_from(n).map_err(|_| DecodeError::OutOfRange {
                field: ERROR_NUMBER.to_string(),
                value: n.to_string(),
            })?
        }
    };
    let error = ErrorEnvelope {
        error_number,
        error_message: lookup.string_or_empty(ERROR_MESSAGE)?,
    };

    let value = if error.is_success() {
        decode_value(lookup.get(VALUE)?, shape)?
    } else {
        TypedValue::None
    };

    Ok(DecodedResponse {
        client_transaction_id,
        server_transaction_id,
        error,
        value,
    })
}

fn decode_value(value: Option<&Value>, shape: ValueShape) -> Result<TypedValue, DecodeError> {
    if shape == ValueShape::None {
        return Ok(TypedValue::None);
    }
    let value = value.ok_or_else(|| DecodeError::missing_field(VALUE))?;
    let wrong = |expected: &str| DecodeError::WrongType {
        field: VALUE.to_string(),
        expected: format!("{}, got {}", expected, json_kind(value)),
    };

    Ok(match shape {
        ValueShape::None => TypedValue::None,
        ValueShape::Bool => TypedValue::Bool(value.as_bool().ok_or_else(|| wrong("boolean"))?),
        ValueShape::Int => TypedValue::Int(value.as_i64().ok_or_else(|| wrong("integer"))?),
        ValueShape::Double => TypedValue::Double(value.as_f64().ok_or_else(|| wrong("number"))?),
        ValueShape::String => TypedValue::String(
            value
                .as_str()
                .ok_or_else(|| wrong("string"))?
                .to_string(),
        ),
        ValueShape::StringArray => {
            let items = value.as_array().ok_or_else(|| wrong("array of strings"))?;
            TypedValue::StringArray(
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| wrong("array of strings"))?,
            )
        }
        ValueShape::IntArray => {
            let items = value.as_array().ok_or_else(|| wrong("array of integers"))?;
            TypedValue::IntArray(
                items
                    .iter()
                    .map(Value::as_i64)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| wrong("array of integers"))?,
            )
        }
        ValueShape::Ordinal => TypedValue::Ordinal(as_u32(VALUE, value)?),
        ValueShape::Json => TypedValue::Json(value.clone()),
    })
}

/// Conversion from a decoded `Value` into a Rust type.
///
/// Enumerations transmitted by ordinal implement this with
/// `SHAPE = ValueShape::Ordinal`.
pub trait FromTypedValue: Sized {
    /// Shape to request from the decoder.
    const SHAPE: ValueShape;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError>;
}

fn mismatch(value: &TypedValue, expected: ValueShape) -> DecodeError {
    DecodeError::WrongType {
        field: VALUE.to_string(),
        expected: format!("{:?}, got {:?}", expected, value.shape()),
    }
}

impl FromTypedValue for () {
    const SHAPE: ValueShape = ValueShape::None;

    fn from_typed(_: TypedValue) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl FromTypedValue for bool {
    const SHAPE: ValueShape = ValueShape::Bool;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::Bool(b) => Ok(b),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}

impl FromTypedValue for i64 {
    const SHAPE: ValueShape = ValueShape::Int;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::Int(n) => Ok(n),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}

impl FromTypedValue for i32 {
    const SHAPE: ValueShape = ValueShape::Int;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        let n = i64::from_typed(value)?;
        i32::try_from(n).map_err(|_| DecodeError::OutOfRange {
            field: VALUE.to_string(),
            value: n.to_string(),
        })
    }
}

impl FromTypedValue for f64 {
    const SHAPE: ValueShape = ValueShape::Double;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::Double(d) => Ok(d),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}

impl FromTypedValue for String {
    const SHAPE: ValueShape = ValueShape::String;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::String(s) => Ok(s),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}

impl FromTypedValue for Vec<String> {
    const SHAPE: ValueShape = ValueShape::StringArray;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::StringArray(items) => Ok(items),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}

impl FromTypedValue for Vec<i64> {
    const SHAPE: ValueShape = ValueShape::IntArray;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::IntArray(items) => Ok(items),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}

impl FromTypedValue for Value {
    const SHAPE: ValueShape = ValueShape::Json;

    fn from_typed(value: TypedValue) -> Result<Self, DecodeError> {
        match value {
            TypedValue::Json(v) => Ok(v),
            other => Err(mismatch(&other, Self::SHAPE)),
        }
    }
}
