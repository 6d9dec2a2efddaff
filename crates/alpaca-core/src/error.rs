//! Error types for Alpaca transactions and configuration.
//!
//! Every dispatched call resolves to `Result<_, DeviceError>`. The four
//! variants keep transport failures, server-reported application errors,
//! malformed payloads and bad configuration apart, so callers can decide on
//! retry policy without string matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using DeviceError as the error type.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Top-level error for a device or management transaction.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum DeviceError {
    /// The request never produced an HTTP response
    #[error("Communication error: {0}")]
    Communication(#[from] CommunicationError),

    /// The server answered with a non-zero ErrorNumber
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The response body could not be interpreted
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The call could not be attempted with the given configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl DeviceError {
    /// Returns the protocol error kind, if this is a server-reported error.
    pub fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            DeviceError::Protocol(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Returns true if the caller may reasonably retry the same call.
    ///
    /// The dispatcher itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeviceError::Communication(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Transport-level failures: refused connections, DNS, timeouts.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationError {
    /// The tier timeout elapsed before a response arrived
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// TCP connect or name resolution failed
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The caller cancelled the request
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// Any other transport failure while sending or reading
    #[error("Transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },
}

impl CommunicationError {
    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a connection failed error.
    pub fn connection_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Returns true unless the failure was a deliberate cancellation.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CommunicationError::Cancelled { .. })
    }
}

/// Well-known classes of server-reported errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolErrorKind {
    NotImplemented,
    InvalidValue,
    ValueNotSet,
    NotConnected,
    InvalidWhileParked,
    InvalidWhileSlaved,
    InvalidOperation,
    ActionNotImplemented,
    OperationCancelled,
    /// Any other non-zero ErrorNumber
    DriverError,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolErrorKind::NotImplemented => "not implemented",
            ProtocolErrorKind::InvalidValue => "invalid value",
            ProtocolErrorKind::ValueNotSet => "value not set",
            ProtocolErrorKind::NotConnected => "not connected",
            ProtocolErrorKind::InvalidWhileParked => "invalid while parked",
            ProtocolErrorKind::InvalidWhileSlaved => "invalid while slaved",
            ProtocolErrorKind::InvalidOperation => "invalid operation",
            ProtocolErrorKind::ActionNotImplemented => "action not implemented",
            ProtocolErrorKind::OperationCancelled => "operation cancelled",
            ProtocolErrorKind::DriverError => "driver error",
        };
        f.write_str(name)
    }
}

/// A server-reported application error, classified.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} (0x{error_number:X}): {message}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub error_number: i32,
    /// Server-supplied message, verbatim
    pub message: String,
}

/// Malformed probe replies or response bodies.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    /// Payload is not valid JSON
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    /// JSON payload is not an object where one was required
    #[error("Expected a JSON object, got {actual}")]
    NotAnObject { actual: String },

    /// A required field is absent
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// A field has the wrong JSON type
    #[error("Field '{field}' has wrong type: expected {expected}")]
    WrongType { field: String, expected: String },

    /// Strict casing was requested and a key differs only by case
    #[error("Field '{found}' does not match expected casing '{expected}'")]
    CasingMismatch { expected: String, found: String },

    /// A numeric field is outside its valid range
    #[error("Field '{field}' out of range: {value}")]
    OutOfRange { field: String, value: String },
}

impl DecodeError {
    /// Creates an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates a wrong type error.
    pub fn wrong_type(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::WrongType {
            field: field.into(),
            expected: expected.into(),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::invalid_json(err.to_string())
    }
}

/// Errors related to configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// A process-wide facility was already set up
    #[error("{what} is already initialized")]
    AlreadyInitialized { what: String },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
