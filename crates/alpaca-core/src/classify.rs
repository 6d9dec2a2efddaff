//! Table-driven classification of Alpaca `ErrorNumber` values.
//!
//! `0` is success. Reserved codes map to specific [`ProtocolErrorKind`]s,
//! a set of ranges maps to kinds as a whole, and anything left over is a
//! [`ProtocolErrorKind::DriverError`]. New codes or ranges are added to the
//! table, never to call sites.

use crate::error::{ProtocolError, ProtocolErrorKind};
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// ASCOM reserved error numbers.
pub mod codes {
    pub const NOT_IMPLEMENTED: i32 = 0x400;
    pub const INVALID_VALUE: i32 = 0x401;
    pub const VALUE_NOT_SET: i32 = 0x402;
    pub const NOT_CONNECTED: i32 = 0x407;
    pub const INVALID_WHILE_PARKED: i32 = 0x408;
    pub const INVALID_WHILE_SLAVED: i32 = 0x409;
    pub const INVALID_OPERATION: i32 = 0x40B;
    pub const ACTION_NOT_IMPLEMENTED: i32 = 0x40C;
    pub const OPERATION_CANCELLED: i32 = 0x40E;
    pub const UNSPECIFIED_ERROR: i32 = 0x4FF;
    pub const DRIVER_BASE: i32 = 0x500;
    pub const DRIVER_MAX: i32 = 0xFFF;
}

/// Maps `ErrorNumber` values to [`ProtocolErrorKind`]s.
///
/// Exact codes take precedence over ranges; ranges are checked in the order
/// they were added.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    exact: HashMap<i32, ProtocolErrorKind>,
    ranges: Vec<(RangeInclusive<i32>, ProtocolErrorKind)>,
    fallback: ProtocolErrorKind,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::ascom()
    }
}

impl ErrorClassifier {
    /// An empty table in which every non-zero code is a driver error.
    pub fn empty() -> Self {
        Self {
            exact: HashMap::new(),
            ranges: Vec::new(),
            fallback: ProtocolErrorKind::DriverError,
        }
    }

    /// The standard ASCOM table.
    pub fn ascom() -> Self {
        Self::empty()
            .with_code(codes::NOT_IMPLEMENTED, ProtocolErrorKind::NotImplemented)
            .with_code(codes::INVALID_VALUE, ProtocolErrorKind::InvalidValue)
            .with_code(codes::VALUE_NOT_SET, ProtocolErrorKind::ValueNotSet)
            .with_code(codes::NOT_CONNECTED, ProtocolErrorKind::NotConnected)
            .with_code(codes::INVALID_WHILE_PARKED, ProtocolErrorKind::InvalidWhileParked)
            .with_code(codes::INVALID_WHILE_SLAVED, ProtocolErrorKind::InvalidWhileSlaved)
            .with_code(codes::INVALID_OPERATION, ProtocolErrorKind::InvalidOperation)
            .with_code(codes::ACTION_NOT_IMPLEMENTED, ProtocolErrorKind::ActionNotImplemented)
            .with_code(codes::OPERATION_CANCELLED, ProtocolErrorKind::OperationCancelled)
            .with_range(
                codes::DRIVER_BASE..=codes::DRIVER_MAX,
                ProtocolErrorKind::DriverError,
            )
    }

    /// Adds or replaces a single code.
    pub fn with_code(mut self, code: i32, kind: ProtocolErrorKind) -> Self {
        self.exact.insert(code, kind);
        self
    }

    /// Adds a range of codes.
    pub fn with_range(mut self, range: RangeInclusive<i32>, kind: ProtocolErrorKind) -> Self {
        self.ranges.push((range, kind));
        self
    }

    /// Returns the kind for a non-zero error number.
    pub fn kind_of(&self, error_number: i32) -> ProtocolErrorKind {
        if let Some(kind) = self.exact.get(&error_number) {
            return *kind;
        }
        self.ranges
            .iter()
            .find(|(range, _)| range.contains(&error_number))
            .map(|(_, kind)| *kind)
            .unwrap_or(self.fallback)
    }

    /// Classifies an error envelope; `None` when `error_number` is zero.
    pub fn classify(&self, error_number: i32, message: impl Into<String>) -> Option<ProtocolError> {
        if error_number == 0 {
            return None;
        }
        Some(ProtocolError {
            kind: self.kind_of(error_number),
            error_number,
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_success() {
        assert!(ErrorClassifier::ascom().classify(0, "").is_none());
    }

    #[test]
    fn test_reserved_codes() {
        let table = ErrorClassifier::ascom();
        assert_eq!(table.kind_of(0x400), ProtocolErrorKind::NotImplemented);
        assert_eq!(table.kind_of(0x401), ProtocolErrorKind::InvalidValue);
        assert_eq!(table.kind_of(0x402), ProtocolErrorKind::ValueNotSet);
        assert_eq!(table.kind_of(0x407), ProtocolErrorKind::NotConnected);
        assert_eq!(table.kind_of(0x40B), ProtocolErrorKind::InvalidOperation);
        assert_eq!(table.kind_of(0x40C), ProtocolErrorKind::ActionNotImplemented);
    }

    #[test]
    fn test_driver_range_and_outliers_are_driver_errors() {
        let table = ErrorClassifier::ascom();
        let err = table.classify(0x555, "Filter wheel stuck").unwrap();
        assert_eq!(err.kind, ProtocolErrorKind::DriverError);
        assert_eq!(err.message, "Filter wheel stuck");

        assert_eq!(table.kind_of(0x403), ProtocolErrorKind::DriverError);
        assert_eq!(table.kind_of(-1), ProtocolErrorKind::DriverError);
        assert_eq!(table.kind_of(0x1_0000), ProtocolErrorKind::DriverError);
    }

    #[test]
    fn test_table_is_extensible() {
        let table = ErrorClassifier::ascom()
            .with_range(0x2000..=0x20FF, ProtocolErrorKind::InvalidOperation)
            .with_code(0x555, ProtocolErrorKind::NotConnected);

        assert_eq!(table.kind_of(0x2010), ProtocolErrorKind::InvalidOperation);
        assert_eq!(table.kind_of(0x555), ProtocolErrorKind::NotConnected);
        assert_eq!(table.kind_of(0x556), ProtocolErrorKind::DriverError);
    }

    #[test]
    fn test_empty_table_treats_reserved_codes_as_driver_errors() {
        let table = ErrorClassifier::empty();
        assert_eq!(table.kind_of(0x401), ProtocolErrorKind::DriverError);
    }
}
