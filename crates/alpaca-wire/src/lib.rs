//! Wire codec for the Alpaca protocol.
//!
//! Pure and stateless: nothing in this crate touches a socket.
//!
//! # Features
//!
//! - Discovery probe encoding and reply decoding
//! - Request encoding (query string for `GET`, form body for `PUT`)
//! - Response envelope decoding with tolerant or strict key casing
//! - Management API payload decoding
//!
//! # Example
//!
//! ```rust
//! use alpaca_wire::{decode_probe_response, decode_response, KeyCasing, TypedValue, ValueShape};
//!
//! let reply = decode_probe_response(br#"{"AlpacaPort": 11111}"#).unwrap();
//! assert_eq!(reply.alpaca_port, 11111);
//!
//! let body = br#"{"Value": 42.5, "ClientTransactionID": 1, "ErrorNumber": 0, "ErrorMessage": ""}"#;
//! let resp = decode_response(body, ValueShape::Double, KeyCasing::Tolerant).unwrap();
//! assert_eq!(resp.into_result(), Ok(TypedValue::Double(42.5)));
//! ```

pub mod keys;
pub mod management;
pub mod probe;
pub mod request;
pub mod response;

pub use keys::{normalize_key, FieldLookup, KeyCasing};
pub use probe::{
    decode_probe_response, encode_probe, encode_probe_response, is_probe, ProbeResponse,
    ALPACA_MULTICAST_V6, DISCOVERY_PORT,
};
pub use request::{encode_request, ApiPath, HttpRequest, Transaction};
pub use response::{
    decode_response, DecodedResponse, ErrorEnvelope, FromTypedValue, TypedValue, ValueShape,
};
