//! Discovery probe payloads.
//!
//! A client broadcasts the ASCII token `alpacadiscovery1` to UDP port 32227.
//! Every Alpaca server that hears it answers the sender with a JSON object
//! carrying at least `AlpacaPort`, the TCP port of its HTTP API.

use crate::keys::{json_kind, FieldLookup, KeyCasing};
use alpaca_core::DecodeError;
use bytes::Bytes;
use serde_json::Value;
use std::net::Ipv6Addr;

/// Probe token, protocol version 1.
pub const PROBE_TOKEN: &[u8] = b"alpacadiscovery1";

/// Well-known discovery port.
pub const DISCOVERY_PORT: u16 = alpaca_core::config::DEFAULT_DISCOVERY_PORT;

/// IPv6 multicast group Alpaca servers listen on.
pub const ALPACA_MULTICAST_V6: Ipv6Addr = Ipv6Addr::new(0xff12, 0, 0, 0, 0, 0, 0xa1, 0x9aca);

const ALPACA_PORT_FIELD: &str = "AlpacaPort";

/// Decoded reply to a discovery probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeResponse {
    pub alpaca_port: u16,
}

/// Returns the probe datagram.
pub fn encode_probe() -> Bytes {
    Bytes::from_static(PROBE_TOKEN)
}

/// Returns true if `data` is a probe this codec understands.
///
/// Servers only check the `alpacadiscovery` prefix and ignore the version
/// digit, so this does the same.
pub fn is_probe(data: &[u8]) -> bool {
    data.starts_with(&PROBE_TOKEN[..PROBE_TOKEN.len() - 1])
}

/// Parses a probe reply.
///
/// Arbitrary traffic arrives on the discovery port, so every failure is an
/// ordinary `Err`; callers drop the datagram.
pub fn decode_probe_response(data: &[u8]) -> Result<ProbeResponse, DecodeError> {
    let value: Value = serde_json::from_slice(data)?;
    let lookup = FieldLookup::new(&value, KeyCasing::Tolerant)?;
    let port = lookup.require(ALPACA_PORT_FIELD)?;

    let Some(n) = port.as_i64() else {
        return Err(DecodeError::WrongType {
            field: ALPACA_PORT_FIELD.to_string(),
            expected: format!("integer, got {}", json_kind(port)),
        });
    };

    match u16::try_from(n) {
        Ok(alpaca_port) if alpaca_port != 0 => Ok(ProbeResponse { alpaca_port }),
        _ => Err(DecodeError::OutOfRange {
            field: ALPACA_PORT_FIELD.to_string(),
            value: n.to_string(),
        }),
    }
}

/// Builds the reply a server sends for `alpaca_port`.
pub fn encode_probe_response(alpaca_port: u16) -> Bytes {
    Bytes::from(format!("{{\"{}\":{}}}", ALPACA_PORT_FIELD, alpaca_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_token() {
        assert_eq!(&encode_probe()[..], b"alpacadiscovery1");
        assert!(is_probe(b"alpacadiscovery1"));
        assert!(is_probe(b"alpacadiscovery2"));
        assert!(!is_probe(b"hello"));
    }

    #[test]
    fn test_decode_reply() {
        let reply = decode_probe_response(br#"{"AlpacaPort": 11111}"#).unwrap();
        assert_eq!(reply.alpaca_port, 11111);

        let reply = decode_probe_response(&encode_probe_response(4567)).unwrap();
        assert_eq!(reply.alpaca_port, 4567);
    }

    #[test]
    fn test_decode_tolerates_casing_and_extra_fields() {
        let reply = decode_probe_response(br#"{"alpacaport": 80, "ServerName": "dome"}"#).unwrap();
        assert_eq!(reply.alpaca_port, 80);
    }

    #[test]
    fn test_malformed_replies_are_errors() {
        assert!(matches!(
            decode_probe_response(b"\x00\x01garbage"),
            Err(DecodeError::InvalidJson { .. })
        ));
        assert!(matches!(
            decode_probe_response(b"[11111]"),
            Err(DecodeError::NotAnObject { .. })
        ));
        assert!(matches!(
            decode_probe_response(br#"{"Port": 11111}"#),
            Err(DecodeError::MissingField { .. })
        ));
        assert!(matches!(
            decode_probe_response(br#"{"AlpacaPort": "11111"}"#),
            Err(DecodeError::WrongType { .. })
        ));
    }

    #[test]
    fn test_port_range() {
        for bad in ["0", "-5", "65536"] {
            let body = format!("{{\"AlpacaPort\": {}}}", bad);
            assert!(
                matches!(
                    decode_probe_response(body.as_bytes()),
                    Err(DecodeError::OutOfRange { .. })
                ),
                "port {} accepted",
                bad
            );
        }
        assert_eq!(
            decode_probe_response(br#"{"AlpacaPort": 65535}"#).unwrap().alpaca_port,
            65535
        );
    }

    #[test]
    fn test_multicast_group() {
        assert_eq!(ALPACA_MULTICAST_V6.to_string(), "ff12::a1:9aca");
        assert!(ALPACA_MULTICAST_V6.is_multicast());
    }
}
