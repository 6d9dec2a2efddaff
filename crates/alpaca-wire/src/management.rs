//! Management API payloads.
//!
//! These decode the `Value` of `/management/v1/description`,
//! `/management/v1/configureddevices` and `/management/apiversions` once the
//! envelope has been handled by [`crate::response::decode_response`].

use crate::keys::{as_u32, FieldLookup, KeyCasing};
use alpaca_core::{AscomDeviceDescriptor, DecodeError, DeviceType, ServerDescriptor, ServerEndpoint};
use serde_json::Value;

/// Decodes a server description. Every field is optional.
pub fn decode_description(
    endpoint: &ServerEndpoint,
    value: &Value,
    casing: KeyCasing,
) -> Result<ServerDescriptor, DecodeError> {
    let lookup = FieldLookup::new(value, casing)?;
    Ok(ServerDescriptor {
        endpoint: endpoint.clone(),
        server_name: lookup.string_or_empty("ServerName")?,
        manufacturer: lookup.string_or_empty("Manufacturer")?,
        manufacturer_version: lookup.string_or_empty("ManufacturerVersion")?,
        location: lookup.string_or_empty("Location")?,
    })
}

/// Decodes the configured device list.
///
/// `DeviceType` and `DeviceNumber` are required for each entry; unknown
/// device type names are kept as [`DeviceType::Other`].
pub fn decode_configured_devices(
    endpoint: &ServerEndpoint,
    value: &Value,
    casing: KeyCasing,
) -> Result<Vec<AscomDeviceDescriptor>, DecodeError> {
    let entries = value
        .as_array()
        .ok_or_else(|| DecodeError::wrong_type("Value", "array of devices"))?;

    entries
        .iter()
        .map(|entry| {
            let lookup = FieldLookup::new(entry, casing)?;
            let device_type = lookup
                .require("DeviceType")?
                .as_str()
                .ok_or_else(|| DecodeError::wrong_type("DeviceType", "string"))?;
            Ok(AscomDeviceDescriptor {
                endpoint: endpoint.clone(),
                device_type: DeviceType::from(device_type.to_string()),
                device_number: as_u32("DeviceNumber", lookup.require("DeviceNumber")?)?,
                device_name: lookup.string_or_empty("DeviceName")?,
                unique_id: lookup.string_or_empty("UniqueID")?,
            })
        })
        .collect()
}

/// Decodes the supported API versions.
pub fn decode_api_versions(values: &[i64]) -> Result<Vec<u32>, DecodeError> {
    values
        .iter()
        .map(|&v| {
            u32::try_from(v).map_err(|_| DecodeError::OutOfRange {
                field: "Value".to_string(),
                value: v.to_string(),
            })
        })
        .collect()
}
