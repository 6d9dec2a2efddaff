//! Core types shared by the wire codec, the dispatcher and the discovery engine.
//!
//! This module defines how an Alpaca server is addressed ([`ServerEndpoint`]),
//! what the management API tells us about it ([`ServerDescriptor`],
//! [`AscomDeviceDescriptor`], [`ServerInventory`]) and the small closed enums
//! used to describe a single transaction ([`HttpMethod`], [`TimeoutTier`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Path prefix of the device API.
pub const API_PATH: &str = "api";

/// Device API version used for every device operation.
pub const API_VERSION: u32 = 1;

/// Path prefix of the management API.
pub const MANAGEMENT_PATH: &str = "management";

/// Transport used to reach an Alpaca server.
///
/// Alpaca servers are plain HTTP unless configured otherwise; HTTPS is
/// supported for servers sitting behind a TLS terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl ServiceType {
    /// Returns the URL scheme for this transport.
    pub fn scheme(&self) -> &'static str {
        match self {
            ServiceType::Http => "http",
            ServiceType::Https => "https",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// One responding Alpaca server.
///
/// Two endpoints are equal when their host and port are equal; the transport
/// is carried along for URL construction but is not part of the identity.
/// This is the deduplication key used by a discovery session.
///
/// # Examples
///
/// ```
/// use alpaca_core::types::{ServerEndpoint, ServiceType};
///
/// let a = ServerEndpoint::new("192.168.1.20", 11111, ServiceType::Http);
/// let b = ServerEndpoint::new("192.168.1.20", 11111, ServiceType::Https);
/// assert_eq!(a, b);
/// assert_eq!(a.base_url(), "http://192.168.1.20:11111");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Host name or IP address literal
    pub host: String,
    /// Alpaca HTTP port
    pub port: u16,
    /// HTTP or HTTPS
    #[serde(default)]
    pub service_type: ServiceType,
}

impl ServerEndpoint {
    /// Creates a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, service_type: ServiceType) -> Self {
        Self {
            host: host.into(),
            port,
            service_type,
        }
    }

    /// Creates an endpoint from the address a discovery reply arrived from.
    pub fn from_ip(ip: IpAddr, port: u16, service_type: ServiceType) -> Self {
        Self::new(ip.to_string(), port, service_type)
    }

    /// Returns `scheme://host:port`, bracketing IPv6 literals.
    pub fn base_url(&self) -> String {
        let host = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
            _ => self.host.clone(),
        };
        format!("{}://{}:{}", self.service_type.scheme(), host, self.port)
    }

    /// Returns the socket address when the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl PartialEq for ServerEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for ServerEndpoint {}

impl Hash for ServerEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => write!(f, "[{}]:{}", v6, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// ASCOM device classes exposed through the Alpaca device API.
///
/// Parsing is case-insensitive. Names a server reports that are not part of
/// the standard set are preserved in [`DeviceType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DeviceType {
    Camera,
    CoverCalibrator,
    Dome,
    FilterWheel,
    Focuser,
    ObservingConditions,
    Rotator,
    SafetyMonitor,
    Switch,
    Telescope,
    Video,
    /// Device type not known to this client
    Other(String),
}

impl DeviceType {
    /// All standard device types.
    pub const ALL: [DeviceType; 11] = [
        DeviceType::Camera,
        DeviceType::CoverCalibrator,
        DeviceType::Dome,
        DeviceType::FilterWheel,
        DeviceType::Focuser,
        DeviceType::ObservingConditions,
        DeviceType::Rotator,
        DeviceType::SafetyMonitor,
        DeviceType::Switch,
        DeviceType::Telescope,
        DeviceType::Video,
    ];

    /// Canonical (mixed case) name as used in management API payloads.
    pub fn name(&self) -> &str {
        match self {
            DeviceType::Camera => "Camera",
            DeviceType::CoverCalibrator => "CoverCalibrator",
            DeviceType::Dome => "Dome",
            DeviceType::FilterWheel => "FilterWheel",
            DeviceType::Focuser => "Focuser",
            DeviceType::ObservingConditions => "ObservingConditions",
            DeviceType::Rotator => "Rotator",
            DeviceType::SafetyMonitor => "SafetyMonitor",
            DeviceType::Switch => "Switch",
            DeviceType::Telescope => "Telescope",
            DeviceType::Video => "Video",
            DeviceType::Other(name) => name,
        }
    }

    /// Lower-case path segment used in device API URLs.
    pub fn url_segment(&self) -> String {
        self.name().to_ascii_lowercase()
    }
}

impl FromStr for DeviceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(DeviceType::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(trimmed))
            .cloned()
            .unwrap_or_else(|| DeviceType::Other(trimmed.to_string())))
    }
}

impl From<String> for DeviceType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<DeviceType> for String {
    fn from(t: DeviceType) -> Self {
        t.name().to_string()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server metadata returned by `GET /management/v1/description`.
///
/// Servers routinely omit fields; missing values are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub endpoint: ServerEndpoint,
    pub server_name: String,
    pub manufacturer: String,
    pub manufacturer_version: String,
    pub location: String,
}

impl ServerDescriptor {
    /// Creates a descriptor with every metadata field empty.
    pub fn unnamed(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            server_name: String::new(),
            manufacturer: String::new(),
            manufacturer_version: String::new(),
            location: String::new(),
        }
    }
}

/// One device instance exposed by a server, from
/// `GET /management/v1/configureddevices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AscomDeviceDescriptor {
    pub endpoint: ServerEndpoint,
    pub device_type: DeviceType,
    pub device_number: u32,
    pub device_name: String,
    pub unique_id: String,
}

/// A server together with everything the management API reported about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInventory {
    pub descriptor: ServerDescriptor,
    /// Supported device API versions (empty if the server did not say)
    pub api_versions: Vec<u32>,
    pub devices: Vec<AscomDeviceDescriptor>,
}

impl ServerInventory {
    /// Returns the devices of the given type, or all devices.
    pub fn devices_of(&self, device_type: Option<&DeviceType>) -> Vec<AscomDeviceDescriptor> {
        self.devices
            .iter()
            .filter(|d| device_type.map_or(true, |t| &d.device_type == t))
            .cloned()
            .collect()
    }
}

/// HTTP verb of a transaction.
///
/// Property reads are `GET`; property writes and method calls are `PUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Put => write!(f, "PUT"),
        }
    }
}

/// Latency class of an operation, mapped to a duration by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutTier {
    /// First contact with a server (management calls during discovery)
    Establish,
    /// Calls that are expected to return quickly
    Standard,
    /// Calls that are expected to block, such as image downloads
    Long,
}

impl fmt::Display for TimeoutTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutTier::Establish => write!(f, "establish"),
            TimeoutTier::Standard => write!(f, "standard"),
            TimeoutTier::Long => write!(f, "long"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::Ipv6Addr;

    #[test]
    fn test_endpoint_identity_ignores_transport() {
        let mut set = HashSet::new();
        set.insert(ServerEndpoint::new("10.0.0.5", 11111, ServiceType::Http));
        set.insert(ServerEndpoint::new("10.0.0.5", 11111, ServiceType::Https));
        set.insert(ServerEndpoint::new("10.0.0.5", 11112, ServiceType::Http));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_base_url_brackets_ipv6() {
        let ep = ServerEndpoint::from_ip(
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            4567,
            ServiceType::Https,
        );
        assert_eq!(ep.base_url(), "https://[fe80::1]:4567");
        assert_eq!(ep.to_string(), "[fe80::1]:4567");
    }

    #[test]
    fn test_socket_addr_only_for_literals() {
        let ep = ServerEndpoint::new("observatory.local", 80, ServiceType::Http);
        assert!(ep.socket_addr().is_none());

        let ep = ServerEndpoint::new("127.0.0.1", 80, ServiceType::Http);
        assert_eq!(ep.socket_addr(), Some("127.0.0.1:80".parse().unwrap()));
    }

    #[test]
    fn test_device_type_parsing_is_case_insensitive() {
        assert_eq!("telescope".parse::<DeviceType>().unwrap(), DeviceType::Telescope);
        assert_eq!("FILTERWHEEL".parse::<DeviceType>().unwrap(), DeviceType::FilterWheel);
        assert_eq!(
            "Spectrograph".parse::<DeviceType>().unwrap(),
            DeviceType::Other("Spectrograph".to_string())
        );
        assert_eq!(DeviceType::CoverCalibrator.url_segment(), "covercalibrator");
    }

    #[test]
    fn test_device_type_serde_uses_canonical_name() {
        let json = serde_json::to_string(&DeviceType::SafetyMonitor).unwrap();
        assert_eq!(json, "\"SafetyMonitor\"");
        let back: DeviceType = serde_json::from_str("\"safetymonitor\"").unwrap();
        assert_eq!(back, DeviceType::SafetyMonitor);
    }

    #[test]
    fn test_inventory_filter() {
        let ep = ServerEndpoint::new("10.0.0.5", 11111, ServiceType::Http);
        let device = |t: DeviceType, n: u32| AscomDeviceDescriptor {
            endpoint: ep.clone(),
            device_type: t,
            device_number: n,
            device_name: format!("dev{}", n),
            unique_id: format!("uid-{}", n),
        };
        let inventory = ServerInventory {
            descriptor: ServerDescriptor::unnamed(ep.clone()),
            api_versions: vec![1],
            devices: vec![
                device(DeviceType::Camera, 0),
                device(DeviceType::Dome, 0),
                device(DeviceType::Camera, 1),
            ],
        };

        assert_eq!(inventory.devices_of(Some(&DeviceType::Camera)).len(), 2);
        assert_eq!(inventory.devices_of(None).len(), 3);
        assert!(inventory.devices_of(Some(&DeviceType::Focuser)).is_empty());
    }
}
