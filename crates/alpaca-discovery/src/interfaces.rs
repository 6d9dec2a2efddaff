//! Probe target selection.
//!
//! Each [`ProbeTarget`] pairs a local bind address with the destination a
//! probe is sent to: the broadcast address of an IPv4 interface, the Alpaca
//! multicast group on an IPv6 interface, or a configured extra target.

use crate::error::Result;
use alpaca_core::DiscoveryConfig;
use alpaca_wire::ALPACA_MULTICAST_V6;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// One socket's worth of probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    /// Interface name, or `"configured"` for extra targets
    pub interface: String,
    /// Local address the socket binds to (port 0)
    pub bind: SocketAddr,
    /// Where probes are sent
    pub destination: SocketAddr,
}

impl ProbeTarget {
    /// IPv6 interface index to send multicast on, if any.
    pub fn multicast_scope(&self) -> Option<u32> {
        match self.destination {
            SocketAddr::V6(dest) if dest.ip().is_multicast() => Some(dest.scope_id()),
            _ => None,
        }
    }
}

/// Directed broadcast address of `address` under `netmask`.
pub fn broadcast_address(address: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(address) | !u32::from(netmask))
}

/// Lists the probe targets for `config`.
///
/// Interfaces come first, followed by `extra_targets`. With `targets_only`
/// the interfaces are skipped entirely.
pub fn probe_targets(config: &DiscoveryConfig) -> Result<Vec<ProbeTarget>> {
    let mut targets = if config.targets_only {
        Vec::new()
    } else {
        platform::interface_targets(config)?
    };

    for ip in &config.extra_targets {
        let bind = match ip {
            IpAddr::V4(_) if config.use_ipv4 => {
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            }
            IpAddr::V6(_) if config.use_ipv6 => {
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0))
            }
            _ => continue,
        };
        targets.push(ProbeTarget {
            interface: "configured".to_string(),
            bind,
            destination: SocketAddr::new(*ip, config.discovery_port),
        });
    }

    let mut seen = HashSet::new();
    targets.retain(|t| seen.insert((t.bind, t.destination)));
    Ok(targets)
}

fn ipv4_target(interface: &str, address: Ipv4Addr, destination: Ipv4Addr, port: u16) -> ProbeTarget {
    ProbeTarget {
        interface: interface.to_string(),
        bind: SocketAddr::V4(SocketAddrV4::new(address, 0)),
        destination: SocketAddr::V4(SocketAddrV4::new(destination, port)),
    }
}

fn ipv6_target(interface: &str, address: Ipv6Addr, scope_id: u32, port: u16) -> ProbeTarget {
    ProbeTarget {
        interface: interface.to_string(),
        bind: SocketAddr::V6(SocketAddrV6::new(address, 0, 0, scope_id)),
        destination: SocketAddr::V6(SocketAddrV6::new(ALPACA_MULTICAST_V6, port, 0, scope_id)),
    }
}

#[cfg(unix)]
mod platform {
    use super::{broadcast_address, ipv4_target, ipv6_target, ProbeTarget};
    use crate::error::{DiscoveryError, Result};
    use alpaca_core::DiscoveryConfig;
    use nix::net::if_::InterfaceFlags;
    use std::collections::HashSet;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tracing::debug;

    pub(super) fn interface_targets(config: &DiscoveryConfig) -> Result<Vec<ProbeTarget>> {
        let addrs = nix::ifaddrs::getifaddrs()
            .map_err(|e| DiscoveryError::InterfaceEnumeration(e.to_string()))?;

        let mut targets = Vec::new();
        let mut ipv6_interfaces = HashSet::new();

        for ia in addrs {
            let up = ia.flags.contains(InterfaceFlags::IFF_UP);
            let loopback = ia.flags.contains(InterfaceFlags::IFF_LOOPBACK);
            if !up || (loopback && !config.include_loopback) {
                continue;
            }
            let Some(address) = ia.address.as_ref() else {
                continue;
            };

            if let Some(sin) = address.as_sockaddr_in() {
                if !config.use_ipv4 {
                    continue;
                }
                let ip = Ipv4Addr::from(sin.ip());
                let destination = if loopback {
                    ip
                } else if let Some(b) = ia.broadcast.as_ref().and_then(|b| b.as_sockaddr_in()) {
                    Ipv4Addr::from(b.ip())
                } else if let Some(m) = ia.netmask.as_ref().and_then(|m| m.as_sockaddr_in()) {
                    broadcast_address(ip, Ipv4Addr::from(m.ip()))
                } else {
                    Ipv4Addr::BROADCAST
                };
                debug!(interface = %ia.interface_name, address = %ip, broadcast = %destination, "IPv4 probe target");
                targets.push(ipv4_target(&ia.interface_name, ip, destination, config.discovery_port));
            } else if let Some(sin6) = address.as_sockaddr_in6() {
                if !config.use_ipv6 || !ia.flags.contains(InterfaceFlags::IFF_MULTICAST) {
                    continue;
                }
                // One multicast socket per interface is enough.
                if !ipv6_interfaces.insert(ia.interface_name.clone()) {
                    continue;
                }
                let ip: Ipv6Addr = sin6.ip();
                let scope_id = nix::net::if_::if_nametoindex(ia.interface_name.as_str()).unwrap_or(0);
                debug!(interface = %ia.interface_name, address = %ip, scope_id, "IPv6 probe target");
                targets.push(ipv6_target(&ia.interface_name, ip, scope_id, config.discovery_port));
            }
        }

        Ok(targets)
    }
}

#[cfg(not(unix))]
mod platform {
    use super::{ipv4_target, ProbeTarget};
    use crate::error::Result;
    use alpaca_core::DiscoveryConfig;
    use std::net::Ipv4Addr;

    /// Without interface enumeration, probe the limited broadcast address.
    pub(super) fn interface_targets(config: &DiscoveryConfig) -> Result<Vec<ProbeTarget>> {
        if !config.use_ipv4 {
            return Ok(Vec::new());
        }
        Ok(vec![ipv4_target(
            "any",
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            config.discovery_port,
        )])
    }
}
