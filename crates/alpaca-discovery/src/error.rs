//! Error types for the discovery engine

use alpaca_core::ConfigError;
use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Failures that prevent a discovery session from starting.
///
/// Problems with individual datagrams or servers never surface here; they
/// are dropped or recorded in the session.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid discovery configuration
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A probe socket could not be created or bound
    #[error("Failed to set up socket on {address}: {reason}")]
    SocketSetup { address: String, reason: String },

    /// Network interfaces could not be listed
    #[error("Failed to enumerate network interfaces: {0}")]
    InterfaceEnumeration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
