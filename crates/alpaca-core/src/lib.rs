//! # Alpaca Core
//!
//! Core types, error handling, and configuration shared by the Alpaca
//! client crates.
//!
//! - **Types**: server endpoints, device descriptors, HTTP methods and
//!   timeout tiers.
//! - **Errors**: the [`DeviceError`] taxonomy returned by every transaction,
//!   plus the table-driven [`ErrorClassifier`] for server error numbers.
//! - **Counters**: atomic client-id and transaction-id sequences.
//! - **Configuration**: YAML / environment backed settings with validation.
//!
//! ## Example
//!
//! ```
//! use alpaca_core::{ClientIdentity, SequenceCounter, ServerEndpoint, ServiceType};
//!
//! let client_ids = SequenceCounter::new();
//! let identity = ClientIdentity::allocate(&client_ids);
//! assert_eq!(identity.next_transaction_id(), 1);
//!
//! let server = ServerEndpoint::new("192.168.1.89", 7843, ServiceType::Http);
//! assert_eq!(server.base_url(), "http://192.168.1.89:7843");
//! ```

pub mod classify;
pub mod config;
pub mod counter;
pub mod error;
pub mod types;

pub use classify::ErrorClassifier;
pub use config::{AlpacaConfig, ClientConfig, DiscoveryConfig, LoggingConfig, TimeoutTiers};
pub use counter::{ClientIdentity, SequenceCounter};
pub use error::{
    CommunicationError, ConfigError, DecodeError, DeviceError, ProtocolError, ProtocolErrorKind,
    Result,
};
pub use types::{
    AscomDeviceDescriptor, DeviceType, HttpMethod, ServerDescriptor, ServerEndpoint,
    ServerInventory, ServiceType, TimeoutTier,
};
