//! # Alpaca Discovery
//!
//! Finds Alpaca servers on the local network by UDP broadcast (IPv4) and
//! multicast (IPv6), then inventories each responder through the management
//! API.
//!
//! A [`DiscoverySession`] is shared between the engine and its callers.
//! Results can be read while the session is still running; once it reaches
//! [`DiscoveryState::Complete`] they no longer change.
//!
//! ## Example
//!
//! ```no_run
//! use alpaca_client::TransactionDispatcher;
//! use alpaca_core::{ClientConfig, DeviceType, DiscoveryConfig};
//! use alpaca_discovery::AlpacaDiscovery;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = TransactionDispatcher::new(&ClientConfig::default())?;
//! let discovery = AlpacaDiscovery::new(DiscoveryConfig::default(), dispatcher)?;
//!
//! let session = discovery.discover().await?;
//! for camera in session.get_devices(Some(&DeviceType::Camera)) {
//!     println!("{} #{} on {}", camera.device_name, camera.device_number, camera.endpoint);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod interfaces;
pub mod service;
pub mod session;

pub use alpaca_core::DiscoveryConfig;
pub use error::{DiscoveryError, Result};
pub use interfaces::{broadcast_address, probe_targets, ProbeTarget};
pub use service::AlpacaDiscovery;
pub use session::{DiscoverySession, DiscoveryState, ServerFailure, SessionSnapshot};
