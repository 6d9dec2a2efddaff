//! # alpaca-net
//!
//! Network client for Alpaca astronomy device servers.
//!
//! This crate re-exports the workspace crates and offers the small surface
//! device proxies build on:
//!
//! - [`dispatch`] sends one device or management call through a
//!   [`TransactionDispatcher`].
//! - [`discover`] runs a discovery session and [`get_devices`] reads its
//!   results.
//! - [`discover_devices`] does both from an [`AlpacaConfig`].
//! - [`init_logging`] installs the `tracing` subscriber.
//!
//! ## Example
//!
//! ```no_run
//! use alpaca_net::{discover_devices, dispatch, AlpacaConfig, DeviceCall, DeviceType,
//!                  TransactionDispatcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AlpacaConfig::default();
//! let domes = discover_devices(&config, Some(DeviceType::Dome)).await?;
//!
//! let dispatcher = TransactionDispatcher::new(&config.client)?;
//! let identity = dispatcher.new_client_identity();
//! for dome in &domes {
//!     let call = DeviceCall::get(DeviceType::Dome, dome.device_number, "shutterstatus");
//!     let status = dispatch(&dispatcher, &identity, &dome.endpoint, &call).await?;
//!     println!("{}: {:?}", dome.device_name, status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod logging;

pub use alpaca_client::{
    CallMetrics, DeviceCall, ManagementApi, MetricsSnapshot, TransactionDispatcher,
};
pub use alpaca_core::{
    AlpacaConfig, AscomDeviceDescriptor, ClientConfig, ClientIdentity, CommunicationError,
    ConfigError, DecodeError, DeviceError, DeviceType, DiscoveryConfig, ErrorClassifier,
    HttpMethod, LoggingConfig, ProtocolError, ProtocolErrorKind, SequenceCounter,
    ServerDescriptor, ServerEndpoint, ServerInventory, ServiceType, TimeoutTier, TimeoutTiers,
};
pub use alpaca_discovery::{
    probe_targets, AlpacaDiscovery, DiscoveryError, DiscoverySession, DiscoveryState, ProbeTarget,
    ServerFailure, SessionSnapshot,
};
pub use alpaca_wire::{FromTypedValue, KeyCasing, TypedValue, ValueShape};
pub use logging::init_logging;

/// Sends one call and returns its decoded value.
pub async fn dispatch(
    dispatcher: &TransactionDispatcher,
    identity: &ClientIdentity,
    endpoint: &ServerEndpoint,
    call: &DeviceCall,
) -> Result<TypedValue, DeviceError> {
    dispatcher.call(identity, endpoint, call).await
}

/// Runs a discovery session to completion.
pub async fn discover(
    config: DiscoveryConfig,
    dispatcher: TransactionDispatcher,
) -> Result<DiscoverySession, DiscoveryError> {
    AlpacaDiscovery::new(config, dispatcher)?.discover().await
}

/// Devices aggregated so far, optionally of one type.
///
/// Safe to call while the session is still running.
pub fn get_devices(
    session: &DiscoverySession,
    device_type: Option<&DeviceType>,
) -> Vec<AscomDeviceDescriptor> {
    session.get_devices(device_type)
}

/// Discovers servers and returns their devices of `device_type` (all types
/// when `None`).
pub async fn discover_devices(
    config: &AlpacaConfig,
    device_type: Option<DeviceType>,
) -> Result<Vec<AscomDeviceDescriptor>, DiscoveryError> {
    let dispatcher = TransactionDispatcher::new(&config.client)?;
    let session = discover(config.discovery.clone(), dispatcher).await?;
    Ok(session.get_devices(device_type.as_ref()))
}
