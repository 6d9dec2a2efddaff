//! Alpaca transaction dispatcher.
//!
//! Turns a [`DeviceCall`] into an HTTP exchange with an Alpaca server and the
//! reply into a [`TypedValue`](alpaca_wire::TypedValue) or a classified
//! [`DeviceError`](alpaca_core::DeviceError).
//!
//! # Example
//!
//! ```no_run
//! use alpaca_client::{DeviceCall, TransactionDispatcher};
//! use alpaca_core::{ClientConfig, DeviceType, ServerEndpoint, ServiceType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = TransactionDispatcher::new(&ClientConfig::default())?;
//! let identity = dispatcher.new_client_identity();
//! let dome = ServerEndpoint::new("192.168.1.89", 11111, ServiceType::Http);
//!
//! let azimuth: f64 = dispatcher
//!     .call_typed(&identity, &dome, DeviceCall::get(DeviceType::Dome, 0, "azimuth"))
//!     .await?;
//! println!("Dome at {azimuth}°");
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod dispatcher;
pub mod management;
pub mod metrics;

pub use call::DeviceCall;
pub use dispatcher::TransactionDispatcher;
pub use management::ManagementApi;
pub use metrics::{CallMetrics, MetricsSnapshot};
