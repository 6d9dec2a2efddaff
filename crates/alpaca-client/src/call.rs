//! Description of a single operation handed to the dispatcher.

use alpaca_core::{DeviceType, HttpMethod, TimeoutTier};
use alpaca_wire::{ApiPath, ValueShape};

/// Parameter name used by indexed accessors.
pub const INDEX_PARAMETER: &str = "Id";

/// An operation to dispatch: where it goes, how, and what comes back.
///
/// # Examples
///
/// ```
/// use alpaca_client::DeviceCall;
/// use alpaca_core::{DeviceType, TimeoutTier};
/// use alpaca_wire::ValueShape;
///
/// // GET /api/v1/switch/0/getswitchvalue?Id=2
/// let read = DeviceCall::get(DeviceType::Switch, 0, "getswitchvalue")
///     .indexed(2)
///     .shape(ValueShape::Double);
///
/// // PUT /api/v1/dome/0/slewtoazimuth with Azimuth=183.5, long timeout
/// let slew = DeviceCall::put(DeviceType::Dome, 0, "slewtoazimuth")
///     .param("Azimuth", 183.5)
///     .tier(TimeoutTier::Long);
/// # let _ = (read, slew);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCall {
    pub path: ApiPath,
    pub method: HttpMethod,
    pub parameters: Vec<(String, String)>,
    pub tier: TimeoutTier,
    pub shape: ValueShape,
}

impl DeviceCall {
    /// A property read. Defaults: standard tier, raw JSON value.
    pub fn get(device_type: DeviceType, device_number: u32, operation: impl Into<String>) -> Self {
        Self::new(
            ApiPath::device(device_type, device_number, operation),
            HttpMethod::Get,
            ValueShape::Json,
        )
    }

    /// A property write or method call. Defaults: standard tier, no value.
    pub fn put(device_type: DeviceType, device_number: u32, operation: impl Into<String>) -> Self {
        Self::new(
            ApiPath::device(device_type, device_number, operation),
            HttpMethod::Put,
            ValueShape::None,
        )
    }

    /// A management API read, on the establish tier.
    pub fn management(path: ApiPath, shape: ValueShape) -> Self {
        Self::new(path, HttpMethod::Get, shape).tier(TimeoutTier::Establish)
    }

    fn new(path: ApiPath, method: HttpMethod, shape: ValueShape) -> Self {
        Self {
            path,
            method,
            parameters: Vec::new(),
            tier: TimeoutTier::Standard,
            shape,
        }
    }

    /// Adds an operation parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.push((name.into(), value.to_string()));
        self
    }

    /// Adds the `Id` parameter of an indexed accessor.
    pub fn indexed(self, index: u32) -> Self {
        self.param(INDEX_PARAMETER, index)
    }

    pub fn tier(mut self, tier: TimeoutTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn shape(mut self, shape: ValueShape) -> Self {
        self.shape = shape;
        self
    }

    /// Operation name for logs.
    pub fn operation(&self) -> &str {
        self.path.operation()
    }
}
