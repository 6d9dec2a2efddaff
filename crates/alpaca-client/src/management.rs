//! Management API calls.
//!
//! Read-only calls that describe a server: its metadata, the API versions it
//! speaks and the devices it exposes. All of them run on the establish tier.

use crate::call::DeviceCall;
use crate::dispatcher::TransactionDispatcher;
use alpaca_core::{
    AscomDeviceDescriptor, ClientIdentity, DecodeError, Result, ServerDescriptor, ServerEndpoint,
    ServerInventory,
};
use alpaca_wire::management::{decode_api_versions, decode_configured_devices, decode_description};
use alpaca_wire::{ApiPath, TypedValue, ValueShape};
use async_trait::async_trait;
use tracing::debug;

/// Source of server inventories.
///
/// The discovery engine aggregates through this trait; the dispatcher is
/// the production implementation.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Fetches the descriptor and device list of one server.
    async fn server_inventory(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
    ) -> Result<ServerInventory>;
}

impl TransactionDispatcher {
    /// `GET /management/apiversions`
    pub async fn api_versions(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
    ) -> Result<Vec<u32>> {
        let call = DeviceCall::management(ApiPath::ApiVersions, ValueShape::IntArray);
        match self.call(identity, endpoint, &call).await? {
            TypedValue::IntArray(values) => Ok(decode_api_versions(&values)?),
            _ => Err(DecodeError::wrong_type("Value", "array of integers").into()),
        }
    }

    /// `GET /management/v1/description`
    pub async fn description(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
    ) -> Result<ServerDescriptor> {
        let value = self.management_json(identity, endpoint, "description").await?;
        Ok(decode_description(endpoint, &value, self.casing())?)
    }

    /// `GET /management/v1/configureddevices`
    pub async fn configured_devices(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
    ) -> Result<Vec<AscomDeviceDescriptor>> {
        let value = self
            .management_json(identity, endpoint, "configureddevices")
            .await?;
        Ok(decode_configured_devices(endpoint, &value, self.casing())?)
    }

    async fn management_json(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
        operation: &str,
    ) -> Result<serde_json::Value> {
        let call = DeviceCall::management(ApiPath::management(operation), ValueShape::Json);
        match self.call(identity, endpoint, &call).await? {
            TypedValue::Json(value) => Ok(value),
            _ => Err(DecodeError::wrong_type("Value", "JSON").into()),
        }
    }
}

#[async_trait]
impl ManagementApi for TransactionDispatcher {
    /// Description and device list are fetched concurrently and both must
    /// succeed. API versions are optional; older servers do not serve them.
    async fn server_inventory(
        &self,
        identity: &ClientIdentity,
        endpoint: &ServerEndpoint,
    ) -> Result<ServerInventory> {
        let (descriptor, devices, api_versions) = tokio::join!(
            self.description(identity, endpoint),
            self.configured_devices(identity, endpoint),
            self.api_versions(identity, endpoint),
        );

        let api_versions = api_versions.unwrap_or_else(|e| {
            debug!(server = %endpoint, error = %e, "apiversions unavailable");
            Vec::new()
        });

        Ok(ServerInventory {
            descriptor: descriptor?,
            api_versions,
            devices: devices?,
        })
    }
}
