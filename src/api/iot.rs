//! IoT Hub API: hubs, devices, and routes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;
use crate::wait::HasStatus;

/// Client for the region-scoped IoT API.
#[derive(Clone, Debug)]
pub struct IotApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// An IoT hub.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Hub {
    /// Hub identifier.
    pub id: String,
    /// Hub name.
    pub name: String,
    /// Lifecycle status (`ready`, `enabling`, `error`, ...).
    pub status: String,
    /// Billing plan.
    #[serde(default)]
    pub product_plan: String,
    /// Whether the hub accepts connections.
    #[serde(default)]
    pub enabled: bool,
    /// MQTT endpoint hostname.
    #[serde(default)]
    pub endpoint: String,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for Hub {
    fn status(&self) -> &str {
        &self.status
    }
}

/// A device registered on a hub.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Device {
    /// Device identifier.
    pub id: String,
    /// Device name; unique within the hub.
    pub name: String,
    /// Hub the device belongs to.
    pub hub_id: String,
    /// Connection status (`connected`, `disconnected`, `error`).
    #[serde(default)]
    pub status: String,
    /// Whether plaintext connections are allowed.
    #[serde(default)]
    pub allow_insecure: bool,
    /// Message filters applied by the hub.
    #[serde(default)]
    pub description: String,
}

impl HasStatus for Device {
    fn status(&self) -> &str {
        &self.status
    }
}

/// A message route attached to a hub.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Route {
    /// Route identifier.
    pub id: String,
    /// Route name.
    pub name: String,
    /// Hub the route belongs to.
    pub hub_id: String,
    /// Topic filter the route subscribes to.
    #[serde(default)]
    pub topic: String,
    /// Destination kind (`s3`, `database`, `rest`).
    #[serde(rename = "type", default)]
    pub route_type: String,
}

#[derive(Deserialize)]
struct HubEnvelope {
    hub: Hub,
}

#[derive(Deserialize)]
struct DeviceEnvelope {
    device: Device,
}

#[derive(Deserialize)]
struct RouteEnvelope {
    route: Route,
}

impl IotApi {
    /// Builds a client for the given region.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    fn base(&self) -> String {
        format!("/iot/v1/regions/{}", self.region)
    }

    /// Creates a hub.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_hub(&self, body: &serde_json::Value) -> Result<Hub, ApiError> {
        let envelope: HubEnvelope = self
            .client
            .post(&format!("{}/hubs", self.base()), body)
            .await?;
        Ok(envelope.hub)
    }

    /// Fetches one hub.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the hub is gone.
    pub async fn get_hub(&self, id: &str) -> Result<Hub, ApiError> {
        let envelope: HubEnvelope = self
            .client
            .get(&format!("{}/hubs/{id}", self.base()), &[])
            .await?;
        Ok(envelope.hub)
    }

    /// Patches a hub.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_hub(&self, id: &str, body: &serde_json::Value) -> Result<Hub, ApiError> {
        let envelope: HubEnvelope = self
            .client
            .patch(&format!("{}/hubs/{id}", self.base()), body)
            .await?;
        Ok(envelope.hub)
    }

    /// Deletes a hub.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_hub(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&format!("{}/hubs/{id}", self.base())).await
    }

    /// Registers a device on a hub.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_device(&self, body: &serde_json::Value) -> Result<Device, ApiError> {
        let envelope: DeviceEnvelope = self
            .client
            .post(&format!("{}/devices", self.base()), body)
            .await?;
        Ok(envelope.device)
    }

    /// Fetches one device.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the device is gone.
    pub async fn get_device(&self, id: &str) -> Result<Device, ApiError> {
        let envelope: DeviceEnvelope = self
            .client
            .get(&format!("{}/devices/{id}", self.base()), &[])
            .await?;
        Ok(envelope.device)
    }

    /// Patches a device.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_device(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<Device, ApiError> {
        let envelope: DeviceEnvelope = self
            .client
            .patch(&format!("{}/devices/{id}", self.base()), body)
            .await?;
        Ok(envelope.device)
    }

    /// Removes a device.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_device(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/devices/{id}", self.base()))
            .await
    }

    /// Creates a route.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_route(&self, body: &serde_json::Value) -> Result<Route, ApiError> {
        let envelope: RouteEnvelope = self
            .client
            .post(&format!("{}/routes", self.base()), body)
            .await?;
        Ok(envelope.route)
    }

    /// Fetches one route.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the route is gone.
    pub async fn get_route(&self, id: &str) -> Result<Route, ApiError> {
        let envelope: RouteEnvelope = self
            .client
            .get(&format!("{}/routes/{id}", self.base()), &[])
            .await?;
        Ok(envelope.route)
    }

    /// Patches a route.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_route(&self, id: &str, body: &serde_json::Value) -> Result<Route, ApiError> {
        let envelope: RouteEnvelope = self
            .client
            .patch(&format!("{}/routes/{id}", self.base()), body)
            .await?;
        Ok(envelope.route)
    }

    /// Removes a route.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_route(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/routes/{id}", self.base()))
            .await
    }
}
