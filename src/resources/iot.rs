//! IoT Hub controllers: hubs, devices, and message routes.
//!
//! Hubs transition through `enabling`/`disabling` states after writes, so
//! hub operations wait for the hub to settle before snapshotting. Devices
//! and routes apply immediately.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::api::iot::{Device, Hub, IotApi, Route};
use crate::api::ApiError;
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, expand_last_uuid, Region};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::{region_scope, validation};

const HUB_FAILED: [&str; 1] = ["error"];

fn hub_target(enabled: bool) -> [&'static str; 1] {
    if enabled { ["ready"] } else { ["disabled"] }
}

fn hub_observation(result: Result<Hub, ApiError>) -> Result<Observation<Hub>, ApiError> {
    match result {
        Ok(hub) => Ok(Observation::Present(hub)),
        Err(err) if err.is_gone(false) => Ok(Observation::Gone),
        Err(err) => Err(err),
    }
}

/// Declared configuration for an IoT hub.
#[derive(Clone, Debug)]
pub struct IotHubConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Project override.
    pub project_id: Option<String>,
    /// Hub name.
    pub name: String,
    /// Billing plan; immutable.
    pub product_plan: String,
    /// Whether the hub accepts connections.
    pub enabled: bool,
}

impl Default for IotHubConfig {
    fn default() -> Self {
        Self {
            region: None,
            project_id: None,
            name: String::new(),
            product_plan: String::from("plan_shared"),
            enabled: true,
        }
    }
}

/// State snapshot for an IoT hub.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IotHubSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Hub name.
    pub name: String,
    /// Lifecycle status.
    pub status: String,
    /// Billing plan.
    pub product_plan: String,
    /// Whether the hub accepts connections.
    pub enabled: bool,
    /// MQTT endpoint hostname.
    pub endpoint: String,
    /// Owning project.
    pub project_id: String,
}

fn hub_snapshot(region: Region, hub: &Hub) -> IotHubSnapshot {
    IotHubSnapshot {
        id: format!("{region}/{}", hub.id),
        name: hub.name.clone(),
        status: hub.status.clone(),
        product_plan: hub.product_plan.clone(),
        enabled: hub.enabled,
        endpoint: hub.endpoint.clone(),
        project_id: hub.project_id.clone(),
    }
}

/// Controller for `scaleway_iot_hub`.
pub struct IotHubController {
    session: Arc<Session>,
}

impl IotHubController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> IotApi {
        IotApi::new(self.session.api(), region)
    }

    async fn wait_settled(
        &self,
        ctx: &OperationContext,
        api: &IotApi,
        hub_id: &str,
        enabled: bool,
    ) -> Result<Hub, crate::controller::OperationError> {
        let hub = wait_for_status(
            ctx,
            DEFAULT_POLL_INTERVAL,
            &hub_target(enabled),
            &HUB_FAILED,
            || async { hub_observation(api.get_hub(hub_id).await) },
        )
        .await?;
        Ok(hub)
    }
}

#[async_trait]
impl ResourceController for IotHubController {
    type Config = IotHubConfig;
    type State = IotHubSnapshot;

    const KIND: &'static str = "scaleway_iot_hub";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::required("product_plan", AttributeKind::String).force_new(),
                Attribute::optional("enabled", AttributeKind::Bool),
                Attribute::computed("status", AttributeKind::String),
                Attribute::computed("endpoint", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.name.is_empty() {
            return Err(validation("name", "hub name must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %region, name = %config.name, "creating IoT hub");
        let body = json!({
            "name": config.name,
            "project_id": project,
            "product_plan": config.product_plan,
        });
        let hub = api
            .create_hub(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", hub.id);
        if !config.enabled {
            api.update_hub(&hub.id, &json!({ "enabled": false }))
                .await
                .in_operation(Operation::Create, Self::KIND, &id)?;
        }
        let settled = self
            .wait_settled(ctx, &api, &hub.id, config.enabled)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, hub_snapshot(region, &settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_hub(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(hub) => ReadOutcome::Present(hub_snapshot(region, &hub)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Update, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(region);
        let hub_id = uuid.to_string();
        let body = json!({
            "name": config.name,
            "enabled": config.enabled,
        });
        api.update_hub(&hub_id, &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let settled = self
            .wait_settled(ctx, &api, &hub_id, config.enabled)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(hub_snapshot(region, &settled))
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        let hub_id = uuid.to_string();
        info!(kind = Self::KIND, %region, "deleting IoT hub");
        ignore_gone(api.delete_hub(&hub_id).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)?;
        wait_for_gone::<Hub, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            hub_observation(api.get_hub(&hub_id).await)
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// Declared configuration for an IoT device.
#[derive(Clone, Debug, Default)]
pub struct IotDeviceConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Hub the device registers on; accepts a locality-qualified id.
    pub hub_id: String,
    /// Device name; unique within the hub.
    pub name: String,
    /// Whether plaintext connections are allowed.
    pub allow_insecure: bool,
    /// Free-form description.
    pub description: String,
}

/// State snapshot for an IoT device.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IotDeviceSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Device name.
    pub name: String,
    /// Hub the device belongs to.
    pub hub_id: String,
    /// Connection status.
    pub status: String,
    /// Whether plaintext connections are allowed.
    pub allow_insecure: bool,
    /// Free-form description.
    pub description: String,
}

fn device_snapshot(region: Region, device: &Device) -> IotDeviceSnapshot {
    IotDeviceSnapshot {
        id: format!("{region}/{}", device.id),
        name: device.name.clone(),
        hub_id: device.hub_id.clone(),
        status: device.status.clone(),
        allow_insecure: device.allow_insecure,
        description: device.description.clone(),
    }
}

/// Controller for `scaleway_iot_device`.
pub struct IotDeviceController {
    session: Arc<Session>,
}

impl IotDeviceController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> IotApi {
        IotApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for IotDeviceController {
    type Config = IotDeviceConfig;
    type State = IotDeviceSnapshot;

    const KIND: &'static str = "scaleway_iot_device";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::required("hub_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String).force_new(),
                Attribute::optional("allow_insecure", AttributeKind::Bool),
                Attribute::optional("description", AttributeKind::String),
                Attribute::computed("status", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.hub_id.is_empty() {
            return Err(validation("hub_id", "hub_id must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let hub = expand_last_uuid(&config.hub_id);
        info!(kind = Self::KIND, %region, name = %config.name, "registering IoT device");
        let body = json!({
            "hub_id": hub,
            "name": config.name,
            "allow_insecure": config.allow_insecure,
            "description": config.description,
        });
        let device = api
            .create_device(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", device.id);
        Ok((id, device_snapshot(region, &device)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_device(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(device) => ReadOutcome::Present(device_snapshot(region, &device)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Update, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(region);
        let body = json!({
            "allow_insecure": config.allow_insecure,
            "description": config.description,
        });
        let device = api
            .update_device(&uuid.to_string(), &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(device_snapshot(region, &device))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        info!(kind = Self::KIND, %region, "removing IoT device");
        ignore_gone(api.delete_device(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// Declared configuration for an IoT route.
#[derive(Clone, Debug, Default)]
pub struct IotRouteConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Hub the route attaches to; accepts a locality-qualified id.
    pub hub_id: String,
    /// Route name.
    pub name: String,
    /// Topic filter the route subscribes to.
    pub topic: String,
    /// Destination kind (`s3`, `database`, `rest`); immutable.
    pub route_type: String,
    /// Destination-specific settings, passed through as-is.
    pub settings: serde_json::Value,
}

/// State snapshot for an IoT route.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IotRouteSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Route name.
    pub name: String,
    /// Hub the route belongs to.
    pub hub_id: String,
    /// Topic filter.
    pub topic: String,
    /// Destination kind.
    pub route_type: String,
}

fn route_snapshot(region: Region, route: &Route) -> IotRouteSnapshot {
    IotRouteSnapshot {
        id: format!("{region}/{}", route.id),
        name: route.name.clone(),
        hub_id: route.hub_id.clone(),
        topic: route.topic.clone(),
        route_type: route.route_type.clone(),
    }
}

/// Controller for `scaleway_iot_route`.
pub struct IotRouteController {
    session: Arc<Session>,
}

impl IotRouteController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> IotApi {
        IotApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for IotRouteController {
    type Config = IotRouteConfig;
    type State = IotRouteSnapshot;

    const KIND: &'static str = "scaleway_iot_route";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::required("hub_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::required("topic", AttributeKind::String),
                Attribute::required("type", AttributeKind::String).force_new(),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.topic.is_empty() {
            return Err(validation("topic", "topic filter must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let hub = expand_last_uuid(&config.hub_id);
        info!(kind = Self::KIND, %region, name = %config.name, "creating IoT route");
        let body = json!({
            "hub_id": hub,
            "name": config.name,
            "topic": config.topic,
            "type": config.route_type,
            "settings": config.settings,
        });
        let route = api
            .create_route(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", route.id);
        Ok((id, route_snapshot(region, &route)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_route(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(route) => ReadOutcome::Present(route_snapshot(region, &route)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Update, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(region);
        let body = json!({
            "name": config.name,
            "topic": config.topic,
            "settings": config.settings,
        });
        let route = api
            .update_route(&uuid.to_string(), &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(route_snapshot(region, &route))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        info!(kind = Self::KIND, %region, "deleting IoT route");
        ignore_gone(api.delete_route(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(true, "ready")]
    #[case(false, "disabled")]
    fn hub_wait_target_follows_the_enabled_flag(#[case] enabled: bool, #[case] expected: &str) {
        assert_eq!(hub_target(enabled), [expected]);
    }

    #[rstest]
    fn gone_hubs_fold_into_observations() {
        let err = ApiError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(matches!(hub_observation(Err(err)), Ok(Observation::Gone)));
    }

    #[rstest]
    fn forbidden_hubs_stay_errors() {
        let err = ApiError::Status {
            status: 403,
            body: String::new(),
        };
        assert!(hub_observation(Err(err)).is_err());
    }

    #[rstest]
    fn device_snapshot_is_region_qualified() {
        let device = Device {
            id: String::from("33333333-3333-4333-8333-333333333333"),
            name: String::from("sensor-1"),
            hub_id: String::from("44444444-4444-4444-8444-444444444444"),
            status: String::from("disconnected"),
            allow_insecure: false,
            description: String::new(),
        };
        let snap = device_snapshot(Region::NlAms, &device);
        assert_eq!(snap.id, "nl-ams/33333333-3333-4333-8333-333333333333");
    }

    #[rstest]
    fn default_hub_config_is_an_enabled_shared_plan() {
        let config = IotHubConfig::default();
        assert!(config.enabled);
        assert_eq!(config.product_plan, "plan_shared");
    }
}
