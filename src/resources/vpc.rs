//! Private-network controller.
//!
//! Subnets are allocated server-side and exposed as a computed attribute;
//! the controller never tries to reconcile them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::api::vpc::{PrivateNetwork, VpcApi};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, Region};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::OperationContext;

use super::{region_scope, validation};

/// Declared configuration for a private network.
#[derive(Clone, Debug, Default)]
pub struct PrivateNetworkConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Project override.
    pub project_id: Option<String>,
    /// Network name.
    pub name: String,
    /// Tags.
    pub tags: Vec<String>,
}

/// State snapshot for a private network.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PrivateNetworkSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Server-allocated subnets in CIDR form.
    pub subnets: Vec<String>,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(region: Region, network: &PrivateNetwork) -> PrivateNetworkSnapshot {
    PrivateNetworkSnapshot {
        id: format!("{region}/{}", network.id),
        name: network.name.clone(),
        tags: network.tags.clone(),
        subnets: network.subnets.clone(),
        project_id: network.project_id.clone(),
    }
}

/// Controller for `scaleway_vpc_private_network`.
pub struct PrivateNetworkController {
    session: Arc<Session>,
}

impl PrivateNetworkController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> VpcApi {
        VpcApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for PrivateNetworkController {
    type Config = PrivateNetworkConfig;
    type State = PrivateNetworkSnapshot;

    const KIND: &'static str = "scaleway_vpc_private_network";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::computed("subnets", AttributeKind::StringList),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.name.is_empty() {
            return Err(validation("name", "network name must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %region, name = %config.name, "creating private network");
        let body = json!({
            "name": config.name,
            "project_id": project,
            "tags": config.tags,
        });
        let network = api
            .create_network(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", network.id);
        Ok((id, snapshot(region, &network)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_network(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(network) => ReadOutcome::Present(snapshot(region, &network)),
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
            "tags": config.tags,
        });
        let network = api
            .update_network(&uuid.to_string(), &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(region, &network))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        info!(kind = Self::KIND, %region, "deleting private network");
        ignore_gone(api.delete_network(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn snapshot_carries_server_allocated_subnets() {
        let network = PrivateNetwork {
            id: String::from("66666666-6666-4666-8666-666666666666"),
            name: String::from("backbone"),
            tags: vec![],
            subnets: vec![String::from("172.16.4.0/22"), String::from("fd63::/64")],
            project_id: String::from("proj"),
        };
        let snap = snapshot(Region::PlWaw, &network);
        assert_eq!(snap.id, "pl-waw/66666666-6666-4666-8666-666666666666");
        assert_eq!(snap.subnets.len(), 2);
    }
}
