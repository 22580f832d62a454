//! Flexible instance IP controller.
//!
//! The instance IP endpoint reports deleted addresses as 403 rather than
//! 404; both are folded into "gone" here, on Read and after Delete.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::instance::{InstanceApi, InstanceIp};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, expand_last_uuid, Zone};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::OperationContext;

use super::zone_scope;

/// Deleted instance IPs surface as 403 on the get endpoint.
const FORBIDDEN_MEANS_GONE: bool = true;

/// Declared configuration for an instance IP.
#[derive(Clone, Debug, Default)]
pub struct InstanceIpConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Project override.
    pub project_id: Option<String>,
    /// Reverse DNS name; empty string clears it.
    pub reverse: String,
    /// Server to attach the address to, when any.
    pub server_id: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
}

/// State snapshot for an instance IP.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceIpSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Address in textual form.
    pub address: String,
    /// Reverse DNS name, empty when unset.
    pub reverse: String,
    /// Attached server UUID, empty when detached.
    pub server_id: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(zone: Zone, ip: &InstanceIp) -> InstanceIpSnapshot {
    InstanceIpSnapshot {
        id: format!("{zone}/{}", ip.id),
        address: ip.address.clone(),
        reverse: ip.reverse.clone().unwrap_or_default(),
        server_id: ip
            .server
            .as_ref()
            .map(|server| server.id.clone())
            .unwrap_or_default(),
        tags: ip.tags.clone(),
        project_id: ip.project.clone(),
    }
}

/// Controller for `scaleway_instance_ip`.
pub struct InstanceIpController {
    session: Arc<Session>,
}

impl InstanceIpController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> InstanceApi {
        InstanceApi::new(self.session.api(), zone)
    }
}

#[async_trait]
impl ResourceController for InstanceIpController {
    type Config = InstanceIpConfig;
    type State = InstanceIpSnapshot;

    const KIND: &'static str = "scaleway_instance_ip";

    fn operation_timeout(&self) -> std::time::Duration {
        super::FLEXIBLE_IP_DEADLINE
    }

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("zone", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::optional("reverse", AttributeKind::String),
                Attribute::optional("server_id", AttributeKind::String),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::computed("address", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let zone = self.session.zone_or_default(config.zone);
        let api = self.api(zone);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %zone, "reserving instance IP");
        let ip = api
            .create_ip(&project, &config.tags)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", ip.id);
        let reverse = (!config.reverse.is_empty()).then_some(config.reverse.as_str());
        let server = config.server_id.as_deref().map(expand_last_uuid);
        if reverse.is_some() || server.is_some() {
            api.update_ip(&ip.id, reverse, server.as_deref(), None)
                .await
                .in_operation(Operation::Create, Self::KIND, &id)?;
        }
        let settled = api
            .get_ip(&ip.id)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, snapshot(zone, &settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(zone);
        let outcome = outcome_from(api.get_ip(&uuid.to_string()).await, FORBIDDEN_MEANS_GONE)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(ip) => ReadOutcome::Present(snapshot(zone, &ip)),
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
        let zone = zone_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(zone);
        let ip_id = uuid.to_string();
        let server = config.server_id.as_deref().map(expand_last_uuid);
        let updated = api
            .update_ip(
                &ip_id,
                Some(config.reverse.as_str()),
                server.as_deref(),
                Some(&config.tags),
            )
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(zone, &updated))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        info!(kind = Self::KIND, %zone, "releasing instance IP");
        ignore_gone(api.delete_ip(&uuid.to_string()).await, FORBIDDEN_MEANS_GONE)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::instance::ResourceRef;
    use crate::api::ApiError;

    #[rstest]
    fn snapshot_flattens_optional_fields() {
        let ip = InstanceIp {
            id: String::from("11111111-1111-4111-8111-111111111111"),
            address: String::from("51.15.0.2"),
            reverse: None,
            server: Some(ResourceRef {
                id: String::from("22222222-2222-4222-8222-222222222222"),
                name: String::from("web-1"),
            }),
            tags: vec![String::from("edge")],
            project: String::from("proj"),
        };
        let snap = snapshot(Zone::NlAms1, &ip);
        assert_eq!(snap.id, "nl-ams-1/11111111-1111-4111-8111-111111111111");
        assert_eq!(snap.reverse, "");
        assert_eq!(snap.server_id, "22222222-2222-4222-8222-222222222222");
    }

    #[rstest]
    #[case(404)]
    #[case(403)]
    fn read_treats_both_gone_statuses_alike(#[case] status: u16) {
        let err = ApiError::Status {
            status,
            body: String::new(),
        };
        let outcome = outcome_from::<InstanceIp>(Err(err), FORBIDDEN_MEANS_GONE);
        assert!(matches!(outcome, Ok(ReadOutcome::Gone)));
    }
}
