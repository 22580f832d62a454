//! Flexible IP controller (bare-metal, IPv4 and IPv6).
//!
//! Like instance IPs, deleted flexible IPs surface as 403; both 404 and
//! 403 mean "gone". Operations run under a one-minute deadline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::flexip::{FlexibleIp, FlexipApi};
use crate::api::ApiError;
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, expand_last_uuid, Zone};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::zone_scope;

/// Deleted flexible IPs surface as 403 on the get endpoint.
const FORBIDDEN_MEANS_GONE: bool = true;
const READY: [&str; 2] = ["ready", "attached"];
const FAILED: [&str; 1] = ["error"];

/// Declared configuration for a flexible IP.
#[derive(Clone, Debug, Default)]
pub struct FlexibleIpConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Project override.
    pub project_id: Option<String>,
    /// Free-form description.
    pub description: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Book an IPv6 address instead of IPv4; immutable.
    pub is_ipv6: bool,
    /// Server to attach to, when any.
    pub server_id: Option<String>,
    /// Reverse DNS name; empty string clears it.
    pub reverse: String,
}

/// State snapshot for a flexible IP.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlexibleIpSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Booked address with prefix.
    pub ip_address: String,
    /// Lifecycle status.
    pub status: String,
    /// Reverse DNS name, empty when unset.
    pub reverse: String,
    /// Attached server UUID, empty when detached.
    pub server_id: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether the address is IPv6.
    pub is_ipv6: bool,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(zone: Zone, fip: &FlexibleIp) -> FlexibleIpSnapshot {
    FlexibleIpSnapshot {
        id: format!("{zone}/{}", fip.id),
        ip_address: fip.ip_address.clone(),
        status: fip.status.clone(),
        reverse: fip.reverse.clone().unwrap_or_default(),
        server_id: fip.server_id.clone().unwrap_or_default(),
        tags: fip.tags.clone(),
        is_ipv6: fip.is_ipv6,
        project_id: fip.project_id.clone(),
    }
}

fn observation(result: Result<FlexibleIp, ApiError>) -> Result<Observation<FlexibleIp>, ApiError> {
    match result {
        Ok(fip) => Ok(Observation::Present(fip)),
        Err(err) if err.is_gone(FORBIDDEN_MEANS_GONE) => Ok(Observation::Gone),
        Err(err) => Err(err),
    }
}

/// Controller for `scaleway_flexible_ip`.
pub struct FlexibleIpController {
    session: Arc<Session>,
}

impl FlexibleIpController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> FlexipApi {
        FlexipApi::new(self.session.api(), zone)
    }

    async fn wait_ready(
        &self,
        ctx: &OperationContext,
        api: &FlexipApi,
        fip_id: &str,
    ) -> Result<FlexibleIp, crate::controller::OperationError> {
        let fip = wait_for_status(ctx, DEFAULT_POLL_INTERVAL, &READY, &FAILED, || async {
            observation(api.get_fip(fip_id).await)
        })
        .await?;
        Ok(fip)
    }
}

#[async_trait]
impl ResourceController for FlexibleIpController {
    type Config = FlexibleIpConfig;
    type State = FlexibleIpSnapshot;

    const KIND: &'static str = "scaleway_flexible_ip";

    fn operation_timeout(&self) -> std::time::Duration {
        super::FLEXIBLE_IP_DEADLINE
    }

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("zone", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::optional("description", AttributeKind::String),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::optional("is_ipv6", AttributeKind::Bool).force_new(),
                Attribute::optional("server_id", AttributeKind::String),
                Attribute::optional("reverse", AttributeKind::String),
                Attribute::computed("ip_address", AttributeKind::String),
                Attribute::computed("status", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let zone = self.session.zone_or_default(config.zone);
        let api = self.api(zone);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        let server = config.server_id.as_deref().map(expand_last_uuid);
        info!(kind = Self::KIND, %zone, ipv6 = config.is_ipv6, "booking flexible IP");
        let fip = api
            .create_fip(
                &project,
                &config.description,
                &config.tags,
                config.is_ipv6,
                server.as_deref(),
            )
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", fip.id);
        self.wait_ready(ctx, &api, &fip.id)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        if !config.reverse.is_empty() {
            let body = serde_json::json!({ "reverse": config.reverse });
            api.update_fip(&fip.id, &body)
                .await
                .in_operation(Operation::Create, Self::KIND, &id)?;
        }
        let settled = api
            .get_fip(&fip.id)
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
        let outcome = outcome_from(api.get_fip(&uuid.to_string()).await, FORBIDDEN_MEANS_GONE)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(fip) => ReadOutcome::Present(snapshot(zone, &fip)),
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
        let zone = zone_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(zone);
        let fip_id = uuid.to_string();
        let current = self
            .wait_ready(ctx, &api, &fip_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let body = serde_json::json!({
            "reverse": config.reverse,
            "tags": config.tags,
            "description": config.description,
        });
        api.update_fip(&fip_id, &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let declared_server = config.server_id.as_deref().map(expand_last_uuid);
        if declared_server != current.server_id {
            match declared_server {
                Some(server) => api
                    .attach_fip(&fip_id, &server)
                    .await
                    .in_operation(Operation::Update, Self::KIND, id)?,
                None => api
                    .detach_fip(&fip_id)
                    .await
                    .in_operation(Operation::Update, Self::KIND, id)?,
            }
            self.wait_ready(ctx, &api, &fip_id)
                .await
                .in_operation(Operation::Update, Self::KIND, id)?;
        }
        let settled = api
            .get_fip(&fip_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(zone, &settled))
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        let fip_id = uuid.to_string();
        info!(kind = Self::KIND, %zone, "releasing flexible IP");
        ignore_gone(api.delete_fip(&fip_id).await, FORBIDDEN_MEANS_GONE)
            .in_operation(Operation::Delete, Self::KIND, id)?;
        wait_for_gone::<FlexibleIp, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            observation(api.get_fip(&fip_id).await)
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn snapshot_preserves_the_address_family() {
        let fip = FlexibleIp {
            id: String::from("11111111-1111-4111-8111-111111111111"),
            ip_address: String::from("2001:db8::1/64"),
            status: String::from("ready"),
            reverse: None,
            server_id: None,
            tags: vec![],
            is_ipv6: true,
            project_id: String::from("proj"),
        };
        let snap = snapshot(Zone::FrPar2, &fip);
        assert!(snap.is_ipv6);
        assert_eq!(snap.id, "fr-par-2/11111111-1111-4111-8111-111111111111");
        assert_eq!(snap.server_id, "");
    }

    #[rstest]
    #[case(404)]
    #[case(403)]
    fn gone_statuses_fold_into_observations(#[case] status: u16) {
        let err = ApiError::Status {
            status,
            body: String::new(),
        };
        assert!(matches!(observation(Err(err)), Ok(Observation::Gone)));
    }

    #[rstest]
    fn permission_errors_elsewhere_are_not_gone() {
        let err = ApiError::Status {
            status: 500,
            body: String::new(),
        };
        assert!(observation(Err(err)).is_err());
    }
}
