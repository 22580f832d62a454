//! Apple-silicon server controller.
//!
//! These servers carry a minimum 24-hour lease: the API refuses deletion
//! before `deletable_at`. The controller surfaces an early delete as a
//! conflict carrying the earliest allowed instant instead of letting the
//! raw API rejection bubble up. Provisioning is quick, so operations run
//! under a two-minute deadline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::api::applesilicon::{AppleSiliconApi, AppleSiliconServer};
use crate::api::ApiError;
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, OperationError, ReadOutcome,
    ResourceController, WithOperation,
};
use crate::locality::{decode, Zone};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::{validation, zone_scope};

const READY: [&str; 1] = ["ready"];
const FAILED: [&str; 1] = ["error"];

fn observation(
    result: Result<AppleSiliconServer, ApiError>,
) -> Result<Observation<AppleSiliconServer>, ApiError> {
    match result {
        Ok(server) => Ok(Observation::Present(server)),
        Err(err) if err.is_gone(false) => Ok(Observation::Gone),
        Err(err) => Err(err),
    }
}

/// Rejects deletion while the minimum lease still runs.
fn lease_guard(deletable_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), OperationError> {
    match deletable_at {
        Some(instant) if now < instant => Err(OperationError::Conflict {
            message: format!("server is leased until {instant}; deletion is refused before then"),
        }),
        _ => Ok(()),
    }
}

/// Declared configuration for an Apple-silicon server.
#[derive(Clone, Debug, Default)]
pub struct AppleSiliconConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Project override.
    pub project_id: Option<String>,
    /// Server name.
    pub name: String,
    /// Hardware type (for example `M2-M`); immutable.
    pub server_type: String,
}

/// State snapshot for an Apple-silicon server.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AppleSiliconSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Hardware type.
    pub server_type: String,
    /// Lifecycle status.
    pub status: String,
    /// Public IP.
    pub ip: String,
    /// VNC endpoint.
    pub vnc_url: String,
    /// Earliest instant the server may be deleted.
    pub deletable_at: Option<DateTime<Utc>>,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(zone: Zone, server: &AppleSiliconServer) -> AppleSiliconSnapshot {
    AppleSiliconSnapshot {
        id: format!("{zone}/{}", server.id),
        name: server.name.clone(),
        server_type: server.server_type.clone(),
        status: server.status.clone(),
        ip: server.ip.clone(),
        vnc_url: server.vnc_url.clone(),
        deletable_at: server.deletable_at,
        project_id: server.project_id.clone(),
    }
}

/// Controller for `scaleway_apple_silicon_server`.
pub struct AppleSiliconServerController {
    session: Arc<Session>,
}

impl AppleSiliconServerController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> AppleSiliconApi {
        AppleSiliconApi::new(self.session.api(), zone)
    }

    async fn wait_ready(
        &self,
        ctx: &OperationContext,
        api: &AppleSiliconApi,
        server_id: &str,
    ) -> Result<AppleSiliconServer, OperationError> {
        let server = wait_for_status(ctx, DEFAULT_POLL_INTERVAL, &READY, &FAILED, || async {
            observation(api.get_server(server_id).await)
        })
        .await?;
        Ok(server)
    }
}

#[async_trait]
impl ResourceController for AppleSiliconServerController {
    type Config = AppleSiliconConfig;
    type State = AppleSiliconSnapshot;

    const KIND: &'static str = "scaleway_apple_silicon_server";

    fn operation_timeout(&self) -> std::time::Duration {
        super::APPLE_SILICON_DEADLINE
    }

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("zone", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::required("type", AttributeKind::String).force_new(),
                Attribute::computed("status", AttributeKind::String),
                Attribute::computed("ip", AttributeKind::String),
                Attribute::computed("vnc_url", AttributeKind::String),
                Attribute::computed("deletable_at", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.server_type.is_empty() {
            return Err(validation("type", "server type must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let zone = self.session.zone_or_default(config.zone);
        let api = self.api(zone);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %zone, name = %config.name, server_type = %config.server_type, "provisioning Apple silicon server");
        let server = api
            .create_server(&project, &config.name, &config.server_type)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", server.id);
        let settled = self
            .wait_ready(ctx, &api, &server.id)
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
        let outcome = outcome_from(api.get_server(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(server) => ReadOutcome::Present(snapshot(zone, &server)),
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
        let server_id = uuid.to_string();
        let current = self
            .wait_ready(ctx, &api, &server_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        if !config.server_type.is_empty() && config.server_type != current.server_type {
            return Err(OperationError::Immutable {
                attribute: String::from("type"),
            })
            .in_operation(Operation::Update, Self::KIND, id);
        }
        if config.name != current.name {
            api.update_server(&server_id, &config.name)
                .await
                .in_operation(Operation::Update, Self::KIND, id)?;
        }
        let settled = api
            .get_server(&server_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(zone, &settled))
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        let server_id = uuid.to_string();
        match api.get_server(&server_id).await {
            Ok(server) => lease_guard(server.deletable_at, Utc::now())
                .in_operation(Operation::Delete, Self::KIND, id)?,
            Err(err) if err.is_gone(false) => return Ok(()),
            Err(err) => return Err(err).in_operation(Operation::Delete, Self::KIND, id),
        }
        info!(kind = Self::KIND, %zone, "deleting Apple silicon server");
        ignore_gone(api.delete_server(&server_id).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)?;
        wait_for_gone::<AppleSiliconServer, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            observation(api.get_server(&server_id).await)
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    fn instant(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[rstest]
    fn deletion_is_refused_while_the_lease_runs() {
        let result = lease_guard(Some(instant(12)), instant(9));
        assert!(matches!(result, Err(OperationError::Conflict { .. })));
    }

    #[rstest]
    fn deletion_is_allowed_once_the_lease_expires() {
        assert!(lease_guard(Some(instant(9)), instant(12)).is_ok());
        assert!(lease_guard(Some(instant(9)), instant(9)).is_ok());
    }

    #[rstest]
    fn deletion_is_allowed_when_no_lease_is_reported() {
        assert!(lease_guard(None, instant(9)).is_ok());
    }

    #[rstest]
    fn snapshot_carries_the_lease_instant() {
        let server = AppleSiliconServer {
            id: String::from("99999999-9999-4999-8999-999999999999"),
            name: String::from("mac-1"),
            server_type: String::from("M2-M"),
            status: String::from("ready"),
            ip: String::from("51.159.0.10"),
            vnc_url: String::from("vnc://51.159.0.10:5900"),
            deletable_at: Some(instant(12)),
            project_id: String::from("proj"),
        };
        let snap = snapshot(Zone::FrPar1, &server);
        assert_eq!(snap.deletable_at, Some(instant(12)));
        assert_eq!(snap.id, "fr-par-1/99999999-9999-4999-8999-999999999999");
    }
}
