//! Compute server controller, plus the nested user-data resource.
//!
//! Servers are the one kind with a declared lifecycle state: the
//! controller plans the minimal action sequence between settled states and
//! applies it one action at a time, waiting after each. Power actions that
//! the API does not serialize server-side run under the session's compute
//! guard, held for the call only.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::instance::{CreateServer, InstanceApi, Server, UpdateServer};
use crate::api::ApiError;
use crate::codec::render_timestamp;
use crate::controller::{
    outcome_from, ControllerError, Operation, OperationError, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, decode_nested, encode_nested, expand_last_uuid, Zone};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::server_state::{plan_transition, ServerAction, ServerState};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::{validation, zone_scope};

/// Settled states the transition waiter accepts as "ready".
const SETTLED: [&str; 3] = ["stopped", "running", "stopped in place"];
/// States a server can never leave on its own.
const FAILED: [&str; 1] = ["locked"];

/// Declared configuration for a compute server.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Zone override; session default when absent.
    pub zone: Option<Zone>,
    /// Server name.
    pub name: String,
    /// Commercial type, immutable.
    pub commercial_type: String,
    /// Image, bare UUID or locality-qualified; immutable.
    pub image: String,
    /// Project override; session default when absent.
    pub project_id: Option<String>,
    /// Tags to attach.
    pub tags: Vec<String>,
    /// Security group; the account default applies when absent.
    pub security_group_id: Option<String>,
    /// Desired lifecycle state.
    pub state: ServerState,
    /// Reboot a running server when a pending change requires it.
    pub force_reboot: bool,
    /// Whether to allocate a dynamic public IP.
    pub dynamic_ip: bool,
}

/// State snapshot written back to the engine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Commercial type.
    pub commercial_type: String,
    /// Image identifier.
    pub image_id: String,
    /// Settled lifecycle state, declared form.
    pub state: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Security group identifier.
    pub security_group_id: String,
    /// Public IP address, empty when none.
    pub public_ip: String,
    /// Boot mechanism.
    pub boot_type: String,
    /// Legacy bootscript identifier; reported but never sent.
    pub bootscript_id: String,
    /// Owning project.
    pub project_id: String,
    /// Creation timestamp, RFC 3339.
    pub created_at: String,
    /// Last-modification timestamp, RFC 3339.
    pub updated_at: String,
}

/// Maps an API server to the engine snapshot form.
fn snapshot(zone: Zone, server: &Server) -> ServerSnapshot {
    let state = ServerState::from_api_status(&server.state)
        .map_or_else(|| server.state.clone(), |settled| settled.to_string());
    ServerSnapshot {
        id: format!("{zone}/{}", server.id),
        name: server.name.clone(),
        commercial_type: server.commercial_type.clone(),
        image_id: server.image.as_ref().map(|image| image.id.clone()).unwrap_or_default(),
        state,
        tags: server.tags.clone(),
        security_group_id: server
            .security_group
            .as_ref()
            .map(|group| group.id.clone())
            .unwrap_or_default(),
        public_ip: server
            .public_ip
            .as_ref()
            .map(|ip| ip.address.clone())
            .unwrap_or_default(),
        boot_type: server.boot_type.clone(),
        bootscript_id: server
            .bootscript
            .as_ref()
            .map(|bootscript| bootscript.id.clone())
            .unwrap_or_default(),
        project_id: server.project.clone(),
        created_at: render_timestamp(server.creation_date),
        updated_at: render_timestamp(server.modification_date),
    }
}

/// Builds the create request from a declared configuration.
fn build_create(config: &ServerConfig, project: String) -> CreateServer {
    CreateServer {
        name: config.name.clone(),
        commercial_type: config.commercial_type.clone(),
        image: expand_last_uuid(&config.image),
        project,
        tags: config.tags.clone(),
        security_group: config
            .security_group_id
            .as_deref()
            .map(expand_last_uuid),
        dynamic_ip_required: config.dynamic_ip.then_some(true),
    }
}

/// Names the first immutable attribute whose declared value differs from
/// the remote one, if any. The engine must plan a recreate for these.
fn immutable_change(config: &ServerConfig, remote: &Server) -> Option<&'static str> {
    let declared_image = expand_last_uuid(&config.image);
    let remote_image = remote.image.as_ref().map(|image| image.id.as_str());
    if remote_image.is_some_and(|id| id != declared_image) {
        return Some("image");
    }
    if config.commercial_type != remote.commercial_type {
        return Some("type");
    }
    None
}

/// Controller for `scaleway_instance_server`.
pub struct InstanceServerController {
    session: Arc<Session>,
}

impl InstanceServerController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> InstanceApi {
        InstanceApi::new(self.session.api(), zone)
    }

    async fn wait_settled(
        &self,
        ctx: &OperationContext,
        api: &InstanceApi,
        server_id: &str,
    ) -> Result<Server, OperationError> {
        let server = wait_for_status(ctx, DEFAULT_POLL_INTERVAL, &SETTLED, &FAILED, || async {
            outcome_observation(api.get_server(server_id).await)
        })
        .await?;
        Ok(server)
    }

    /// Drives the server to `desired`, replanning when a concurrent actor
    /// moved it between the plan and the action.
    async fn converge(
        &self,
        ctx: &OperationContext,
        api: &InstanceApi,
        server_id: &str,
        desired: ServerState,
        force_reboot: bool,
    ) -> Result<(), OperationError> {
        let mut force_reboot = force_reboot;
        loop {
            let settled = self.wait_settled(ctx, api, server_id).await?;
            let current = ServerState::from_api_status(&settled.state)
                .ok_or_else(|| validation("state", format!("unexpected state {}", settled.state)))?;
            let plan = plan_transition(current, desired, force_reboot);
            let Some(&action) = plan.first() else {
                return Ok(());
            };
            debug!(server = server_id, %action, "applying server action");
            let result = self.issue_action(api, server_id, action).await;
            match result {
                Ok(()) => {
                    wait_for_status(
                        ctx,
                        DEFAULT_POLL_INTERVAL,
                        &[action.landing_state().api_status()],
                        &FAILED,
                        || async { outcome_observation(api.get_server(server_id).await) },
                    )
                    .await?;
                    // A reboot satisfies the pending-change requirement once.
                    if action == ServerAction::Reboot {
                        force_reboot = false;
                    }
                }
                // Another controller changed the state between the plan and
                // the action; replan under the same deadline.
                Err(err) if err.is_precondition_failed() => {
                    ctx.pause(DEFAULT_POLL_INTERVAL).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn issue_action(
        &self,
        api: &InstanceApi,
        server_id: &str,
        action: ServerAction,
    ) -> Result<(), ApiError> {
        // The API serializes neither power-off nor terminate.
        if matches!(action, ServerAction::PowerOff) {
            let _guard = self.session.compute_action_guard().await;
            api.server_action(server_id, action.wire_name()).await
        } else {
            api.server_action(server_id, action.wire_name()).await
        }
    }
}

fn outcome_observation<T>(result: Result<T, ApiError>) -> Result<Observation<T>, ApiError> {
    match result {
        Ok(value) => Ok(Observation::Present(value)),
        Err(err) if err.is_gone(false) => Ok(Observation::Gone),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl ResourceController for InstanceServerController {
    type Config = ServerConfig;
    type State = ServerSnapshot;

    const KIND: &'static str = "scaleway_instance_server";

    fn operation_timeout(&self) -> std::time::Duration {
        super::SERVER_DEADLINE
    }

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("name", AttributeKind::String),
                Attribute::required("type", AttributeKind::String).force_new(),
                Attribute::required("image", AttributeKind::String).force_new(),
                Attribute::optional("zone", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::optional("security_group_id", AttributeKind::String),
                Attribute::optional("state", AttributeKind::String),
                Attribute::optional("enable_dynamic_ip", AttributeKind::Bool),
                Attribute::computed("public_ip", AttributeKind::String),
                Attribute::computed("boot_type", AttributeKind::String),
                Attribute::computed("bootscript_id", AttributeKind::String),
                Attribute::computed("created_at", AttributeKind::String),
                Attribute::computed("updated_at", AttributeKind::String),
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
        info!(kind = Self::KIND, %zone, name = %config.name, "creating server");
        let request = build_create(config, project);
        let server = api
            .create_server(&request)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", server.id);
        self.converge(ctx, &api, &server.id, config.state, false)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        let settled = api
            .get_server(&server.id)
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
            .wait_settled(ctx, &api, &server_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        if let Some(attribute) = immutable_change(config, &current) {
            return Err(ControllerError::new(
                Operation::Update,
                Self::KIND,
                id,
                OperationError::Immutable {
                    attribute: attribute.to_owned(),
                },
            ));
        }
        let patch = UpdateServer {
            name: (config.name != current.name).then(|| config.name.clone()),
            tags: (config.tags != current.tags).then(|| config.tags.clone()),
            security_group: config.security_group_id.as_deref().map(expand_last_uuid).filter(
                |declared| {
                    current
                        .security_group
                        .as_ref()
                        .is_none_or(|group| &group.id != declared)
                },
            ),
        };
        if patch.name.is_some() || patch.tags.is_some() || patch.security_group.is_some() {
            api.update_server(&server_id, &patch)
                .await
                .in_operation(Operation::Update, Self::KIND, id)?;
        }
        self.converge(ctx, &api, &server_id, config.state, config.force_reboot)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
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
        info!(kind = Self::KIND, %zone, server = %server_id, "terminating server");
        let result = {
            let _guard = self.session.compute_action_guard().await;
            api.server_action(&server_id, "terminate").await
        };
        match result {
            Ok(()) => {}
            Err(err) if err.is_gone(false) => return Ok(()),
            Err(err) => return Err(err).in_operation(Operation::Delete, Self::KIND, id),
        }
        wait_for_gone::<Server, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            outcome_observation(api.get_server(&server_id).await)
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// Declared configuration for one user-data key.
#[derive(Clone, Debug, Default)]
pub struct UserDataConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Parent server, bare UUID or locality-qualified.
    pub server_id: String,
    /// User-data key.
    pub key: String,
    /// Value stored under the key.
    pub value: String,
}

/// State snapshot for one user-data key.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserDataSnapshot {
    /// Nested identifier `{zone}/{server-uuid}/{key}`.
    pub id: String,
    /// Parent server UUID.
    pub server_id: String,
    /// Key.
    pub key: String,
    /// Value.
    pub value: String,
}

/// Controller for `scaleway_instance_user_data`, a nested resource keyed
/// by `{zone}/{server-uuid}/{key}`.
pub struct InstanceUserDataController {
    session: Arc<Session>,
}

impl InstanceUserDataController {
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
impl ResourceController for InstanceUserDataController {
    type Config = UserDataConfig;
    type State = UserDataSnapshot;

    const KIND: &'static str = "scaleway_instance_user_data";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("server_id", AttributeKind::String).force_new(),
                Attribute::required("key", AttributeKind::String).force_new(),
                Attribute::required("user_data", AttributeKind::String),
                Attribute::optional("zone", AttributeKind::String).force_new(),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let zone = self.session.zone_or_default(config.zone);
        let server_uuid = expand_last_uuid(&config.server_id);
        let parent: uuid::Uuid = server_uuid
            .parse()
            .map_err(|_| validation("server_id", format!("not a UUID: {server_uuid}")))
            .in_operation(Operation::Create, Self::KIND, "")?;
        if config.key.is_empty() {
            return Err(ControllerError::new(
                Operation::Create,
                Self::KIND,
                "",
                validation("key", "must not be empty"),
            ));
        }
        let api = self.api(zone);
        api.set_user_data(&server_uuid, &config.key, &config.value)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = encode_nested(zone, &parent, &config.key);
        Ok((
            id.clone(),
            UserDataSnapshot {
                id,
                server_id: server_uuid,
                key: config.key.clone(),
                value: config.value.clone(),
            },
        ))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, parent, key) =
            decode_nested(id).in_operation(Operation::Read, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(zone);
        let outcome = outcome_from(api.get_user_data(&parent.to_string(), &key).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(value) => ReadOutcome::Present(UserDataSnapshot {
                id: id.to_owned(),
                server_id: parent.to_string(),
                key,
                value,
            }),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, parent, key) =
            decode_nested(id).in_operation(Operation::Update, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(zone);
        api.set_user_data(&parent.to_string(), &key, &config.value)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(UserDataSnapshot {
            id: id.to_owned(),
            server_id: parent.to_string(),
            key,
            value: config.value.clone(),
        })
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, parent, key) =
            decode_nested(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        crate::controller::ignore_gone(
            api.delete_user_data(&parent.to_string(), &key).await,
            false,
        )
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::instance::{AttachedIp, Bootscript, ImageSummary, ResourceRef};

    const UUID_A: &str = "11111111-1111-4111-8111-111111111111";

    fn config() -> ServerConfig {
        ServerConfig {
            zone: Some(Zone::FrPar1),
            name: String::from("web-1"),
            commercial_type: String::from("DEV1-S"),
            image: format!("fr-par-1/{UUID_A}"),
            project_id: None,
            tags: vec![String::from("web")],
            security_group_id: None,
            state: ServerState::Running,
            force_reboot: false,
            dynamic_ip: true,
        }
    }

    fn remote() -> Server {
        Server {
            id: String::from(UUID_A),
            name: String::from("web-1"),
            state: String::from("running"),
            commercial_type: String::from("DEV1-S"),
            tags: vec![String::from("web")],
            image: Some(ImageSummary {
                id: String::from(UUID_A),
                name: String::from("debian-12"),
            }),
            public_ip: Some(AttachedIp {
                id: String::from("ip-id"),
                address: String::from("51.15.0.1"),
            }),
            security_group: Some(ResourceRef {
                id: String::from("sg-id"),
                name: String::from("default"),
            }),
            boot_type: String::from("local"),
            bootscript: Some(Bootscript {
                id: String::from("bs-id"),
                title: String::from("x86_64"),
            }),
            project: String::from("proj"),
            ..Server::default()
        }
    }

    #[rstest]
    fn create_request_expands_locality_qualified_references() {
        let request = build_create(&config(), String::from("proj"));
        assert_eq!(request.image, UUID_A);
        assert_eq!(request.dynamic_ip_required, Some(true));
        assert_eq!(request.project, "proj");
    }

    #[rstest]
    fn snapshot_reports_the_declared_state_form() {
        let mut server = remote();
        server.state = String::from("stopped in place");
        let snap = snapshot(Zone::FrPar1, &server);
        assert_eq!(snap.state, "standby");
        assert_eq!(snap.id, format!("fr-par-1/{UUID_A}"));
        assert_eq!(snap.bootscript_id, "bs-id");
        assert_eq!(snap.public_ip, "51.15.0.1");
    }

    #[rstest]
    fn image_change_is_detected_as_immutable() {
        let mut declared = config();
        declared.image = String::from("22222222-2222-4222-8222-222222222222");
        assert_eq!(immutable_change(&declared, &remote()), Some("image"));
    }

    #[rstest]
    fn type_change_is_detected_as_immutable() {
        let mut declared = config();
        declared.commercial_type = String::from("DEV1-L");
        assert_eq!(immutable_change(&declared, &remote()), Some("type"));
    }

    #[rstest]
    fn matching_config_has_no_immutable_change() {
        assert_eq!(immutable_change(&config(), &remote()), None);
    }

    #[rstest]
    fn gone_statuses_fold_into_observations() {
        let err = ApiError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(matches!(
            outcome_observation::<Server>(Err(err)),
            Ok(Observation::Gone)
        ));
    }
}
