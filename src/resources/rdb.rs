//! Managed database controllers: instance, logical database, and user.
//!
//! Databases and users are nested resources identified by
//! `{region}/{instance-uuid}/{name}`. The API serializes operations per
//! instance and answers 409 while a sibling operation is in flight;
//! creates and updates retry after waiting for the parent instance to
//! settle, bounded by the operation deadline.
//!
//! User passwords are sensitive: they are stored in state and sent on the
//! wire, but never logged and never read back.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::rdb::{RdbApi, RdbInstance};
use crate::api::ApiError;
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, OperationError, ReadOutcome,
    ResourceController, WithOperation,
};
use crate::locality::{decode, decode_nested, encode_nested, expand_last_uuid, Region};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::{region_scope, validation};

const READY: [&str; 1] = ["ready"];
const FAILED: [&str; 2] = ["error", "disk_full"];

fn observation(result: Result<RdbInstance, ApiError>) -> Result<Observation<RdbInstance>, ApiError> {
    match result {
        Ok(instance) => Ok(Observation::Present(instance)),
        Err(err) if err.is_gone(false) => Ok(Observation::Gone),
        Err(err) => Err(err),
    }
}

/// Waits for the parent instance to be ready.
async fn wait_parent_ready(
    ctx: &OperationContext,
    api: &RdbApi,
    instance_id: &str,
) -> Result<RdbInstance, OperationError> {
    let instance = wait_for_status(ctx, DEFAULT_POLL_INTERVAL, &READY, &FAILED, || async {
        observation(api.get_instance(instance_id).await)
    })
    .await?;
    Ok(instance)
}

/// Runs a nested create/update call, retrying 409 conflicts after the
/// parent instance settles again. A sibling database or user operation on
/// the same instance holds the remote lock; the conflict clears once it
/// finishes.
async fn retry_on_conflict<T, F, Fut>(
    ctx: &OperationContext,
    api: &RdbApi,
    instance_id: &str,
    mut call: F,
) -> Result<T, OperationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() => {
                if ctx.expired() {
                    return Err(OperationError::Conflict {
                        message: err.to_string(),
                    });
                }
                debug!(instance = instance_id, "conflict on nested operation, waiting for parent");
                wait_parent_ready(ctx, api, instance_id).await?;
                ctx.pause(DEFAULT_POLL_INTERVAL).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Declared configuration for a database instance.
#[derive(Clone, Debug, Default)]
pub struct RdbInstanceConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Instance name.
    pub name: String,
    /// Engine and version, immutable downgrade-wise.
    pub engine: String,
    /// Node type.
    pub node_type: String,
    /// Whether to provision a standby node.
    pub is_ha_cluster: bool,
    /// Initial admin user name; sent at create only.
    pub user_name: String,
    /// Initial admin password; sensitive, sent at create only.
    pub password: String,
    /// Project override.
    pub project_id: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
}

/// State snapshot for a database instance. The admin password is written
/// back from configuration, never from the remote.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RdbInstanceSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Lifecycle status.
    pub status: String,
    /// Engine and version.
    pub engine: String,
    /// Node type.
    pub node_type: String,
    /// Whether a standby node is provisioned.
    pub is_ha_cluster: bool,
    /// Tags.
    pub tags: Vec<String>,
    /// Owning project.
    pub project_id: String,
}

fn instance_snapshot(region: Region, instance: &RdbInstance) -> RdbInstanceSnapshot {
    RdbInstanceSnapshot {
        id: format!("{region}/{}", instance.id),
        name: instance.name.clone(),
        status: instance.status.clone(),
        engine: instance.engine.clone(),
        node_type: instance.node_type.clone(),
        is_ha_cluster: instance.is_ha_cluster,
        tags: instance.tags.clone(),
        project_id: instance.project_id.clone(),
    }
}

/// Controller for `scaleway_rdb_instance`.
pub struct RdbInstanceController {
    session: Arc<Session>,
}

impl RdbInstanceController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> RdbApi {
        RdbApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for RdbInstanceController {
    type Config = RdbInstanceConfig;
    type State = RdbInstanceSnapshot;

    const KIND: &'static str = "scaleway_rdb_instance";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("name", AttributeKind::String),
                Attribute::required("engine", AttributeKind::String).force_new(),
                Attribute::required("node_type", AttributeKind::String),
                Attribute::required("user_name", AttributeKind::String).force_new(),
                Attribute::required("password", AttributeKind::String).sensitive(),
                Attribute::optional("is_ha_cluster", AttributeKind::Bool),
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::computed("status", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        // The password rides in the body; only the name is logged.
        info!(kind = Self::KIND, %region, name = %config.name, "creating database instance");
        let body = serde_json::json!({
            "name": config.name,
            "engine": config.engine,
            "node_type": config.node_type,
            "is_ha_cluster": config.is_ha_cluster,
            "user_name": config.user_name,
            "password": config.password,
            "project_id": project,
            "tags": config.tags,
        });
        let instance = api
            .create_instance(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", instance.id);
        let settled = wait_parent_ready(ctx, &api, &instance.id)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, instance_snapshot(region, &settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_instance(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(instance) => {
                ReadOutcome::Present(instance_snapshot(region, &instance))
            }
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
        let instance_id = uuid.to_string();
        wait_parent_ready(ctx, &api, &instance_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let body = serde_json::json!({
            "name": config.name,
            "tags": config.tags,
        });
        api.update_instance(&instance_id, &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let settled = wait_parent_ready(ctx, &api, &instance_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(instance_snapshot(region, &settled))
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        let instance_id = uuid.to_string();
        match wait_parent_ready(ctx, &api, &instance_id).await {
            Ok(_) => {}
            // Already gone; nothing left to delete.
            Err(OperationError::Wait(crate::wait::WaitError::Vanished)) => return Ok(()),
            Err(err) => return Err(err).in_operation(Operation::Delete, Self::KIND, id),
        }
        info!(kind = Self::KIND, %region, "deleting database instance");
        ignore_gone(api.delete_instance(&instance_id).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)?;
        wait_for_gone::<RdbInstance, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            observation(api.get_instance(&instance_id).await)
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// Declared configuration for a logical database.
#[derive(Clone, Debug, Default)]
pub struct RdbDatabaseConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Parent instance, bare UUID or locality-qualified.
    pub instance_id: String,
    /// Database name.
    pub name: String,
}

/// State snapshot for a logical database.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RdbDatabaseSnapshot {
    /// Nested identifier `{region}/{instance-uuid}/{name}`.
    pub id: String,
    /// Parent instance UUID.
    pub instance_id: String,
    /// Database name.
    pub name: String,
    /// Owning user.
    pub owner: String,
    /// Whether the platform manages this database.
    pub managed: bool,
}

/// Controller for `scaleway_rdb_database`.
pub struct RdbDatabaseController {
    session: Arc<Session>,
}

impl RdbDatabaseController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> RdbApi {
        RdbApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for RdbDatabaseController {
    type Config = RdbDatabaseConfig;
    type State = RdbDatabaseSnapshot;

    const KIND: &'static str = "scaleway_rdb_database";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("instance_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String).force_new(),
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::computed("owner", AttributeKind::String),
                Attribute::computed("managed", AttributeKind::Bool),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let instance_uuid = expand_last_uuid(&config.instance_id);
        let parent: uuid::Uuid = instance_uuid
            .parse()
            .map_err(|_| validation("instance_id", format!("not a UUID: {instance_uuid}")))
            .in_operation(Operation::Create, Self::KIND, "")?;
        info!(kind = Self::KIND, %region, name = %config.name, "creating database");
        let database = retry_on_conflict(ctx, &api, &instance_uuid, || {
            api.create_database(&instance_uuid, &config.name)
        })
        .await
        .in_operation(Operation::Create, Self::KIND, "")?;
        let id = encode_nested(region, &parent, &database.name);
        Ok((
            id.clone(),
            RdbDatabaseSnapshot {
                id,
                instance_id: instance_uuid,
                name: database.name,
                owner: database.owner,
                managed: database.managed,
            },
        ))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, parent, name) =
            decode_nested(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let instance_id = parent.to_string();
        let outcome = outcome_from(api.list_databases(&instance_id, Some(&name)).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        let databases = match outcome {
            ReadOutcome::Present(databases) => databases,
            // Parent instance deleted means the database is gone too.
            ReadOutcome::Gone => return Ok(ReadOutcome::Gone),
        };
        Ok(databases
            .into_iter()
            .find(|database| database.name == name)
            .map_or(ReadOutcome::Gone, |database| {
                ReadOutcome::Present(RdbDatabaseSnapshot {
                    id: id.to_owned(),
                    instance_id: instance_id.clone(),
                    name: database.name,
                    owner: database.owner,
                    managed: database.managed,
                })
            }))
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        _config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        // Databases have no mutable attributes; every change forces a
        // recreate at plan time.
        Err(ControllerError::new(
            Operation::Update,
            Self::KIND,
            id,
            OperationError::Immutable {
                attribute: String::from("name"),
            },
        ))
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, parent, name) =
            decode_nested(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        let instance_id = parent.to_string();
        let result = retry_on_conflict(ctx, &api, &instance_id, || {
            api.delete_database(&instance_id, &name)
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(OperationError::Api(err)) if err.is_gone(false) => Ok(()),
            Err(OperationError::Wait(crate::wait::WaitError::Vanished)) => Ok(()),
            Err(err) => Err(err).in_operation(Operation::Delete, Self::KIND, id),
        }
    }
}

/// Declared configuration for a database user.
#[derive(Clone, Debug, Default)]
pub struct RdbUserConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Parent instance, bare UUID or locality-qualified.
    pub instance_id: String,
    /// User name.
    pub name: String,
    /// Password; sensitive, stored in state but never logged.
    pub password: String,
    /// Whether the user holds admin rights.
    pub is_admin: bool,
}

/// State snapshot for a database user. The password is written back from
/// configuration; the remote never returns it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RdbUserSnapshot {
    /// Nested identifier `{region}/{instance-uuid}/{name}`.
    pub id: String,
    /// Parent instance UUID.
    pub instance_id: String,
    /// User name.
    pub name: String,
    /// Whether the user holds admin rights.
    pub is_admin: bool,
}

/// Controller for `scaleway_rdb_user`.
pub struct RdbUserController {
    session: Arc<Session>,
}

impl RdbUserController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> RdbApi {
        RdbApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for RdbUserController {
    type Config = RdbUserConfig;
    type State = RdbUserSnapshot;

    const KIND: &'static str = "scaleway_rdb_user";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("instance_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String).force_new(),
                Attribute::required("password", AttributeKind::String).sensitive(),
                Attribute::optional("is_admin", AttributeKind::Bool),
                Attribute::optional("region", AttributeKind::String).force_new(),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let instance_uuid = expand_last_uuid(&config.instance_id);
        let parent: uuid::Uuid = instance_uuid
            .parse()
            .map_err(|_| validation("instance_id", format!("not a UUID: {instance_uuid}")))
            .in_operation(Operation::Create, Self::KIND, "")?;
        info!(kind = Self::KIND, %region, name = %config.name, "creating database user");
        let user = retry_on_conflict(ctx, &api, &instance_uuid, || {
            api.create_user(&instance_uuid, &config.name, &config.password, config.is_admin)
        })
        .await
        .in_operation(Operation::Create, Self::KIND, "")?;
        let id = encode_nested(region, &parent, &user.name);
        Ok((
            id.clone(),
            RdbUserSnapshot {
                id,
                instance_id: instance_uuid,
                name: user.name,
                is_admin: user.is_admin,
            },
        ))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, parent, name) =
            decode_nested(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let instance_id = parent.to_string();
        let outcome = outcome_from(api.list_users(&instance_id, Some(&name)).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        let users = match outcome {
            ReadOutcome::Present(users) => users,
            ReadOutcome::Gone => return Ok(ReadOutcome::Gone),
        };
        Ok(users
            .into_iter()
            .find(|user| user.name == name)
            .map_or(ReadOutcome::Gone, |user| {
                ReadOutcome::Present(RdbUserSnapshot {
                    id: id.to_owned(),
                    instance_id: instance_id.clone(),
                    name: user.name,
                    is_admin: user.is_admin,
                })
            }))
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, parent, name) =
            decode_nested(id).in_operation(Operation::Update, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(region);
        let instance_id = parent.to_string();
        let user = retry_on_conflict(ctx, &api, &instance_id, || {
            api.update_user(
                &instance_id,
                &name,
                Some(&config.password),
                Some(config.is_admin),
            )
        })
        .await
        .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(RdbUserSnapshot {
            id: id.to_owned(),
            instance_id,
            name: user.name,
            is_admin: user.is_admin,
        })
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, parent, name) =
            decode_nested(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        let instance_id = parent.to_string();
        let result = retry_on_conflict(ctx, &api, &instance_id, || {
            api.delete_user(&instance_id, &name)
        })
        .await;
        match result {
            Ok(()) => Ok(()),
            Err(OperationError::Api(err)) if err.is_gone(false) => Ok(()),
            Err(OperationError::Wait(crate::wait::WaitError::Vanished)) => Ok(()),
            Err(err) => Err(err).in_operation(Operation::Delete, Self::KIND, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::transport::RetryPolicy;

    fn api() -> RdbApi {
        let client = crate::api::ApiClient::new(
            crate::api::Credentials {
                access_key: None,
                secret_key: String::from("secret"),
                default_project_id: String::from("proj"),
                default_organization_id: None,
            },
            RetryPolicy::default(),
        )
        .expect("client");
        RdbApi::new(Arc::new(client), Region::FrPar)
    }

    #[rstest]
    fn instance_snapshot_is_region_qualified() {
        let instance = RdbInstance {
            id: String::from("11111111-1111-4111-8111-111111111111"),
            name: String::from("db-1"),
            status: String::from("ready"),
            engine: String::from("PostgreSQL-15"),
            node_type: String::from("db-dev-s"),
            is_ha_cluster: false,
            tags: vec![],
            project_id: String::from("proj"),
        };
        let snap = instance_snapshot(Region::PlWaw, &instance);
        assert_eq!(snap.id, "pl-waw/11111111-1111-4111-8111-111111111111");
    }

    #[tokio::test]
    async fn conflicts_stop_retrying_once_the_deadline_passes() {
        let ctx = OperationContext::with_deadline(std::time::Instant::now() - Duration::from_secs(1));
        let api = api();
        let calls = RefCell::new(0_u32);
        let result: Result<(), OperationError> =
            retry_on_conflict(&ctx, &api, "instance", || {
                *calls.borrow_mut() += 1;
                async {
                    Err(ApiError::Status {
                        status: 409,
                        body: String::from("instance busy"),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(OperationError::Conflict { .. })));
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn non_conflict_errors_are_not_retried() {
        let ctx = OperationContext::with_timeout(Duration::from_secs(5));
        let api = api();
        let calls = RefCell::new(0_u32);
        let result: Result<(), OperationError> =
            retry_on_conflict(&ctx, &api, "instance", || {
                *calls.borrow_mut() += 1;
                async {
                    Err(ApiError::Status {
                        status: 500,
                        body: String::new(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(OperationError::Api(_))));
        assert_eq!(*calls.borrow(), 1);
    }
}
