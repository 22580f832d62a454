//! Messaging-and-Queuing credential controller.
//!
//! The API returns the secret key exactly once, in the creation response.
//! The controller keeps that value in state as a sensitive attribute and
//! never lets a later read, which carries no secret, blank it out. Nothing
//! here logs the secret or the access key.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::mnq::{MnqApi, MnqCredentials, MnqPermissions};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, Region};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::OperationContext;

use super::{region_scope, validation};

/// Declared configuration for an SQS credential set.
#[derive(Clone, Debug, Default)]
pub struct MnqCredentialsConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Project override.
    pub project_id: Option<String>,
    /// Credential name.
    pub name: String,
    /// Permissions attached to the pair.
    pub permissions: MnqPermissions,
}

/// State snapshot for an SQS credential set.
///
/// `secret_key` is populated on create and preserved verbatim afterwards.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MnqCredentialsSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Credential name.
    pub name: String,
    /// Access key half of the pair.
    pub access_key: String,
    /// Secret key half; sensitive, known only from creation.
    pub secret_key: String,
    /// Permissions attached to the pair.
    pub permissions: MnqPermissions,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(region: Region, creds: &MnqCredentials, secret_key: String) -> MnqCredentialsSnapshot {
    MnqCredentialsSnapshot {
        id: format!("{region}/{}", creds.id),
        name: creds.name.clone(),
        access_key: creds.access_key.clone(),
        secret_key,
        permissions: creds.permissions,
        project_id: creds.project_id.clone(),
    }
}

/// Merges a fresh observation with the secret retained from creation.
///
/// Reads never carry the secret; the retained value wins whenever the
/// response omits it. The engine calls this when refreshing stored state
/// so the one-shot secret survives every refresh.
#[must_use]
pub fn merge_secret(observed: &MnqCredentials, retained: &str) -> String {
    observed
        .secret_key
        .clone()
        .unwrap_or_else(|| retained.to_owned())
}

/// Controller for `scaleway_mnq_sqs_credentials`.
pub struct MnqCredentialsController {
    session: Arc<Session>,
}

impl MnqCredentialsController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> MnqApi {
        MnqApi::new(self.session.api(), region)
    }
}

#[async_trait]
impl ResourceController for MnqCredentialsController {
    type Config = MnqCredentialsConfig;
    type State = MnqCredentialsSnapshot;

    const KIND: &'static str = "scaleway_mnq_sqs_credentials";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::optional("permissions", AttributeKind::StringMap),
                Attribute::computed("access_key", AttributeKind::String),
                Attribute::computed("secret_key", AttributeKind::String).sensitive(),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.name.is_empty() {
            return Err(validation("name", "credential name must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %region, name = %config.name, "creating SQS credentials");
        let creds = api
            .create_credentials(&project, &config.name, config.permissions)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", creds.id);
        let secret = creds.secret_key.clone().unwrap_or_default();
        Ok((id, snapshot(region, &creds, secret)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_credentials(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            // The read response never carries the secret; the engine keeps
            // the previously stored value for this attribute.
            ReadOutcome::Present(creds) => {
                let secret = creds.secret_key.clone().unwrap_or_default();
                ReadOutcome::Present(snapshot(region, &creds, secret))
            }
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
        let creds = api
            .update_credentials(
                &uuid.to_string(),
                Some(config.name.as_str()),
                Some(config.permissions),
            )
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let secret = creds.secret_key.clone().unwrap_or_default();
        Ok(snapshot(region, &creds, secret))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        info!(kind = Self::KIND, %region, "revoking SQS credentials");
        ignore_gone(api.delete_credentials(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn creds(secret: Option<&str>) -> MnqCredentials {
        MnqCredentials {
            id: String::from("77777777-7777-4777-8777-777777777777"),
            name: String::from("workers"),
            access_key: String::from("SCWXXXXXXXXXXXXXXXXX"),
            secret_key: secret.map(str::to_owned),
            permissions: MnqPermissions {
                can_publish: true,
                can_receive: true,
                can_manage: false,
            },
            project_id: String::from("proj"),
        }
    }

    #[rstest]
    fn the_retained_secret_survives_a_read_without_one() {
        let observed = creds(None);
        assert_eq!(merge_secret(&observed, "retained-secret"), "retained-secret");
    }

    #[rstest]
    fn a_fresh_secret_replaces_the_retained_one() {
        let observed = creds(Some("fresh-secret"));
        assert_eq!(merge_secret(&observed, "retained-secret"), "fresh-secret");
    }

    #[rstest]
    fn secret_is_marked_sensitive_in_the_schema() {
        let client = crate::api::ApiClient::new(
            crate::api::Credentials {
                access_key: None,
                secret_key: String::from("secret"),
                default_project_id: String::from("proj"),
                default_organization_id: None,
            },
            crate::transport::RetryPolicy::default(),
        )
        .expect("client");
        let session = Arc::new(Session::from_client(
            Arc::new(client),
            crate::locality::Zone::FrPar1,
        ));
        let controller = MnqCredentialsController::new(session);
        let schema = controller.schema();
        let secret = schema
            .attributes
            .iter()
            .find(|attribute| attribute.name == "secret_key")
            .unwrap();
        assert!(secret.sensitive);
        let access = schema
            .attributes
            .iter()
            .find(|attribute| attribute.name == "access_key")
            .unwrap();
        assert!(!access.sensitive);
    }
}
