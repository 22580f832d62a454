//! Serverless-jobs definition controller.
//!
//! Job timeouts are declared in seconds but rendered by the API as a
//! `"{n}s"` duration string; both directions are normalised here so a
//! settled definition compares clean against its configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::api::batch::{BatchApi, JobDefinition};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::locality::{decode, Region};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::OperationContext;

use super::{region_scope, validation};

/// Declared configuration for a job definition.
#[derive(Clone, Debug)]
pub struct BatchJobConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Project override.
    pub project_id: Option<String>,
    /// Definition name.
    pub name: String,
    /// Container image to run.
    pub image_uri: String,
    /// Command executed in the container.
    pub command: String,
    /// Millicpu limit.
    pub cpu_limit: u32,
    /// Memory limit in MiB.
    pub memory_limit: u32,
    /// Maximum run duration in seconds; zero means no limit.
    pub timeout_seconds: u64,
}

impl Default for BatchJobConfig {
    fn default() -> Self {
        Self {
            region: None,
            project_id: None,
            name: String::new(),
            image_uri: String::new(),
            command: String::new(),
            cpu_limit: 1000,
            memory_limit: 1024,
            timeout_seconds: 0,
        }
    }
}

/// State snapshot for a job definition.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchJobSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Definition name.
    pub name: String,
    /// Container image.
    pub image_uri: String,
    /// Command executed in the container.
    pub command: String,
    /// Millicpu limit.
    pub cpu_limit: u32,
    /// Memory limit in MiB.
    pub memory_limit: u32,
    /// Maximum run duration in seconds; zero means no limit.
    pub timeout_seconds: u64,
    /// Owning project.
    pub project_id: String,
}

/// Renders a timeout for the wire; `None` when unlimited.
fn wire_timeout(seconds: u64) -> Option<String> {
    (seconds > 0).then(|| format!("{seconds}s"))
}

/// Parses the API's `"{n}s"` duration rendering; zero when absent or odd.
fn parse_timeout(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.strip_suffix('s'))
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

fn snapshot(region: Region, definition: &JobDefinition) -> BatchJobSnapshot {
    BatchJobSnapshot {
        id: format!("{region}/{}", definition.id),
        name: definition.name.clone(),
        image_uri: definition.image_uri.clone(),
        command: definition.command.clone(),
        cpu_limit: definition.cpu_limit,
        memory_limit: definition.memory_limit,
        timeout_seconds: parse_timeout(definition.job_timeout.as_deref()),
        project_id: definition.project_id.clone(),
    }
}

/// Controller for `scaleway_job_definition`.
pub struct BatchJobController {
    session: Arc<Session>,
}

impl BatchJobController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> BatchApi {
        BatchApi::new(self.session.api(), region)
    }
}

fn request_body(config: &BatchJobConfig, project: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "name": config.name,
        "image_uri": config.image_uri,
        "command": config.command,
        "cpu_limit": config.cpu_limit,
        "memory_limit": config.memory_limit,
    });
    if let Some(timeout) = wire_timeout(config.timeout_seconds) {
        body["job_timeout"] = json!(timeout);
    }
    if let Some(project) = project {
        body["project_id"] = json!(project);
    }
    body
}

#[async_trait]
impl ResourceController for BatchJobController {
    type Config = BatchJobConfig;
    type State = BatchJobSnapshot;

    const KIND: &'static str = "scaleway_job_definition";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::required("image_uri", AttributeKind::String),
                Attribute::optional("command", AttributeKind::String),
                Attribute::optional("cpu_limit", AttributeKind::Int),
                Attribute::optional("memory_limit", AttributeKind::Int),
                Attribute::optional("timeout_seconds", AttributeKind::Int),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.image_uri.is_empty() {
            return Err(validation("image_uri", "image_uri must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %region, name = %config.name, "creating job definition");
        let body = request_body(config, Some(&project));
        let definition = api
            .create_definition(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", definition.id);
        Ok((id, snapshot(region, &definition)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_definition(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(definition) => {
                ReadOutcome::Present(snapshot(region, &definition))
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
        let body = request_body(config, None);
        let definition = api
            .update_definition(&uuid.to_string(), &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(region, &definition))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        info!(kind = Self::KIND, %region, "deleting job definition");
        ignore_gone(api.delete_definition(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, None)]
    #[case(90, Some("90s"))]
    #[case(3600, Some("3600s"))]
    fn timeouts_render_in_seconds(#[case] seconds: u64, #[case] expected: Option<&str>) {
        assert_eq!(wire_timeout(seconds).as_deref(), expected);
    }

    #[rstest]
    #[case(None, 0)]
    #[case(Some("90s"), 90)]
    #[case(Some("bogus"), 0)]
    #[case(Some("12m"), 0)]
    fn timeouts_parse_back(#[case] raw: Option<&str>, #[case] expected: u64) {
        assert_eq!(parse_timeout(raw), expected);
    }

    #[rstest]
    fn snapshot_round_trips_the_timeout() {
        let definition = JobDefinition {
            id: String::from("88888888-8888-4888-8888-888888888888"),
            name: String::from("nightly-export"),
            image_uri: String::from("rg.fr-par.scw.cloud/ns/export:latest"),
            command: String::from("/app/export"),
            cpu_limit: 2000,
            memory_limit: 2048,
            job_timeout: Some(String::from("600s")),
            project_id: String::from("proj"),
        };
        let snap = snapshot(Region::FrPar, &definition);
        assert_eq!(snap.timeout_seconds, 600);
        assert_eq!(snap.id, "fr-par/88888888-8888-4888-8888-888888888888");
    }
}
