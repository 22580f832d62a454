//! Object-storage bucket controller.
//!
//! Bucket names are globally unique and not UUIDs, so identifiers here are
//! `{region}/{name}` parsed locally rather than through the UUID codec.
//! The control API lives on a per-region endpoint; the session hands out a
//! rebased client for whichever region the bucket is declared in.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::api::object::{Bucket, ObjectApi};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, OperationError, ReadOutcome,
    ResourceController, WithOperation,
};
use crate::locality::Region;
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::{Session, SessionError};
use crate::wait::OperationContext;

use super::validation;

fn session_failure(err: SessionError) -> OperationError {
    match err {
        SessionError::Api(api) => OperationError::Api(api),
        other => validation("region", other.to_string()),
    }
}

/// Splits a `{region}/{name}` bucket identifier.
fn parse_bucket_id(id: &str) -> Result<(Region, &str), OperationError> {
    let Some((scope, name)) = id.split_once('/') else {
        return Err(validation(
            "id",
            format!("bucket identifier {id} is not region/name"),
        ));
    };
    if name.is_empty() {
        return Err(validation(
            "id",
            format!("bucket identifier {id} has an empty name"),
        ));
    }
    let region = Region::from_str(scope)?;
    Ok((region, name))
}

/// Declared configuration for a bucket.
#[derive(Clone, Debug)]
pub struct ObjectBucketConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Project override.
    pub project_id: Option<String>,
    /// Bucket name; globally unique, immutable.
    pub name: String,
    /// Canned ACL.
    pub acl: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether object versioning is enabled.
    pub versioning_enabled: bool,
}

impl Default for ObjectBucketConfig {
    fn default() -> Self {
        Self {
            region: None,
            project_id: None,
            name: String::new(),
            acl: String::from("private"),
            tags: Vec::new(),
            versioning_enabled: false,
        }
    }
}

/// State snapshot for a bucket.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ObjectBucketSnapshot {
    /// `{region}/{name}` identifier.
    pub id: String,
    /// Bucket name.
    pub name: String,
    /// Canned ACL.
    pub acl: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether object versioning is enabled.
    pub versioning_enabled: bool,
    /// Endpoint serving the bucket.
    pub endpoint: String,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(region: Region, bucket: &Bucket) -> ObjectBucketSnapshot {
    ObjectBucketSnapshot {
        id: format!("{region}/{}", bucket.name),
        name: bucket.name.clone(),
        acl: bucket.acl.clone(),
        tags: bucket.tags.clone(),
        versioning_enabled: bucket.versioning_enabled,
        endpoint: bucket.endpoint.clone(),
        project_id: bucket.project_id.clone(),
    }
}

/// Controller for `scaleway_object_bucket`.
pub struct ObjectBucketController {
    session: Arc<Session>,
}

impl ObjectBucketController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> Result<ObjectApi, OperationError> {
        let client = self
            .session
            .api_for_region(region)
            .map_err(session_failure)?;
        Ok(ObjectApi::new(client, region))
    }
}

#[async_trait]
impl ResourceController for ObjectBucketController {
    type Config = ObjectBucketConfig;
    type State = ObjectBucketSnapshot;

    const KIND: &'static str = "scaleway_object_bucket";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String).force_new(),
                Attribute::optional("acl", AttributeKind::String),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::optional("versioning_enabled", AttributeKind::Bool),
                Attribute::computed("endpoint", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.name.is_empty() {
            return Err(validation("name", "bucket name must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self
            .api(region)
            .in_operation(Operation::Create, Self::KIND, "")?;
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %region, name = %config.name, "creating bucket");
        let body = json!({
            "name": config.name,
            "project_id": project,
            "acl": config.acl,
            "tags": config.tags,
            "versioning_enabled": config.versioning_enabled,
        });
        let bucket = api
            .create_bucket(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", bucket.name);
        Ok((id, snapshot(region, &bucket)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (region, name) = parse_bucket_id(id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self
            .api(region)
            .in_operation(Operation::Read, Self::KIND, id)?;
        let outcome = outcome_from(api.get_bucket(name).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(bucket) => ReadOutcome::Present(snapshot(region, &bucket)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (region, name) = parse_bucket_id(id).in_operation(Operation::Update, Self::KIND, id)?;
        if !config.name.is_empty() && config.name != name {
            return Err(OperationError::Immutable {
                attribute: String::from("name"),
            })
            .in_operation(Operation::Update, Self::KIND, id);
        }
        let api = self
            .api(region)
            .in_operation(Operation::Update, Self::KIND, id)?;
        let body = json!({
            "acl": config.acl,
            "tags": config.tags,
            "versioning_enabled": config.versioning_enabled,
        });
        let bucket = api
            .update_bucket(name, &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(region, &bucket))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (region, name) = parse_bucket_id(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self
            .api(region)
            .in_operation(Operation::Delete, Self::KIND, id)?;
        info!(kind = Self::KIND, %region, "deleting bucket");
        ignore_gone(api.delete_bucket(name).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn bucket_ids_parse_region_and_name() {
        let (region, name) = parse_bucket_id("nl-ams/static-assets").unwrap();
        assert_eq!(region, Region::NlAms);
        assert_eq!(name, "static-assets");
    }

    #[rstest]
    #[case("static-assets")]
    #[case("fr-par/")]
    #[case("xx-yyy-1/static-assets")]
    fn malformed_bucket_ids_are_rejected(#[case] id: &str) {
        assert!(parse_bucket_id(id).is_err());
    }

    #[rstest]
    fn snapshot_id_uses_the_name_not_a_uuid() {
        let bucket = Bucket {
            name: String::from("static-assets"),
            acl: String::from("private"),
            tags: vec![],
            versioning_enabled: true,
            endpoint: String::from("https://static-assets.s3.fr-par.scw.cloud"),
            project_id: String::from("proj"),
        };
        assert_eq!(snapshot(Region::FrPar, &bucket).id, "fr-par/static-assets");
    }

    #[rstest]
    fn default_acl_is_private() {
        assert_eq!(ObjectBucketConfig::default().acl, "private");
    }
}
