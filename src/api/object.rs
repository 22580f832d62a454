//! Object storage API: buckets.
//!
//! Buckets live in a region that may differ from the session default; the
//! session hands this module a region-scoped client.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;
use crate::wait::HasStatus;

/// Client for the region-scoped object storage control API.
#[derive(Clone, Debug)]
pub struct ObjectApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// A storage bucket.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Bucket {
    /// Bucket name; globally unique.
    pub name: String,
    /// Canned ACL applied to the bucket.
    #[serde(default)]
    pub acl: String,
    /// Tags attached to the bucket.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether object versioning is enabled.
    #[serde(default)]
    pub versioning_enabled: bool,
    /// Endpoint serving the bucket.
    #[serde(default)]
    pub endpoint: String,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for Bucket {
    fn status(&self) -> &str {
        "available"
    }
}

impl ObjectApi {
    /// Builds a client over a region-scoped [`ApiClient`].
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    /// Returns the region this client targets.
    #[must_use]
    pub const fn region(&self) -> Region {
        self.region
    }

    fn base(&self) -> String {
        format!("/object/v1/regions/{}", self.region)
    }

    /// Creates a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_bucket(&self, body: &serde_json::Value) -> Result<Bucket, ApiError> {
        self.client
            .post(&format!("{}/buckets", self.base()), body)
            .await
    }

    /// Fetches one bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the bucket is gone.
    pub async fn get_bucket(&self, name: &str) -> Result<Bucket, ApiError> {
        self.client
            .get(&format!("{}/buckets/{name}", self.base()), &[])
            .await
    }

    /// Patches a bucket (ACL, tags, versioning).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_bucket(
        &self,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<Bucket, ApiError> {
        self.client
            .patch(&format!("{}/buckets/{name}", self.base()), body)
            .await
    }

    /// Deletes a bucket. The bucket must be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_bucket(&self, name: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/buckets/{name}", self.base()))
            .await
    }
}
