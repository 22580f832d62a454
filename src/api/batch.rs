//! Serverless Jobs (batch) API: job definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;
use crate::wait::HasStatus;

/// Client for the region-scoped Jobs API.
#[derive(Clone, Debug)]
pub struct BatchApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// A batch job definition.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct JobDefinition {
    /// Definition identifier.
    pub id: String,
    /// Definition name.
    pub name: String,
    /// Container image to run.
    #[serde(default)]
    pub image_uri: String,
    /// Command executed in the container.
    #[serde(default)]
    pub command: String,
    /// Millicpu limit.
    #[serde(default)]
    pub cpu_limit: u32,
    /// Memory limit in MiB.
    #[serde(default)]
    pub memory_limit: u32,
    /// Maximum run duration, rendered as seconds by the API.
    #[serde(default)]
    pub job_timeout: Option<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for JobDefinition {
    fn status(&self) -> &str {
        "ready"
    }
}

impl BatchApi {
    /// Builds a client for the given region.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    fn base(&self) -> String {
        format!("/serverless-jobs/v1alpha1/regions/{}", self.region)
    }

    /// Creates a job definition.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_definition(
        &self,
        body: &serde_json::Value,
    ) -> Result<JobDefinition, ApiError> {
        self.client
            .post(&format!("{}/job-definitions", self.base()), body)
            .await
    }

    /// Fetches one definition.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the definition is gone.
    pub async fn get_definition(&self, id: &str) -> Result<JobDefinition, ApiError> {
        self.client
            .get(&format!("{}/job-definitions/{id}", self.base()), &[])
            .await
    }

    /// Patches a definition.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_definition(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<JobDefinition, ApiError> {
        self.client
            .patch(&format!("{}/job-definitions/{id}", self.base()), body)
            .await
    }

    /// Deletes a definition.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_definition(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/job-definitions/{id}", self.base()))
            .await
    }
}
