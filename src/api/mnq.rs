//! Messaging and Queuing (MnQ) API: SQS credentials.
//!
//! The secret half of a credential set is returned exactly once, on
//! creation; it is stored in engine state as a sensitive attribute and
//! never logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;

/// Client for the region-scoped MnQ SQS API.
#[derive(Clone, Debug)]
pub struct MnqApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// Per-credential permissions.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MnqPermissions {
    /// Whether messages may be published.
    #[serde(default)]
    pub can_publish: bool,
    /// Whether messages may be received.
    #[serde(default)]
    pub can_receive: bool,
    /// Whether queues may be managed.
    #[serde(default)]
    pub can_manage: bool,
}

/// A credential set.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MnqCredentials {
    /// Credential identifier.
    pub id: String,
    /// Credential name.
    pub name: String,
    /// Access key half of the pair.
    #[serde(default)]
    pub access_key: String,
    /// Secret key half; present only in the creation response.
    pub secret_key: Option<String>,
    /// Permissions attached to the pair.
    #[serde(default)]
    pub permissions: MnqPermissions,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl MnqApi {
    /// Builds a client for the given region.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    fn base(&self) -> String {
        format!("/mnq/v1beta1/regions/{}", self.region)
    }

    /// Creates a credential set; the response carries the secret key once.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_credentials(
        &self,
        project: &str,
        name: &str,
        permissions: MnqPermissions,
    ) -> Result<MnqCredentials, ApiError> {
        let body = serde_json::json!({
            "project_id": project,
            "name": name,
            "permissions": permissions,
        });
        self.client
            .post(&format!("{}/sqs-credentials", self.base()), &body)
            .await
    }

    /// Fetches one credential set; the secret key is absent here.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the credentials are gone.
    pub async fn get_credentials(&self, id: &str) -> Result<MnqCredentials, ApiError> {
        self.client
            .get(&format!("{}/sqs-credentials/{id}", self.base()), &[])
            .await
    }

    /// Patches a credential set (name, permissions).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_credentials(
        &self,
        id: &str,
        name: Option<&str>,
        permissions: Option<MnqPermissions>,
    ) -> Result<MnqCredentials, ApiError> {
        let mut body = serde_json::Map::new();
        if let Some(name) = name {
            body.insert(String::from("name"), serde_json::json!(name));
        }
        if let Some(permissions) = permissions {
            body.insert(String::from("permissions"), serde_json::json!(permissions));
        }
        self.client
            .patch(&format!("{}/sqs-credentials/{id}", self.base()), &body)
            .await
    }

    /// Revokes a credential set.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_credentials(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/sqs-credentials/{id}", self.base()))
            .await
    }
}
