//! Apple silicon API: dedicated M-series servers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Zone;
use crate::wait::HasStatus;

/// Client for the zone-scoped Apple silicon API.
#[derive(Clone, Debug)]
pub struct AppleSiliconApi {
    client: Arc<ApiClient>,
    zone: Zone,
}

/// An Apple silicon server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AppleSiliconServer {
    /// Server identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Hardware type (for example `M2-M`).
    #[serde(rename = "type", default)]
    pub server_type: String,
    /// Lifecycle status (`ready`, `starting`, `rebooting`, `error`).
    pub status: String,
    /// Public IP assigned to the server.
    #[serde(default)]
    pub ip: String,
    /// VNC endpoint.
    #[serde(default)]
    pub vnc_url: String,
    /// Earliest instant the server may be deleted (24h minimum lease).
    pub deletable_at: Option<DateTime<Utc>>,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for AppleSiliconServer {
    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: AppleSiliconServer,
}

impl AppleSiliconApi {
    /// Builds a client for the given zone.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, zone: Zone) -> Self {
        Self { client, zone }
    }

    fn base(&self) -> String {
        format!("/apple-silicon/v1alpha1/zones/{}", self.zone)
    }

    /// Provisions a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_server(
        &self,
        project: &str,
        name: &str,
        server_type: &str,
    ) -> Result<AppleSiliconServer, ApiError> {
        let body = serde_json::json!({
            "project_id": project,
            "name": name,
            "type": server_type,
        });
        let envelope: ServerEnvelope = self
            .client
            .post(&format!("{}/servers", self.base()), &body)
            .await?;
        Ok(envelope.server)
    }

    /// Fetches one server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the server is gone.
    pub async fn get_server(&self, id: &str) -> Result<AppleSiliconServer, ApiError> {
        let envelope: ServerEnvelope = self
            .client
            .get(&format!("{}/servers/{id}", self.base()), &[])
            .await?;
        Ok(envelope.server)
    }

    /// Renames a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_server(&self, id: &str, name: &str) -> Result<AppleSiliconServer, ApiError> {
        let body = serde_json::json!({ "name": name });
        let envelope: ServerEnvelope = self
            .client
            .patch(&format!("{}/servers/{id}", self.base()), &body)
            .await?;
        Ok(envelope.server)
    }

    /// Reboots a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn reboot_server(&self, id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({});
        let _: serde_json::Value = self
            .client
            .post(&format!("{}/servers/{id}/reboot", self.base()), &body)
            .await?;
        Ok(())
    }

    /// Deletes a server. The API refuses deletion before `deletable_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_server(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/servers/{id}", self.base()))
            .await
    }
}
