//! Flexible IP API (bare-metal flexible IPs, IPv4 and IPv6).
//!
//! Deleted flexible IPs surface as 403 on the get endpoint; callers must
//! treat that as "gone".

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Zone;
use crate::wait::HasStatus;

/// Client for the zone-scoped Flexible IP API.
#[derive(Clone, Debug)]
pub struct FlexipApi {
    client: Arc<ApiClient>,
    zone: Zone,
}

/// A flexible IP.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlexibleIp {
    /// Flexible IP identifier.
    pub id: String,
    /// Address with prefix, as booked.
    pub ip_address: String,
    /// Lifecycle status (`ready`, `updating`, `attached`, `error`).
    pub status: String,
    /// Reverse DNS name, when set.
    pub reverse: Option<String>,
    /// Server the IP is attached to, when any.
    pub server_id: Option<String>,
    /// Tags attached to the IP.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the address is IPv6.
    #[serde(default)]
    pub is_ipv6: bool,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for FlexibleIp {
    fn status(&self) -> &str {
        &self.status
    }
}

#[derive(Deserialize)]
struct FipEnvelope {
    flexible_ip: FlexibleIp,
}

impl FlexipApi {
    /// Builds a client for the given zone.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, zone: Zone) -> Self {
        Self { client, zone }
    }

    fn base(&self) -> String {
        format!("/flexible-ip/v1alpha1/zones/{}", self.zone)
    }

    /// Books a flexible IP.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_fip(
        &self,
        project: &str,
        description: &str,
        tags: &[String],
        is_ipv6: bool,
        server_id: Option<&str>,
    ) -> Result<FlexibleIp, ApiError> {
        let mut body = serde_json::json!({
            "project_id": project,
            "description": description,
            "tags": tags,
            "is_ipv6": is_ipv6,
        });
        if let (Some(map), Some(server)) = (body.as_object_mut(), server_id) {
            map.insert(String::from("server_id"), serde_json::json!(server));
        }
        let envelope: FipEnvelope = self
            .client
            .post(&format!("{}/fips", self.base()), &body)
            .await?;
        Ok(envelope.flexible_ip)
    }

    /// Fetches one flexible IP. Deleted IPs surface as 403 here.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; both 404 and 403 mean the IP is gone.
    pub async fn get_fip(&self, id: &str) -> Result<FlexibleIp, ApiError> {
        let envelope: FipEnvelope = self
            .client
            .get(&format!("{}/fips/{id}", self.base()), &[])
            .await?;
        Ok(envelope.flexible_ip)
    }

    /// Patches a flexible IP (reverse, tags).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_fip(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<FlexibleIp, ApiError> {
        let envelope: FipEnvelope = self
            .client
            .patch(&format!("{}/fips/{id}", self.base()), body)
            .await?;
        Ok(envelope.flexible_ip)
    }

    /// Attaches the IP to a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn attach_fip(&self, id: &str, server_id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "fips_ids": [id], "server_id": server_id });
        let _: serde_json::Value = self
            .client
            .post(&format!("{}/fips/attach", self.base()), &body)
            .await?;
        Ok(())
    }

    /// Detaches the IP from its server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn detach_fip(&self, id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "fips_ids": [id] });
        let _: serde_json::Value = self
            .client
            .post(&format!("{}/fips/detach", self.base()), &body)
            .await?;
        Ok(())
    }

    /// Releases a flexible IP.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_fip(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&format!("{}/fips/{id}", self.base())).await
    }
}
