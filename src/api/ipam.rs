//! IPAM API: booked addresses and their reverse-DNS entries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;
use crate::wait::HasStatus;

/// Client for the region-scoped IPAM API.
#[derive(Clone, Debug)]
pub struct IpamApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// A booked IPAM address.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IpamIp {
    /// Address identifier.
    pub id: String,
    /// Address in CIDR form.
    pub address: String,
    /// Reverse-DNS entries attached to the address.
    #[serde(default)]
    pub reverses: Vec<ReverseDns>,
    /// Tags attached to the address.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the address is IPv6.
    #[serde(default)]
    pub is_ipv6: bool,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for IpamIp {
    fn status(&self) -> &str {
        "attached"
    }
}

/// One reverse-DNS entry.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReverseDns {
    /// Hostname the address resolves back to.
    pub hostname: String,
    /// Address the entry applies to.
    #[serde(default)]
    pub address: String,
}

#[derive(Deserialize)]
struct IpsEnvelope {
    ips: Vec<IpamIp>,
}

impl IpamApi {
    /// Builds a client for the given region.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    fn base(&self) -> String {
        format!("/ipam/v1/regions/{}", self.region)
    }

    /// Books an address in a private network's subnet.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn book_ip(&self, body: &serde_json::Value) -> Result<IpamIp, ApiError> {
        self.client.post(&format!("{}/ips", self.base()), body).await
    }

    /// Fetches one address.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the address is gone.
    pub async fn get_ip(&self, id: &str) -> Result<IpamIp, ApiError> {
        self.client.get(&format!("{}/ips/{id}", self.base()), &[]).await
    }

    /// Lists addresses filtered by attached resource or tag.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_ips(&self, query: &[(&str, String)]) -> Result<Vec<IpamIp>, ApiError> {
        let envelope: IpsEnvelope = self.client.get(&format!("{}/ips", self.base()), query).await?;
        Ok(envelope.ips)
    }

    /// Patches an address (tags, reverse-DNS entries).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_ip(&self, id: &str, body: &serde_json::Value) -> Result<IpamIp, ApiError> {
        self.client
            .patch(&format!("{}/ips/{id}", self.base()), body)
            .await
    }

    /// Releases an address.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn release_ip(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&format!("{}/ips/{id}", self.base())).await
    }
}
