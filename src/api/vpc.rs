//! VPC API: private networks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Region;
use crate::wait::HasStatus;

/// Client for the region-scoped VPC API.
#[derive(Clone, Debug)]
pub struct VpcApi {
    client: Arc<ApiClient>,
    region: Region,
}

/// A private network.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PrivateNetwork {
    /// Network identifier.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Tags attached to the network.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Subnets allocated to the network, in CIDR form.
    #[serde(default)]
    pub subnets: Vec<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for PrivateNetwork {
    fn status(&self) -> &str {
        "available"
    }
}

#[derive(Deserialize)]
struct NetworkEnvelope {
    private_network: PrivateNetwork,
}

#[derive(Deserialize)]
struct NetworksEnvelope {
    private_networks: Vec<PrivateNetwork>,
}

impl VpcApi {
    /// Builds a client for the given region.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, region: Region) -> Self {
        Self { client, region }
    }

    fn base(&self) -> String {
        format!("/vpc/v2/regions/{}", self.region)
    }

    /// Creates a private network.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_network(
        &self,
        body: &serde_json::Value,
    ) -> Result<PrivateNetwork, ApiError> {
        let envelope: NetworkEnvelope = self
            .client
            .post(&format!("{}/private-networks", self.base()), body)
            .await?;
        Ok(envelope.private_network)
    }

    /// Fetches one private network.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the network is gone.
    pub async fn get_network(&self, id: &str) -> Result<PrivateNetwork, ApiError> {
        let envelope: NetworkEnvelope = self
            .client
            .get(&format!("{}/private-networks/{id}", self.base()), &[])
            .await?;
        Ok(envelope.private_network)
    }

    /// Lists networks filtered by name.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_networks_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<PrivateNetwork>, ApiError> {
        let envelope: NetworksEnvelope = self
            .client
            .get(
                &format!("{}/private-networks", self.base()),
                &[("name", name.to_owned())],
            )
            .await?;
        Ok(envelope.private_networks)
    }

    /// Patches a private network (name, tags).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_network(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<PrivateNetwork, ApiError> {
        let envelope: NetworkEnvelope = self
            .client
            .patch(&format!("{}/private-networks/{id}", self.base()), body)
            .await?;
        Ok(envelope.private_network)
    }

    /// Deletes a private network.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_network(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/private-networks/{id}", self.base()))
            .await
    }
}
