//! Load Balancer API: balancers, backends, and frontend ACLs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Zone;
use crate::wait::HasStatus;

/// Client for the zone-scoped Load Balancer API.
#[derive(Clone, Debug)]
pub struct LbApi {
    client: Arc<ApiClient>,
    zone: Zone,
}

/// A load balancer.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LoadBalancer {
    /// Balancer identifier.
    pub id: String,
    /// Balancer name.
    pub name: String,
    /// Lifecycle status (`ready`, `pending`, `error`, ...).
    pub status: String,
    /// Commercial offer type.
    #[serde(rename = "type", default)]
    pub offer_type: String,
    /// Tags attached to the balancer.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl HasStatus for LoadBalancer {
    fn status(&self) -> &str {
        &self.status
    }
}

/// A backend pool attached to a balancer.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Backend {
    /// Backend identifier.
    pub id: String,
    /// Backend name.
    pub name: String,
    /// Protocol used towards the servers (`tcp`, `http`).
    #[serde(default)]
    pub forward_protocol: String,
    /// Port used towards the servers.
    #[serde(default)]
    pub forward_port: u16,
    /// Server IPs the backend forwards to.
    #[serde(default)]
    pub server_ip: Vec<String>,
}

/// One frontend ACL as reported by the API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Acl {
    /// ACL identifier, server-assigned.
    pub id: String,
    /// ACL name; generated by the API when the user omits one.
    #[serde(default)]
    pub name: String,
    /// Evaluation position, 1-based on the wire.
    #[serde(default)]
    pub index: u32,
    /// What to do on match.
    pub action: AclAction,
    /// Matching condition.
    #[serde(rename = "match")]
    pub criteria: AclMatch,
    /// Frontend the ACL belongs to; back-reference ignored for equality.
    pub frontend: Option<AclFrontendRef>,
}

/// ACL action.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AclAction {
    /// `allow` or `deny`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// ACL matching condition.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AclMatch {
    /// Subnets the condition matches; the API defaults to the whole of IPv4.
    #[serde(default)]
    pub ip_subnet: Vec<String>,
    /// Optional HTTP filter kind.
    #[serde(default)]
    pub http_filter: String,
    /// Values for the HTTP filter.
    #[serde(default)]
    pub http_filter_value: Vec<String>,
    /// Whether the condition is negated.
    #[serde(default)]
    pub invert: bool,
}

/// Frontend back-reference embedded in an ACL.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AclFrontendRef {
    /// Frontend identifier.
    pub id: String,
}

/// Fields accepted when creating or replacing an ACL.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AclSpec {
    /// ACL name.
    pub name: String,
    /// Evaluation position.
    pub index: u32,
    /// What to do on match.
    pub action: AclAction,
    /// Matching condition.
    #[serde(rename = "match")]
    pub criteria: AclMatch,
}

#[derive(Deserialize)]
struct LbEnvelope {
    lb: LoadBalancer,
}

#[derive(Deserialize)]
struct BackendEnvelope {
    backend: Backend,
}

#[derive(Deserialize)]
struct AclsEnvelope {
    acls: Vec<Acl>,
}

#[derive(Deserialize)]
struct AclEnvelope {
    acl: Acl,
}

impl LbApi {
    /// Builds a client for the given zone.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, zone: Zone) -> Self {
        Self { client, zone }
    }

    fn base(&self) -> String {
        format!("/lb/v1/zones/{}", self.zone)
    }

    /// Creates a load balancer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_lb(&self, body: &serde_json::Value) -> Result<LoadBalancer, ApiError> {
        let envelope: LbEnvelope = self
            .client
            .post(&format!("{}/lbs", self.base()), body)
            .await?;
        Ok(envelope.lb)
    }

    /// Fetches one balancer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the balancer is gone.
    pub async fn get_lb(&self, id: &str) -> Result<LoadBalancer, ApiError> {
        let envelope: LbEnvelope = self
            .client
            .get(&format!("{}/lbs/{id}", self.base()), &[])
            .await?;
        Ok(envelope.lb)
    }

    /// Patches a balancer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_lb(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<LoadBalancer, ApiError> {
        let envelope: LbEnvelope = self
            .client
            .patch(&format!("{}/lbs/{id}", self.base()), body)
            .await?;
        Ok(envelope.lb)
    }

    /// Deletes a balancer, releasing its IP when `release_ip` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_lb(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&format!("{}/lbs/{id}", self.base())).await
    }

    /// Creates a backend pool.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_backend(
        &self,
        lb_id: &str,
        body: &serde_json::Value,
    ) -> Result<Backend, ApiError> {
        let envelope: BackendEnvelope = self
            .client
            .post(&format!("{}/lbs/{lb_id}/backends", self.base()), body)
            .await?;
        Ok(envelope.backend)
    }

    /// Fetches one backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the backend is gone.
    pub async fn get_backend(&self, id: &str) -> Result<Backend, ApiError> {
        let envelope: BackendEnvelope = self
            .client
            .get(&format!("{}/backends/{id}", self.base()), &[])
            .await?;
        Ok(envelope.backend)
    }

    /// Replaces the server-IP list of a backend in one call.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn set_backend_servers(
        &self,
        backend_id: &str,
        server_ip: &[String],
    ) -> Result<Backend, ApiError> {
        let body = serde_json::json!({ "server_ip": server_ip });
        let envelope: BackendEnvelope = self
            .client
            .put(&format!("{}/backends/{backend_id}/servers", self.base()), &body)
            .await?;
        Ok(envelope.backend)
    }

    /// Deletes a backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_backend(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/backends/{id}", self.base()))
            .await
    }

    /// Lists the ACLs of a frontend in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_acls(&self, frontend_id: &str) -> Result<Vec<Acl>, ApiError> {
        let envelope: AclsEnvelope = self
            .client
            .get(&format!("{}/frontends/{frontend_id}/acls", self.base()), &[])
            .await?;
        let mut acls = envelope.acls;
        acls.sort_by_key(|acl| acl.index);
        Ok(acls)
    }

    /// Creates an ACL on a frontend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_acl(&self, frontend_id: &str, spec: &AclSpec) -> Result<Acl, ApiError> {
        let envelope: AclEnvelope = self
            .client
            .post(&format!("{}/frontends/{frontend_id}/acls", self.base()), spec)
            .await?;
        Ok(envelope.acl)
    }

    /// Replaces an ACL in place.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_acl(&self, acl_id: &str, spec: &AclSpec) -> Result<Acl, ApiError> {
        let envelope: AclEnvelope = self
            .client
            .put(&format!("{}/acls/{acl_id}", self.base()), spec)
            .await?;
        Ok(envelope.acl)
    }

    /// Deletes an ACL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_acl(&self, acl_id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/acls/{acl_id}", self.base()))
            .await
    }
}
