//! Domains and DNS API: zones and record sets.
//!
//! Record updates are batched: additions and removals are sent in a single
//! change-set call so a reconciliation pass touches the zone once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::wait::HasStatus;

/// Client for the global Domains and DNS API.
#[derive(Clone, Debug)]
pub struct DomainApi {
    client: Arc<ApiClient>,
}

/// A DNS zone.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DnsZone {
    /// Parent domain.
    pub domain: String,
    /// Subdomain of the zone; empty for the root zone.
    #[serde(default)]
    pub subdomain: String,
    /// Lifecycle status (`active`, `pending`, `error`).
    #[serde(default)]
    pub status: String,
    /// Authoritative name servers.
    #[serde(default)]
    pub ns: Vec<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: String,
}

impl DnsZone {
    /// Returns the fully-qualified zone name used in record paths.
    #[must_use]
    pub fn fqdn(&self) -> String {
        if self.subdomain.is_empty() {
            self.domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.domain)
        }
    }
}

impl HasStatus for DnsZone {
    fn status(&self) -> &str {
        &self.status
    }
}

/// One DNS record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DnsRecord {
    /// Record identifier, server-assigned.
    #[serde(default)]
    pub id: String,
    /// Record name relative to the zone; `@` for the apex.
    pub name: String,
    /// Record type (`A`, `AAAA`, `NS`, `TXT`, ...).
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record data.
    pub data: String,
    /// Time to live in seconds.
    #[serde(default)]
    pub ttl: u32,
    /// Priority, meaningful for `MX` and `SRV`.
    #[serde(default)]
    pub priority: u32,
}

/// Fields sent when adding a record.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DnsRecordSpec {
    /// Record name relative to the zone.
    pub name: String,
    /// Record type.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record data.
    pub data: String,
    /// Time to live in seconds.
    pub ttl: u32,
    /// Priority, meaningful for `MX` and `SRV`.
    #[serde(skip_serializing_if = "is_zero")]
    pub priority: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

#[derive(Deserialize)]
struct ZonesEnvelope {
    dns_zones: Vec<DnsZone>,
}

#[derive(Deserialize)]
struct RecordsEnvelope {
    records: Vec<DnsRecord>,
}

impl DomainApi {
    /// Builds a client.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    const BASE: &'static str = "/domain/v2beta1";

    /// Creates a DNS zone under an existing domain.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_zone(
        &self,
        domain: &str,
        subdomain: &str,
        project: &str,
    ) -> Result<DnsZone, ApiError> {
        let body = serde_json::json!({
            "domain": domain,
            "subdomain": subdomain,
            "project_id": project,
        });
        self.client
            .post(&format!("{}/dns-zones", Self::BASE), &body)
            .await
    }

    /// Lists zones of a domain.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_zones(&self, domain: &str) -> Result<Vec<DnsZone>, ApiError> {
        let envelope: ZonesEnvelope = self
            .client
            .get(
                &format!("{}/dns-zones", Self::BASE),
                &[("domain", domain.to_owned())],
            )
            .await?;
        Ok(envelope.dns_zones)
    }

    /// Deletes a zone.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_zone(&self, fqdn: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/dns-zones/{fqdn}", Self::BASE))
            .await
    }

    /// Lists every record of a zone.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the zone is gone.
    pub async fn list_records(&self, fqdn: &str) -> Result<Vec<DnsRecord>, ApiError> {
        let envelope: RecordsEnvelope = self
            .client
            .get(&format!("{}/dns-zones/{fqdn}/records", Self::BASE), &[])
            .await?;
        Ok(envelope.records)
    }

    /// Applies a batched change set: every addition and removal in one call.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the change set.
    pub async fn update_records(
        &self,
        fqdn: &str,
        additions: &[DnsRecordSpec],
        removals: &[DnsRecord],
    ) -> Result<(), ApiError> {
        let mut changes = Vec::new();
        for removal in removals {
            changes.push(serde_json::json!({
                "delete": { "id": removal.id },
            }));
        }
        if !additions.is_empty() {
            changes.push(serde_json::json!({
                "add": { "records": additions },
            }));
        }
        let body = serde_json::json!({ "changes": changes });
        let _: serde_json::Value = self
            .client
            .patch(&format!("{}/dns-zones/{fqdn}/records", Self::BASE), &body)
            .await?;
        Ok(())
    }
}
