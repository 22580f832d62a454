//! Instance API: compute servers, server actions, user data, flexible
//! instance IPs, and security groups with their rules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::locality::Zone;
use crate::wait::HasStatus;

/// Client for the zone-scoped Instance API.
#[derive(Clone, Debug)]
pub struct InstanceApi {
    client: Arc<ApiClient>,
    zone: Zone,
}

/// A compute server as reported by the API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Server {
    /// Server identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Lifecycle state (`running`, `stopped`, `stopped in place`, ...).
    pub state: String,
    /// Commercial type (for example `DEV1-S`).
    pub commercial_type: String,
    /// Tags attached to the server.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Image the server was built from.
    pub image: Option<ImageSummary>,
    /// Public IP attached to the server, when any.
    pub public_ip: Option<AttachedIp>,
    /// Security group the server belongs to.
    pub security_group: Option<ResourceRef>,
    /// Actions the API currently accepts for this server.
    #[serde(default)]
    pub allowed_actions: Vec<String>,
    /// Boot mechanism (`local`, `rescue`, legacy `bootscript`).
    #[serde(default)]
    pub boot_type: String,
    /// Legacy bootscript, reported but deprecated upstream; computed-only.
    pub bootscript: Option<Bootscript>,
    /// Owning project.
    #[serde(default)]
    pub project: String,
    /// Creation timestamp.
    pub creation_date: Option<DateTime<Utc>>,
    /// Last modification timestamp.
    pub modification_date: Option<DateTime<Utc>>,
}

impl HasStatus for Server {
    fn status(&self) -> &str {
        &self.state
    }
}

/// Image reference embedded in a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageSummary {
    /// Image identifier.
    pub id: String,
    /// Image name.
    #[serde(default)]
    pub name: String,
}

/// Public IP embedded in a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AttachedIp {
    /// IP identifier.
    pub id: String,
    /// Address in textual form.
    pub address: String,
}

/// Bare `{id, name}` reference used by several embedded objects.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceRef {
    /// Referenced resource identifier.
    pub id: String,
    /// Referenced resource name.
    #[serde(default)]
    pub name: String,
}

/// Legacy bootscript attachment, kept for backward compatibility.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Bootscript {
    /// Bootscript identifier.
    pub id: String,
    /// Bootscript title.
    #[serde(default)]
    pub title: String,
}

/// Fields accepted when creating a server.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CreateServer {
    /// Server name.
    pub name: String,
    /// Commercial type.
    pub commercial_type: String,
    /// Image identifier.
    pub image: String,
    /// Owning project.
    pub project: String,
    /// Tags to attach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Security group to place the server in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
    /// Whether to allocate a routed public IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_ip_required: Option<bool>,
}

/// Fields accepted when patching a server. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UpdateServer {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement tag list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New security group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
}

/// A flexible instance IP.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceIp {
    /// IP identifier.
    pub id: String,
    /// Address in textual form.
    pub address: String,
    /// Reverse DNS name, when set.
    pub reverse: Option<String>,
    /// Server the IP is attached to, when any.
    pub server: Option<ResourceRef>,
    /// Tags attached to the IP.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning project.
    #[serde(default)]
    pub project: String,
}

impl HasStatus for InstanceIp {
    fn status(&self) -> &str {
        // IPs have no lifecycle state; existence is the only signal.
        "attached"
    }
}

/// A security group.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SecurityGroup {
    /// Group identifier.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Policy applied to inbound traffic not matched by a rule.
    #[serde(default)]
    pub inbound_default_policy: String,
    /// Policy applied to outbound traffic not matched by a rule.
    #[serde(default)]
    pub outbound_default_policy: String,
    /// Whether connection tracking is enabled.
    #[serde(default)]
    pub stateful: bool,
    /// Tags attached to the group.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning project.
    #[serde(default)]
    pub project: String,
}

impl HasStatus for SecurityGroup {
    fn status(&self) -> &str {
        "available"
    }
}

/// One security-group rule as reported by the API.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SecurityGroupRule {
    /// Rule identifier, server-assigned.
    pub id: String,
    /// `inbound` or `outbound`.
    pub direction: String,
    /// `accept` or `drop`.
    pub action: String,
    /// `TCP`, `UDP`, `ICMP`, or `ANY`.
    pub protocol: String,
    /// Source or destination subnet.
    pub ip_range: String,
    /// First destination port, absent for "any port".
    pub dest_port_from: Option<u16>,
    /// Last destination port, absent when equal to `dest_port_from`.
    pub dest_port_to: Option<u16>,
    /// Position of the rule in the evaluated list.
    #[serde(default)]
    pub position: u32,
    /// Whether the rule may be edited (system rules are not).
    #[serde(default)]
    pub editable: bool,
}

/// Fields accepted when creating or replacing a rule.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SecurityGroupRuleSpec {
    /// `inbound` or `outbound`.
    pub direction: String,
    /// `accept` or `drop`.
    pub action: String,
    /// `TCP`, `UDP`, `ICMP`, or `ANY`.
    pub protocol: String,
    /// Source or destination subnet.
    pub ip_range: String,
    /// First destination port; omitted for "any port".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port_from: Option<u16>,
    /// Last destination port; omitted when the range is a single port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port_to: Option<u16>,
    /// Position to insert the rule at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Deserialize)]
struct ServersEnvelope {
    servers: Vec<Server>,
}

#[derive(Deserialize)]
struct IpEnvelope {
    ip: InstanceIp,
}

#[derive(Deserialize)]
struct SecurityGroupEnvelope {
    security_group: SecurityGroup,
}

#[derive(Deserialize)]
struct RulesEnvelope {
    rules: Vec<SecurityGroupRule>,
}

#[derive(Deserialize)]
struct RuleEnvelope {
    rule: SecurityGroupRule,
}

#[derive(Deserialize)]
struct UserDataEnvelope {
    #[serde(default)]
    user_data: Vec<String>,
}

#[derive(Deserialize)]
struct UserDataValueEnvelope {
    #[serde(default)]
    content: String,
}

impl InstanceApi {
    /// Builds a client for the given zone.
    #[must_use]
    pub const fn new(client: Arc<ApiClient>, zone: Zone) -> Self {
        Self { client, zone }
    }

    /// Returns the zone this client targets.
    #[must_use]
    pub const fn zone(&self) -> Zone {
        self.zone
    }

    fn base(&self) -> String {
        format!("/instance/v1/zones/{}", self.zone)
    }

    /// Creates a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_server(&self, request: &CreateServer) -> Result<Server, ApiError> {
        let envelope: ServerEnvelope = self
            .client
            .post(&format!("{}/servers", self.base()), request)
            .await?;
        Ok(envelope.server)
    }

    /// Fetches one server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on failure; 404 means the server is gone.
    pub async fn get_server(&self, id: &str) -> Result<Server, ApiError> {
        let envelope: ServerEnvelope = self
            .client
            .get(&format!("{}/servers/{id}", self.base()), &[])
            .await?;
        Ok(envelope.server)
    }

    /// Lists servers filtered by name.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_servers_by_name(&self, name: &str) -> Result<Vec<Server>, ApiError> {
        let envelope: ServersEnvelope = self
            .client
            .get(
                &format!("{}/servers", self.base()),
                &[("name", name.to_owned())],
            )
            .await?;
        Ok(envelope.servers)
    }

    /// Patches a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_server(&self, id: &str, request: &UpdateServer) -> Result<Server, ApiError> {
        let envelope: ServerEnvelope = self
            .client
            .patch(&format!("{}/servers/{id}", self.base()), request)
            .await?;
        Ok(envelope.server)
    }

    /// Issues a power action (`poweron`, `poweroff`, `stop_in_place`,
    /// `reboot`, `terminate`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; a 412 indicates a concurrent state change.
    pub async fn server_action(&self, id: &str, action: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "action": action });
        let _: serde_json::Value = self
            .client
            .post(&format!("{}/servers/{id}/action", self.base()), &body)
            .await?;
        Ok(())
    }

    /// Deletes a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_server(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/servers/{id}", self.base()))
            .await
    }

    /// Lists user-data keys set on a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_user_data(&self, server_id: &str) -> Result<Vec<String>, ApiError> {
        let envelope: UserDataEnvelope = self
            .client
            .get(&format!("{}/servers/{server_id}/user_data", self.base()), &[])
            .await?;
        Ok(envelope.user_data)
    }

    /// Reads one user-data value.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the key is unset.
    pub async fn get_user_data(&self, server_id: &str, key: &str) -> Result<String, ApiError> {
        let envelope: UserDataValueEnvelope = self
            .client
            .get(
                &format!("{}/servers/{server_id}/user_data/{key}", self.base()),
                &[],
            )
            .await?;
        Ok(envelope.content)
    }

    /// Writes one user-data value.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn set_user_data(
        &self,
        server_id: &str,
        key: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({ "content": content });
        let _: serde_json::Value = self
            .client
            .put(
                &format!("{}/servers/{server_id}/user_data/{key}", self.base()),
                &body,
            )
            .await?;
        Ok(())
    }

    /// Removes one user-data key.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_user_data(&self, server_id: &str, key: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/servers/{server_id}/user_data/{key}", self.base()))
            .await
    }

    /// Reserves a flexible instance IP.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_ip(&self, project: &str, tags: &[String]) -> Result<InstanceIp, ApiError> {
        let body = serde_json::json!({ "project": project, "tags": tags });
        let envelope: IpEnvelope = self
            .client
            .post(&format!("{}/ips", self.base()), &body)
            .await?;
        Ok(envelope.ip)
    }

    /// Fetches one IP. Deleted IPs surface as 403 on this endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; both 404 and 403 mean the IP is gone.
    pub async fn get_ip(&self, id: &str) -> Result<InstanceIp, ApiError> {
        let envelope: IpEnvelope = self
            .client
            .get(&format!("{}/ips/{id}", self.base()), &[])
            .await?;
        Ok(envelope.ip)
    }

    /// Patches an IP (reverse, tags, attachment).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_ip(
        &self,
        id: &str,
        reverse: Option<&str>,
        server: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<InstanceIp, ApiError> {
        let mut body = serde_json::Map::new();
        if let Some(reverse) = reverse {
            body.insert(String::from("reverse"), serde_json::json!(reverse));
        }
        if let Some(server) = server {
            body.insert(String::from("server"), serde_json::json!(server));
        }
        if let Some(tags) = tags {
            body.insert(String::from("tags"), serde_json::json!(tags));
        }
        let envelope: IpEnvelope = self
            .client
            .patch(&format!("{}/ips/{id}", self.base()), &body)
            .await?;
        Ok(envelope.ip)
    }

    /// Releases an IP.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_ip(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&format!("{}/ips/{id}", self.base())).await
    }

    /// Creates a security group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_security_group(
        &self,
        body: &serde_json::Value,
    ) -> Result<SecurityGroup, ApiError> {
        let envelope: SecurityGroupEnvelope = self
            .client
            .post(&format!("{}/security_groups", self.base()), body)
            .await?;
        Ok(envelope.security_group)
    }

    /// Fetches one security group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`]; 404 means the group is gone.
    pub async fn get_security_group(&self, id: &str) -> Result<SecurityGroup, ApiError> {
        let envelope: SecurityGroupEnvelope = self
            .client
            .get(&format!("{}/security_groups/{id}", self.base()), &[])
            .await?;
        Ok(envelope.security_group)
    }

    /// Patches a security group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_security_group(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<SecurityGroup, ApiError> {
        let envelope: SecurityGroupEnvelope = self
            .client
            .patch(&format!("{}/security_groups/{id}", self.base()), body)
            .await?;
        Ok(envelope.security_group)
    }

    /// Deletes a security group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_security_group(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/security_groups/{id}", self.base()))
            .await
    }

    /// Lists the rules of a security group in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn list_security_group_rules(
        &self,
        group_id: &str,
    ) -> Result<Vec<SecurityGroupRule>, ApiError> {
        let envelope: RulesEnvelope = self
            .client
            .get(
                &format!("{}/security_groups/{group_id}/rules", self.base()),
                &[],
            )
            .await?;
        Ok(envelope.rules)
    }

    /// Appends a rule to a security group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn create_security_group_rule(
        &self,
        group_id: &str,
        spec: &SecurityGroupRuleSpec,
    ) -> Result<SecurityGroupRule, ApiError> {
        let envelope: RuleEnvelope = self
            .client
            .post(
                &format!("{}/security_groups/{group_id}/rules", self.base()),
                spec,
            )
            .await?;
        Ok(envelope.rule)
    }

    /// Replaces a rule in place.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn update_security_group_rule(
        &self,
        group_id: &str,
        rule_id: &str,
        spec: &SecurityGroupRuleSpec,
    ) -> Result<SecurityGroupRule, ApiError> {
        let envelope: RuleEnvelope = self
            .client
            .put(
                &format!("{}/security_groups/{group_id}/rules/{rule_id}", self.base()),
                spec,
            )
            .await?;
        Ok(envelope.rule)
    }

    /// Deletes a rule.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the API rejects the request.
    pub async fn delete_security_group_rule(
        &self,
        group_id: &str,
        rule_id: &str,
    ) -> Result<(), ApiError> {
        self.client
            .delete(&format!(
                "{}/security_groups/{group_id}/rules/{rule_id}",
                self.base()
            ))
            .await
    }
}
