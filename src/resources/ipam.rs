//! IPAM address controller.
//!
//! Reverse-DNS entries are an unordered collection on the address; updates
//! reconcile the declared entries against the observed ones by content and
//! send only the difference.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::api::ipam::{IpamApi, IpamIp, ReverseDns};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, ReadOutcome, ResourceController,
    WithOperation,
};
use crate::diff::{content_hash, reconcile_sets};
use crate::locality::{decode, expand_last_uuid, Region};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::OperationContext;

use super::{region_scope, validation};

fn reverse_key(entry: &ReverseDns) -> String {
    content_hash([entry.hostname.as_str(), entry.address.as_str()])
}

/// True when the declared reverse entries already match the observed ones.
fn reverses_settled(declared: &[ReverseDns], observed: &[ReverseDns]) -> bool {
    reconcile_sets(declared, observed, reverse_key, reverse_key).is_settled()
}

/// Declared configuration for an IPAM address.
#[derive(Clone, Debug, Default)]
pub struct IpamIpConfig {
    /// Region override.
    pub region: Option<Region>,
    /// Project override.
    pub project_id: Option<String>,
    /// Private network to book in; accepts a locality-qualified id.
    pub private_network_id: String,
    /// Specific address to book, empty for an automatic pick; immutable.
    pub address: String,
    /// Book an IPv6 address; immutable.
    pub is_ipv6: bool,
    /// Tags.
    pub tags: Vec<String>,
    /// Declared reverse-DNS entries.
    pub reverses: Vec<ReverseDns>,
}

/// State snapshot for an IPAM address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IpamIpSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Booked address in CIDR form.
    pub address: String,
    /// Reverse-DNS entries.
    pub reverses: Vec<ReverseDns>,
    /// Tags.
    pub tags: Vec<String>,
    /// Whether the address is IPv6.
    pub is_ipv6: bool,
    /// Owning project.
    pub project_id: String,
}

fn snapshot(region: Region, ip: &IpamIp) -> IpamIpSnapshot {
    IpamIpSnapshot {
        id: format!("{region}/{}", ip.id),
        address: ip.address.clone(),
        reverses: ip.reverses.clone(),
        tags: ip.tags.clone(),
        is_ipv6: ip.is_ipv6,
        project_id: ip.project_id.clone(),
    }
}

/// Controller for `scaleway_ipam_ip`.
pub struct IpamIpController {
    session: Arc<Session>,
}

impl IpamIpController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, region: Region) -> IpamApi {
        IpamApi::new(self.session.api(), region)
    }

    /// Pushes the declared reverse entries when the observed set differs.
    async fn settle_reverses(
        &self,
        api: &IpamApi,
        ip: IpamIp,
        declared: &[ReverseDns],
    ) -> Result<IpamIp, crate::api::ApiError> {
        if reverses_settled(declared, &ip.reverses) {
            return Ok(ip);
        }
        let body = json!({ "reverses": declared });
        api.update_ip(&ip.id, &body).await
    }
}

#[async_trait]
impl ResourceController for IpamIpController {
    type Config = IpamIpConfig;
    type State = IpamIpSnapshot;

    const KIND: &'static str = "scaleway_ipam_ip";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::optional("region", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::required("private_network_id", AttributeKind::String).force_new(),
                Attribute::optional("address", AttributeKind::String).force_new(),
                Attribute::optional("is_ipv6", AttributeKind::Bool).force_new(),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::optional("reverses", AttributeKind::StringList),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.private_network_id.is_empty() {
            return Err(validation(
                "private_network_id",
                "private_network_id must not be empty",
            ))
            .in_operation(Operation::Create, Self::KIND, "");
        }
        let region = self.session.region_or_default(config.region);
        let api = self.api(region);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        let network = expand_last_uuid(&config.private_network_id);
        info!(kind = Self::KIND, %region, network = %network, ipv6 = config.is_ipv6, "booking IPAM address");
        let mut body = json!({
            "project_id": project,
            "is_ipv6": config.is_ipv6,
            "tags": config.tags,
            "source": { "private_network_id": network },
        });
        if !config.address.is_empty() {
            body["address"] = json!(config.address);
        }
        let ip = api
            .book_ip(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{region}/{}", ip.id);
        let settled = self
            .settle_reverses(&api, ip, &config.reverses)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, snapshot(region, &settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(region);
        let outcome = outcome_from(api.get_ip(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(ip) => ReadOutcome::Present(snapshot(region, &ip)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Update, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(region);
        let ip_id = uuid.to_string();
        let tagged = api
            .update_ip(&ip_id, &json!({ "tags": config.tags }))
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let settled = self
            .settle_reverses(&api, tagged, &config.reverses)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(snapshot(region, &settled))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let region = region_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(region);
        info!(kind = Self::KIND, %region, "releasing IPAM address");
        ignore_gone(api.release_ip(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn entry(hostname: &str, address: &str) -> ReverseDns {
        ReverseDns {
            hostname: hostname.to_owned(),
            address: address.to_owned(),
        }
    }

    #[rstest]
    fn identical_reverse_sets_are_settled_in_any_order() {
        let declared = vec![entry("a.example.com", "10.0.0.2"), entry("b.example.com", "10.0.0.3")];
        let observed = vec![entry("b.example.com", "10.0.0.3"), entry("a.example.com", "10.0.0.2")];
        assert!(reverses_settled(&declared, &observed));
    }

    #[rstest]
    fn a_hostname_change_unsettles_the_set() {
        let declared = vec![entry("a.example.com", "10.0.0.2")];
        let observed = vec![entry("z.example.com", "10.0.0.2")];
        assert!(!reverses_settled(&declared, &observed));
    }

    #[rstest]
    fn an_extra_observed_entry_unsettles_the_set() {
        let declared = vec![entry("a.example.com", "10.0.0.2")];
        let observed = vec![entry("a.example.com", "10.0.0.2"), entry("b.example.com", "10.0.0.3")];
        assert!(!reverses_settled(&declared, &observed));
    }

    #[rstest]
    fn reverse_keys_separate_hostname_and_address() {
        // "a" + "b.c" must not collide with "a.b" + "c".
        assert_ne!(
            reverse_key(&entry("a", "b.c")),
            reverse_key(&entry("a.b", "c"))
        );
    }

    #[rstest]
    fn snapshot_is_region_qualified() {
        let ip = IpamIp {
            id: String::from("55555555-5555-4555-8555-555555555555"),
            address: String::from("10.64.0.2/22"),
            reverses: vec![],
            tags: vec![String::from("internal")],
            is_ipv6: false,
            project_id: String::from("proj"),
        };
        assert_eq!(
            snapshot(Region::FrPar, &ip).id,
            "fr-par/55555555-5555-4555-8555-555555555555"
        );
    }
}
