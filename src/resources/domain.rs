//! DNS zone and record controllers.
//!
//! The Domains and DNS API is global, so identifiers here carry no
//! locality prefix. Zone identifiers are the fully-qualified zone name;
//! record identifiers are `{zone}/{name}/{type}/{data}` and are split with
//! exactly four fields so record data may itself contain slashes.
//!
//! On the Online registrar, zones come seeded with legacy `nsN.online.net.`
//! delegation records that the API reports but never lets callers manage;
//! those are filtered out of every observation so they never churn state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::domain::{DnsRecord, DnsRecordSpec, DnsZone, DomainApi};
use crate::api::ApiError;
use crate::controller::{
    ControllerError, Operation, OperationError, ReadOutcome, ResourceController, WithOperation,
};
use crate::diff::{dns_record_key, filter_online_ns, reconcile_sets};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::validation;

const ZONE_ACTIVE: [&str; 1] = ["active"];
const ZONE_FAILED: [&str; 1] = ["error"];

/// Default record TTL when the configuration leaves it unset.
const DEFAULT_RECORD_TTL: u32 = 3600;

/// Declared configuration for a DNS zone.
#[derive(Clone, Debug, Default)]
pub struct DnsZoneConfig {
    /// Registered parent domain.
    pub domain: String,
    /// Subdomain of the zone; empty for the root zone.
    pub subdomain: String,
    /// Project override.
    pub project_id: Option<String>,
}

/// State snapshot for a DNS zone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DnsZoneSnapshot {
    /// Fully-qualified zone name; doubles as the identifier.
    pub id: String,
    /// Registered parent domain.
    pub domain: String,
    /// Subdomain, empty for the root zone.
    pub subdomain: String,
    /// Lifecycle status.
    pub status: String,
    /// Authoritative name servers.
    pub ns: Vec<String>,
    /// Owning project.
    pub project_id: String,
}

fn zone_snapshot(zone: &DnsZone) -> DnsZoneSnapshot {
    DnsZoneSnapshot {
        id: zone.fqdn(),
        domain: zone.domain.clone(),
        subdomain: zone.subdomain.clone(),
        status: zone.status.clone(),
        ns: zone.ns.clone(),
        project_id: zone.project_id.clone(),
    }
}

/// Candidate parent domains for a zone name, longest first.
///
/// A zone identifier does not record where the subdomain ends and the
/// registered domain begins, so lookups probe each suffix that still
/// contains a dot: `a.b.example.com` yields itself, `b.example.com`, then
/// `example.com`.
fn parent_candidates(fqdn: &str) -> Vec<&str> {
    let mut candidates = vec![fqdn];
    let mut rest = fqdn;
    while let Some(dot) = rest.find('.') {
        rest = &rest[dot + 1..];
        if rest.contains('.') {
            candidates.push(rest);
        }
    }
    candidates
}

/// Controller for `scaleway_domain_zone`.
pub struct DnsZoneController {
    session: Arc<Session>,
}

impl DnsZoneController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self) -> DomainApi {
        DomainApi::new(self.session.api())
    }

    /// Finds a zone by its fully-qualified name, probing parent domains.
    async fn find_zone(&self, fqdn: &str) -> Result<Option<DnsZone>, ApiError> {
        let api = self.api();
        for candidate in parent_candidates(fqdn) {
            match api.list_zones(candidate).await {
                Ok(zones) => {
                    if let Some(zone) = zones.into_iter().find(|zone| zone.fqdn() == fqdn) {
                        return Ok(Some(zone));
                    }
                }
                Err(err) if err.is_gone(true) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ResourceController for DnsZoneController {
    type Config = DnsZoneConfig;
    type State = DnsZoneSnapshot;

    const KIND: &'static str = "scaleway_domain_zone";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("domain", AttributeKind::String).force_new(),
                Attribute::optional("subdomain", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::computed("status", AttributeKind::String),
                Attribute::computed("ns", AttributeKind::StringList),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.domain.is_empty() {
            return Err(validation("domain", "domain must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let api = self.api();
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, domain = %config.domain, subdomain = %config.subdomain, "creating DNS zone");
        let zone = api
            .create_zone(&config.domain, &config.subdomain, &project)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = zone.fqdn();
        let settled = wait_for_status(ctx, DEFAULT_POLL_INTERVAL, &ZONE_ACTIVE, &ZONE_FAILED, || async {
            Ok(match self.find_zone(&id).await? {
                Some(zone) => Observation::Present(zone),
                None => Observation::Gone,
            })
        })
        .await
        .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, zone_snapshot(&settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let zone = self
            .find_zone(id)
            .await
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match zone {
            Some(zone) => ReadOutcome::Present(zone_snapshot(&zone)),
            None => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        _config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        // Every declared attribute forces replacement; update only refreshes.
        let zone = self
            .find_zone(id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        match zone {
            Some(zone) => Ok(zone_snapshot(&zone)),
            None => Err(OperationError::NotFound).in_operation(Operation::Update, Self::KIND, id),
        }
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let api = self.api();
        info!(kind = Self::KIND, zone = %id, "deleting DNS zone");
        match api.delete_zone(id).await {
            Ok(()) => {}
            Err(err) if err.is_gone(false) => return Ok(()),
            Err(err) => return Err(err).in_operation(Operation::Delete, Self::KIND, id),
        }
        wait_for_gone::<DnsZone, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            Ok(match self.find_zone(id).await? {
                Some(zone) => Observation::Present(zone),
                None => Observation::Gone,
            })
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// Declared configuration for a DNS record.
#[derive(Clone, Debug, Default)]
pub struct DnsRecordConfig {
    /// Fully-qualified zone the record lives in.
    pub zone: String,
    /// Record name relative to the zone; `@` for the apex.
    pub name: String,
    /// Record type (`A`, `AAAA`, `TXT`, ...).
    pub record_type: String,
    /// Record data.
    pub data: String,
    /// Time to live in seconds; zero means the default of one hour.
    pub ttl: u32,
    /// Priority, meaningful for `MX` and `SRV`.
    pub priority: u32,
}

impl DnsRecordConfig {
    fn effective_ttl(&self) -> u32 {
        if self.ttl == 0 { DEFAULT_RECORD_TTL } else { self.ttl }
    }

    fn spec(&self) -> DnsRecordSpec {
        DnsRecordSpec {
            name: self.name.clone(),
            record_type: self.record_type.clone(),
            data: self.data.clone(),
            ttl: self.effective_ttl(),
            priority: self.priority,
        }
    }
}

/// State snapshot for a DNS record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DnsRecordSnapshot {
    /// Four-field identifier: `{zone}/{name}/{type}/{data}`.
    pub id: String,
    /// Fully-qualified zone.
    pub zone: String,
    /// Record name relative to the zone.
    pub name: String,
    /// Record type.
    pub record_type: String,
    /// Record data.
    pub data: String,
    /// Time to live in seconds.
    pub ttl: u32,
    /// Priority.
    pub priority: u32,
    /// Server-assigned record identifier.
    pub record_id: String,
}

fn record_id(zone: &str, name: &str, record_type: &str, data: &str) -> String {
    format!("{zone}/{name}/{record_type}/{data}")
}

/// Splits a record identifier into zone, name, type, and data.
///
/// The split stops after four fields so record data keeps any embedded
/// slashes intact.
fn parse_record_id(id: &str) -> Result<(&str, &str, &str, &str), OperationError> {
    let mut parts = id.splitn(4, '/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(zone), Some(name), Some(record_type), Some(data))
            if !zone.is_empty() && !name.is_empty() && !record_type.is_empty() =>
        {
            Ok((zone, name, record_type, data))
        }
        _ => Err(validation(
            "id",
            format!("record identifier {id} is not zone/name/type/data"),
        )),
    }
}

fn record_snapshot(zone: &str, record: &DnsRecord) -> DnsRecordSnapshot {
    DnsRecordSnapshot {
        id: record_id(zone, &record.name, &record.record_type, &record.data),
        zone: zone.to_owned(),
        name: record.name.clone(),
        record_type: record.record_type.clone(),
        data: record.data.clone(),
        ttl: record.ttl,
        priority: record.priority,
        record_id: record.id.clone(),
    }
}

/// Plans the batched change set reconciling one declared record against the
/// observed records sharing its name and type.
fn plan_changes(
    config: &DnsRecordConfig,
    observed: &[DnsRecord],
) -> (Vec<DnsRecordSpec>, Vec<DnsRecord>) {
    let declared = [config.spec()];
    let same_set: Vec<DnsRecord> = observed
        .iter()
        .filter(|record| record.name == config.name && record.record_type == config.record_type)
        .cloned()
        .collect();
    let delta = reconcile_sets(
        &declared,
        &same_set,
        |spec| dns_record_key(&spec.name, &spec.record_type, &spec.data, spec.ttl, spec.priority),
        |record| {
            dns_record_key(
                &record.name,
                &record.record_type,
                &record.data,
                record.ttl,
                record.priority,
            )
        },
    );
    let additions = delta
        .additions
        .iter()
        .map(|&index| declared[index].clone())
        .collect();
    let removals = delta
        .removals
        .iter()
        .map(|&index| same_set[index].clone())
        .collect();
    (additions, removals)
}

/// Controller for `scaleway_domain_record`.
pub struct DnsRecordController {
    session: Arc<Session>,
}

impl DnsRecordController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self) -> DomainApi {
        DomainApi::new(self.session.api())
    }

    /// Lists the managed records of a zone, or `None` when the zone is gone.
    ///
    /// Legacy Online name-server delegations are stripped before anything
    /// else looks at the collection.
    async fn observed_records(&self, zone: &str) -> Result<Option<Vec<DnsRecord>>, ApiError> {
        match self.api().list_records(zone).await {
            Ok(records) => Ok(Some(filter_online_ns(records))),
            Err(err) if err.is_gone(false) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ResourceController for DnsRecordController {
    type Config = DnsRecordConfig;
    type State = DnsRecordSnapshot;

    const KIND: &'static str = "scaleway_domain_record";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("zone", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String).force_new(),
                Attribute::required("type", AttributeKind::String).force_new(),
                Attribute::required("data", AttributeKind::String),
                Attribute::optional("ttl", AttributeKind::Int),
                Attribute::optional("priority", AttributeKind::Int),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        if config.zone.is_empty() {
            return Err(validation("zone", "zone must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        if config.data.is_empty() {
            return Err(validation("data", "record data must not be empty"))
                .in_operation(Operation::Create, Self::KIND, "");
        }
        let api = self.api();
        let id = record_id(&config.zone, &config.name, &config.record_type, &config.data);
        info!(kind = Self::KIND, zone = %config.zone, name = %config.name, record_type = %config.record_type, "adding DNS record");
        api.update_records(&config.zone, &[config.spec()], &[])
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        let observed = self
            .observed_records(&config.zone)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?
            .ok_or(OperationError::NotFound)
            .in_operation(Operation::Create, Self::KIND, &id)?;
        let settled = observed
            .iter()
            .find(|record| {
                record.name == config.name
                    && record.record_type == config.record_type
                    && record.data == config.data
            })
            .ok_or(OperationError::NotFound)
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, record_snapshot(&config.zone, settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (zone, name, record_type, data) =
            parse_record_id(id).in_operation(Operation::Read, Self::KIND, id)?;
        let Some(records) = self
            .observed_records(zone)
            .await
            .in_operation(Operation::Read, Self::KIND, id)?
        else {
            return Ok(ReadOutcome::Gone);
        };
        Ok(records
            .iter()
            .find(|record| {
                record.name == name && record.record_type == record_type && record.data == data
            })
            .map_or(ReadOutcome::Gone, |record| {
                ReadOutcome::Present(record_snapshot(zone, record))
            }))
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (zone, name, record_type, _data) =
            parse_record_id(id).in_operation(Operation::Update, Self::KIND, id)?;
        if config.zone != zone {
            return Err(OperationError::Immutable {
                attribute: String::from("zone"),
            })
            .in_operation(Operation::Update, Self::KIND, id);
        }
        if config.name != name {
            return Err(OperationError::Immutable {
                attribute: String::from("name"),
            })
            .in_operation(Operation::Update, Self::KIND, id);
        }
        if config.record_type != record_type {
            return Err(OperationError::Immutable {
                attribute: String::from("type"),
            })
            .in_operation(Operation::Update, Self::KIND, id);
        }
        let api = self.api();
        let observed = self
            .observed_records(zone)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?
            .ok_or(OperationError::NotFound)
            .in_operation(Operation::Update, Self::KIND, id)?;
        let (additions, removals) = plan_changes(config, &observed);
        if !additions.is_empty() || !removals.is_empty() {
            api.update_records(zone, &additions, &removals)
                .await
                .in_operation(Operation::Update, Self::KIND, id)?;
        }
        let refreshed = self
            .observed_records(zone)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?
            .ok_or(OperationError::NotFound)
            .in_operation(Operation::Update, Self::KIND, id)?;
        let settled = refreshed
            .iter()
            .find(|record| {
                record.name == config.name
                    && record.record_type == config.record_type
                    && record.data == config.data
            })
            .ok_or(OperationError::NotFound)
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(record_snapshot(zone, settled))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (zone, name, record_type, data) =
            parse_record_id(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let Some(records) = self
            .observed_records(zone)
            .await
            .in_operation(Operation::Delete, Self::KIND, id)?
        else {
            return Ok(());
        };
        let removals: Vec<DnsRecord> = records
            .into_iter()
            .filter(|record| {
                record.name == name && record.record_type == record_type && record.data == data
            })
            .collect();
        if removals.is_empty() {
            return Ok(());
        }
        info!(kind = Self::KIND, zone = %zone, name = %name, "removing DNS record");
        self.api()
            .update_records(zone, &[], &removals)
            .await
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn record(name: &str, record_type: &str, data: &str, ttl: u32) -> DnsRecord {
        DnsRecord {
            id: format!("rec-{name}-{data}"),
            name: name.to_owned(),
            record_type: record_type.to_owned(),
            data: data.to_owned(),
            ttl,
            priority: 0,
        }
    }

    #[rstest]
    #[case("example.com", &["example.com"])]
    #[case("blog.example.com", &["blog.example.com", "example.com"])]
    #[case("a.b.example.com", &["a.b.example.com", "b.example.com", "example.com"])]
    fn parent_candidates_walk_suffixes(#[case] fqdn: &str, #[case] expected: &[&str]) {
        assert_eq!(parent_candidates(fqdn), expected);
    }

    #[rstest]
    fn record_ids_split_into_four_fields() {
        let id = record_id("example.com", "@", "TXT", "v=spf1 include:a/b ~all");
        let (zone, name, record_type, data) = parse_record_id(&id).unwrap();
        assert_eq!(zone, "example.com");
        assert_eq!(name, "@");
        assert_eq!(record_type, "TXT");
        assert_eq!(data, "v=spf1 include:a/b ~all");
    }

    #[rstest]
    #[case("example.com/@/TXT")]
    #[case("//A/1.2.3.4")]
    fn malformed_record_ids_are_rejected(#[case] id: &str) {
        assert!(matches!(
            parse_record_id(id),
            Err(OperationError::Validation { .. })
        ));
    }

    #[rstest]
    fn ttl_zero_means_one_hour() {
        let config = DnsRecordConfig {
            zone: String::from("example.com"),
            name: String::from("www"),
            record_type: String::from("A"),
            data: String::from("1.2.3.4"),
            ..DnsRecordConfig::default()
        };
        assert_eq!(config.spec().ttl, 3600);
    }

    #[rstest]
    fn plan_leaves_a_matching_record_alone() {
        let config = DnsRecordConfig {
            zone: String::from("example.com"),
            name: String::from("www"),
            record_type: String::from("A"),
            data: String::from("1.2.3.4"),
            ttl: 300,
            priority: 0,
        };
        let observed = vec![record("www", "A", "1.2.3.4", 300)];
        let (additions, removals) = plan_changes(&config, &observed);
        assert!(additions.is_empty());
        assert!(removals.is_empty());
    }

    #[rstest]
    fn plan_replaces_a_record_whose_ttl_drifted() {
        let config = DnsRecordConfig {
            zone: String::from("example.com"),
            name: String::from("www"),
            record_type: String::from("A"),
            data: String::from("1.2.3.4"),
            ttl: 300,
            priority: 0,
        };
        let observed = vec![record("www", "A", "1.2.3.4", 600)];
        let (additions, removals) = plan_changes(&config, &observed);
        assert_eq!(additions.len(), 1);
        assert_eq!(additions[0].ttl, 300);
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].ttl, 600);
    }

    #[rstest]
    fn plan_ignores_records_of_other_names_and_types() {
        let config = DnsRecordConfig {
            zone: String::from("example.com"),
            name: String::from("www"),
            record_type: String::from("A"),
            data: String::from("1.2.3.4"),
            ttl: 300,
            priority: 0,
        };
        let observed = vec![
            record("www", "A", "1.2.3.4", 300),
            record("www", "AAAA", "::1", 300),
            record("mail", "A", "5.6.7.8", 300),
        ];
        let (additions, removals) = plan_changes(&config, &observed);
        assert!(additions.is_empty());
        assert!(removals.is_empty());
    }

    #[rstest]
    fn zone_snapshot_uses_the_fqdn_as_id() {
        let zone = DnsZone {
            domain: String::from("example.com"),
            subdomain: String::from("blog"),
            status: String::from("active"),
            ns: vec![String::from("ns0.dom.scw.cloud.")],
            project_id: String::from("proj"),
        };
        assert_eq!(zone_snapshot(&zone).id, "blog.example.com");
    }
}
