//! Load balancer, backend, and frontend-ACL controllers.
//!
//! ACLs are reconciled positionally against a frontend: the declared list
//! is the evaluation order, updates happen in place, and trailing remote
//! rules are deleted. Backend server-IP lists are replaced in one batched
//! call when they drift.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::lb::{Acl, AclAction, AclMatch, AclSpec, Backend, LbApi, LoadBalancer};
use crate::api::ApiError;
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, OperationError, ReadOutcome,
    ResourceController, WithOperation,
};
use crate::diff::{acls_equivalent, inherit_acl_names, reconcile_positional, PositionalOp};
use crate::locality::{decode, expand_last_uuid, Zone};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::{wait_for_gone, wait_for_status, Observation, OperationContext, DEFAULT_POLL_INTERVAL};

use super::zone_scope;

const READY: [&str; 1] = ["ready"];
const FAILED: [&str; 2] = ["error", "locked"];

fn observation(result: Result<LoadBalancer, ApiError>) -> Result<Observation<LoadBalancer>, ApiError> {
    match result {
        Ok(lb) => Ok(Observation::Present(lb)),
        Err(err) if err.is_gone(false) => Ok(Observation::Gone),
        Err(err) => Err(err),
    }
}

/// Declared configuration for a load balancer.
#[derive(Clone, Debug, Default)]
pub struct LoadBalancerConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Balancer name.
    pub name: String,
    /// Commercial offer, immutable.
    pub offer_type: String,
    /// Project override.
    pub project_id: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
}

/// State snapshot for a load balancer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadBalancerSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Balancer name.
    pub name: String,
    /// Lifecycle status.
    pub status: String,
    /// Commercial offer.
    pub offer_type: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Owning project.
    pub project_id: String,
}

fn lb_snapshot(zone: Zone, lb: &LoadBalancer) -> LoadBalancerSnapshot {
    LoadBalancerSnapshot {
        id: format!("{zone}/{}", lb.id),
        name: lb.name.clone(),
        status: lb.status.clone(),
        offer_type: lb.offer_type.clone(),
        tags: lb.tags.clone(),
        project_id: lb.project_id.clone(),
    }
}

/// Controller for `scaleway_lb`.
pub struct LoadBalancerController {
    session: Arc<Session>,
}

impl LoadBalancerController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> LbApi {
        LbApi::new(self.session.api(), zone)
    }

    async fn wait_ready(
        &self,
        ctx: &OperationContext,
        api: &LbApi,
        lb_id: &str,
    ) -> Result<LoadBalancer, OperationError> {
        let lb = wait_for_status(ctx, DEFAULT_POLL_INTERVAL, &READY, &FAILED, || async {
            observation(api.get_lb(lb_id).await)
        })
        .await?;
        Ok(lb)
    }
}

#[async_trait]
impl ResourceController for LoadBalancerController {
    type Config = LoadBalancerConfig;
    type State = LoadBalancerSnapshot;

    const KIND: &'static str = "scaleway_lb";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("name", AttributeKind::String),
                Attribute::required("type", AttributeKind::String).force_new(),
                Attribute::optional("zone", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::optional("tags", AttributeKind::StringList),
                Attribute::computed("status", AttributeKind::String),
            ],
        }
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let zone = self.session.zone_or_default(config.zone);
        let api = self.api(zone);
        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| self.session.default_project());
        info!(kind = Self::KIND, %zone, name = %config.name, "creating load balancer");
        let body = serde_json::json!({
            "name": config.name,
            "type": config.offer_type,
            "project_id": project,
            "tags": config.tags,
        });
        let lb = api
            .create_lb(&body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", lb.id);
        let settled = self
            .wait_ready(ctx, &api, &lb.id)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, lb_snapshot(zone, &settled)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(zone);
        let outcome = outcome_from(api.get_lb(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(lb) => ReadOutcome::Present(lb_snapshot(zone, &lb)),
            ReadOutcome::Gone => ReadOutcome::Gone,
        })
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Update, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(zone);
        let lb_id = uuid.to_string();
        self.wait_ready(ctx, &api, &lb_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let body = serde_json::json!({ "name": config.name, "tags": config.tags });
        api.update_lb(&lb_id, &body)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let settled = self
            .wait_ready(ctx, &api, &lb_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(lb_snapshot(zone, &settled))
    }

    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        let lb_id = uuid.to_string();
        info!(kind = Self::KIND, %zone, "deleting load balancer");
        ignore_gone(api.delete_lb(&lb_id).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)?;
        wait_for_gone::<LoadBalancer, _, _>(ctx, DEFAULT_POLL_INTERVAL, || async {
            observation(api.get_lb(&lb_id).await)
        })
        .await
        .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// Declared configuration for a backend pool.
#[derive(Clone, Debug, Default)]
pub struct BackendConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Parent balancer, bare UUID or locality-qualified.
    pub lb_id: String,
    /// Backend name.
    pub name: String,
    /// Forwarding protocol (`tcp` or `http`).
    pub forward_protocol: String,
    /// Forwarding port.
    pub forward_port: u16,
    /// Server IPs behind the backend; order is not significant remotely
    /// but the declared order is preserved in state.
    pub server_ips: Vec<String>,
}

/// State snapshot for a backend pool.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackendSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Backend name.
    pub name: String,
    /// Forwarding protocol.
    pub forward_protocol: String,
    /// Forwarding port.
    pub forward_port: u16,
    /// Server IPs.
    pub server_ips: Vec<String>,
}

fn backend_snapshot(zone: Zone, backend: &Backend) -> BackendSnapshot {
    BackendSnapshot {
        id: format!("{zone}/{}", backend.id),
        name: backend.name.clone(),
        forward_protocol: backend.forward_protocol.clone(),
        forward_port: backend.forward_port,
        server_ips: backend.server_ip.clone(),
    }
}

/// True when the remote IP list already matches the declared one,
/// ignoring order.
fn server_ips_settled(declared: &[String], remote: &[String]) -> bool {
    let mut declared: Vec<&String> = declared.iter().collect();
    let mut remote: Vec<&String> = remote.iter().collect();
    declared.sort();
    remote.sort();
    declared == remote
}

/// Controller for `scaleway_lb_backend`.
pub struct LbBackendController {
    session: Arc<Session>,
}

impl LbBackendController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> LbApi {
        LbApi::new(self.session.api(), zone)
    }
}

#[async_trait]
impl ResourceController for LbBackendController {
    type Config = BackendConfig;
    type State = BackendSnapshot;

    const KIND: &'static str = "scaleway_lb_backend";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("lb_id", AttributeKind::String).force_new(),
                Attribute::required("name", AttributeKind::String),
                Attribute::required("forward_protocol", AttributeKind::String),
                Attribute::required("forward_port", AttributeKind::Int),
                Attribute::optional("server_ips", AttributeKind::StringList),
                Attribute::optional("zone", AttributeKind::String).force_new(),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let zone = self.session.zone_or_default(config.zone);
        let api = self.api(zone);
        let lb_id = expand_last_uuid(&config.lb_id);
        info!(kind = Self::KIND, %zone, name = %config.name, "creating backend");
        let body = serde_json::json!({
            "name": config.name,
            "forward_protocol": config.forward_protocol,
            "forward_port": config.forward_port,
            "server_ip": config.server_ips,
        });
        let backend = api
            .create_backend(&lb_id, &body)
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", backend.id);
        Ok((id, backend_snapshot(zone, &backend)))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(zone);
        let outcome = outcome_from(api.get_backend(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(backend) => {
                ReadOutcome::Present(backend_snapshot(zone, &backend))
            }
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
        let zone = zone_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(zone);
        let backend_id = uuid.to_string();
        let current = api
            .get_backend(&backend_id)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        let settled = if server_ips_settled(&config.server_ips, &current.server_ip) {
            current
        } else {
            api.set_backend_servers(&backend_id, &config.server_ips)
                .await
                .in_operation(Operation::Update, Self::KIND, id)?
        };
        Ok(backend_snapshot(zone, &settled))
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        ignore_gone(api.delete_backend(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

/// One declared ACL rule.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AclRuleConfig {
    /// Rule name; inherited from the matching remote rule when empty.
    pub name: String,
    /// `allow` or `deny`.
    pub action: String,
    /// Source subnets; empty means everywhere.
    pub ip_subnets: Vec<String>,
    /// HTTP filter kind, empty for none.
    pub http_filter: String,
    /// HTTP filter values.
    pub http_filter_values: Vec<String>,
    /// Whether the match is inverted.
    pub invert: bool,
}

/// Declared configuration for a frontend's ACL list.
#[derive(Clone, Debug, Default)]
pub struct AclListConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Parent frontend, bare UUID or locality-qualified.
    pub frontend_id: String,
    /// Ordered rules; the declared order is the evaluation order.
    pub rules: Vec<AclRuleConfig>,
}

/// State snapshot for a frontend's ACL list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AclListSnapshot {
    /// Locality-qualified frontend identifier.
    pub id: String,
    /// Rules in evaluation order.
    pub rules: Vec<AclRuleConfig>,
}

fn acl_spec(index: usize, rule: &AclRuleConfig) -> AclSpec {
    AclSpec {
        name: rule.name.clone(),
        index: u32::try_from(index).unwrap_or(u32::MAX),
        action: AclAction {
            kind: rule.action.clone(),
        },
        criteria: AclMatch {
            ip_subnet: rule.ip_subnets.clone(),
            http_filter: rule.http_filter.clone(),
            http_filter_value: rule.http_filter_values.clone(),
            invert: rule.invert,
        },
    }
}

fn acl_rule_snapshot(acl: &Acl) -> AclRuleConfig {
    AclRuleConfig {
        name: acl.name.clone(),
        action: acl.action.kind.clone(),
        ip_subnets: acl.criteria.ip_subnet.clone(),
        http_filter: acl.criteria.http_filter.clone(),
        http_filter_values: acl.criteria.http_filter_value.clone(),
        invert: acl.criteria.invert,
    }
}

/// Plans the positional reconciliation for a declared ACL list. Names are
/// inherited from matching remote rules first so an omitted name never
/// forces an update.
fn plan_acls(declared: &[AclRuleConfig], remote: &[Acl]) -> (Vec<AclSpec>, Vec<PositionalOp>) {
    let mut specs: Vec<AclSpec> = declared
        .iter()
        .enumerate()
        .map(|(index, rule)| acl_spec(index, rule))
        .collect();
    inherit_acl_names(&mut specs, remote);
    let ops = reconcile_positional(&specs, remote, acls_equivalent);
    (specs, ops)
}

/// Controller for `scaleway_lb_acl`, managing the full ACL list of one
/// frontend.
pub struct LbAclController {
    session: Arc<Session>,
}

impl LbAclController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> LbApi {
        LbApi::new(self.session.api(), zone)
    }

    async fn reconcile(
        &self,
        api: &LbApi,
        frontend_id: &str,
        declared: &[AclRuleConfig],
    ) -> Result<Vec<Acl>, OperationError> {
        let remote = api.list_acls(frontend_id).await?;
        let (specs, ops) = plan_acls(declared, &remote);
        for op in ops {
            match op {
                PositionalOp::Update { index } => {
                    api.update_acl(&remote[index].id, &specs[index]).await?;
                }
                PositionalOp::Create { index } => {
                    api.create_acl(frontend_id, &specs[index]).await?;
                }
                PositionalOp::Delete { index } => {
                    api.delete_acl(&remote[index].id).await?;
                }
            }
        }
        Ok(api.list_acls(frontend_id).await?)
    }
}

#[async_trait]
impl ResourceController for LbAclController {
    type Config = AclListConfig;
    type State = AclListSnapshot;

    const KIND: &'static str = "scaleway_lb_acl";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("frontend_id", AttributeKind::String).force_new(),
                Attribute::optional("zone", AttributeKind::String).force_new(),
            ],
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError> {
        let zone = self.session.zone_or_default(config.zone);
        let api = self.api(zone);
        let frontend_id = expand_last_uuid(&config.frontend_id);
        let id = format!("{zone}/{frontend_id}");
        info!(kind = Self::KIND, %zone, "reconciling frontend ACLs");
        let settled = self
            .reconcile(&api, &frontend_id, &config.rules)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((
            id.clone(),
            AclListSnapshot {
                id,
                rules: settled.iter().map(acl_rule_snapshot).collect(),
            },
        ))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(zone);
        let outcome = outcome_from(api.list_acls(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        Ok(match outcome {
            ReadOutcome::Present(acls) => ReadOutcome::Present(AclListSnapshot {
                id: id.to_owned(),
                rules: acls.iter().map(acl_rule_snapshot).collect(),
            }),
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
        let zone = zone_scope(scope, id).in_operation(Operation::Update, Self::KIND, id)?;
        let api = self.api(zone);
        let settled = self
            .reconcile(&api, &uuid.to_string(), &config.rules)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        Ok(AclListSnapshot {
            id: id.to_owned(),
            rules: settled.iter().map(acl_rule_snapshot).collect(),
        })
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        let remote = match outcome_from(api.list_acls(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)?
        {
            ReadOutcome::Present(acls) => acls,
            ReadOutcome::Gone => return Ok(()),
        };
        for acl in remote {
            ignore_gone(api.delete_acl(&acl.id).await, false)
                .in_operation(Operation::Delete, Self::KIND, id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::lb::AclFrontendRef;

    fn declared(name: &str, action: &str, subnets: &[&str]) -> AclRuleConfig {
        AclRuleConfig {
            name: name.to_owned(),
            action: action.to_owned(),
            ip_subnets: subnets.iter().map(|s| (*s).to_owned()).collect(),
            http_filter: String::new(),
            http_filter_values: vec![],
            invert: false,
        }
    }

    fn remote(name: &str, action: &str, index: u32, subnets: &[&str]) -> Acl {
        Acl {
            id: format!("acl-{index}"),
            name: name.to_owned(),
            index,
            action: AclAction {
                kind: action.to_owned(),
            },
            criteria: AclMatch {
                ip_subnet: subnets.iter().map(|s| (*s).to_owned()).collect(),
                http_filter: String::new(),
                http_filter_value: vec![],
                invert: false,
            },
            frontend: Some(AclFrontendRef {
                id: String::from("frontend"),
            }),
        }
    }

    #[rstest]
    fn unchanged_acl_lists_plan_no_operations() {
        let rules = vec![
            declared("first", "allow", &["10.0.0.0/8"]),
            declared("second", "deny", &[]),
        ];
        let observed = vec![
            remote("first", "allow", 0, &["10.0.0.0/8"]),
            remote("second", "deny", 1, &["0.0.0.0/0"]),
        ];
        let (_, ops) = plan_acls(&rules, &observed);
        assert!(ops.is_empty());
    }

    #[rstest]
    fn changed_rule_updates_in_place_and_trailing_rules_are_deleted() {
        let rules = vec![declared("first", "deny", &["10.0.0.0/8"])];
        let observed = vec![
            remote("first", "allow", 0, &["10.0.0.0/8"]),
            remote("stale", "deny", 1, &[]),
        ];
        let (_, ops) = plan_acls(&rules, &observed);
        assert_eq!(
            ops,
            vec![
                PositionalOp::Update { index: 0 },
                PositionalOp::Delete { index: 1 },
            ]
        );
    }

    #[rstest]
    fn omitted_names_do_not_force_updates() {
        let rules = vec![declared("", "allow", &["10.0.0.0/8"])];
        let observed = vec![remote("remote-name", "allow", 0, &["10.0.0.0/8"])];
        let (specs, ops) = plan_acls(&rules, &observed);
        assert!(ops.is_empty());
        assert_eq!(specs[0].name, "remote-name");
    }

    #[rstest]
    fn backend_ip_lists_compare_ignoring_order() {
        let declared = vec![String::from("10.0.0.1"), String::from("10.0.0.2")];
        let remote = vec![String::from("10.0.0.2"), String::from("10.0.0.1")];
        assert!(server_ips_settled(&declared, &remote));
        assert!(!server_ips_settled(&declared, &[String::from("10.0.0.1")]));
    }
}
