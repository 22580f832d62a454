//! Security group controller with positional rule reconciliation.
//!
//! Rules are declared as ordered lists per direction; the declared order
//! is the evaluation order. Only editable remote rules participate in
//! reconciliation; system rules are left untouched and never counted
//! against declared positions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::instance::{InstanceApi, SecurityGroup, SecurityGroupRule, SecurityGroupRuleSpec};
use crate::codec::{cidrs_equivalent, expand_ip_to_cidr, PortRange};
use crate::controller::{
    ignore_gone, outcome_from, ControllerError, Operation, OperationError, ReadOutcome,
    ResourceController, WithOperation,
};
use crate::diff::{reconcile_positional, PositionalOp};
use crate::locality::{decode, Zone};
use crate::schema::{Attribute, AttributeKind, SchemaDescriptor};
use crate::session::Session;
use crate::wait::OperationContext;

use super::{validation, zone_scope};

/// One declared rule, in configuration form.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuleConfig {
    /// `accept` or `drop`.
    pub action: String,
    /// `TCP`, `UDP`, `ICMP`, or `ANY`.
    pub protocol: String,
    /// IP or CIDR; empty means everywhere.
    pub ip_range: String,
    /// `"80"`, `"80-443"`, or empty for any port.
    pub port_range: String,
}

/// A declared rule expanded to wire-comparable form.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExpandedRule {
    /// `accept` or `drop`.
    pub action: String,
    /// `TCP`, `UDP`, `ICMP`, or `ANY`.
    pub protocol: String,
    /// Normalized CIDR.
    pub ip_range: String,
    /// First destination port; `None` means any.
    pub dest_port_from: Option<u16>,
    /// Last destination port; `None` when any or equal to `from`.
    pub dest_port_to: Option<u16>,
}

/// Expands a configured rule, normalizing the IP to CIDR form and
/// resolving the port range. Both ends are kept here; the wire spec drops
/// the redundant `to`.
///
/// # Errors
///
/// Returns [`OperationError::Validation`] naming the offending attribute.
pub fn expand_rule(config: &RuleConfig) -> Result<ExpandedRule, OperationError> {
    let ip_range = expand_ip_to_cidr(&config.ip_range)
        .map_err(|err| validation("ip_range", err.to_string()))?;
    let ports = PortRange::parse(&config.port_range)
        .map_err(|err| validation("port_range", err.to_string()))?;
    Ok(ExpandedRule {
        action: config.action.clone(),
        protocol: config.protocol.clone(),
        ip_range,
        dest_port_from: ports.from,
        dest_port_to: ports.to,
    })
}

/// Builds the wire spec for a declared rule at a position.
fn rule_spec(direction: &str, rule: &ExpandedRule, position: Option<u32>) -> SecurityGroupRuleSpec {
    let (dest_port_from, dest_port_to) = PortRange {
        from: rule.dest_port_from,
        to: rule.dest_port_to,
    }
    .wire_fields();
    SecurityGroupRuleSpec {
        direction: direction.to_owned(),
        action: rule.action.clone(),
        protocol: rule.protocol.clone(),
        ip_range: rule.ip_range.clone(),
        dest_port_from,
        dest_port_to,
        position,
    }
}

/// Compares a declared rule against a remote one, tolerating the wire
/// form's dropped `dest_port_to` and equivalent CIDR spellings.
fn rules_equivalent(declared: &ExpandedRule, remote: &SecurityGroupRule) -> bool {
    let remote_to = remote.dest_port_to.or(remote.dest_port_from);
    let declared_to = declared.dest_port_to.or(declared.dest_port_from);
    declared.action == remote.action
        && declared.protocol == remote.protocol
        && cidrs_equivalent(&declared.ip_range, &remote.ip_range)
        && declared.dest_port_from == remote.dest_port_from
        && declared_to == remote_to
}

/// Declared configuration for a security group.
#[derive(Clone, Debug, Default)]
pub struct SecurityGroupConfig {
    /// Zone override.
    pub zone: Option<Zone>,
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Project override.
    pub project_id: Option<String>,
    /// Policy for unmatched inbound traffic (`accept` or `drop`).
    pub inbound_default_policy: String,
    /// Policy for unmatched outbound traffic.
    pub outbound_default_policy: String,
    /// Whether connection tracking is enabled.
    pub stateful: bool,
    /// Tags.
    pub tags: Vec<String>,
    /// Ordered inbound rules.
    pub inbound_rules: Vec<RuleConfig>,
    /// Ordered outbound rules.
    pub outbound_rules: Vec<RuleConfig>,
}

/// State snapshot for a security group.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SecurityGroupSnapshot {
    /// Locality-qualified identifier.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Inbound default policy.
    pub inbound_default_policy: String,
    /// Outbound default policy.
    pub outbound_default_policy: String,
    /// Whether connection tracking is enabled.
    pub stateful: bool,
    /// Tags.
    pub tags: Vec<String>,
    /// Owning project.
    pub project_id: String,
    /// Inbound rules in evaluation order.
    pub inbound_rules: Vec<ExpandedRule>,
    /// Outbound rules in evaluation order.
    pub outbound_rules: Vec<ExpandedRule>,
}

fn rule_snapshot(rule: &SecurityGroupRule) -> ExpandedRule {
    ExpandedRule {
        action: rule.action.clone(),
        protocol: rule.protocol.clone(),
        ip_range: rule.ip_range.clone(),
        dest_port_from: rule.dest_port_from,
        dest_port_to: rule.dest_port_to.or(rule.dest_port_from),
    }
}

/// Controller for `scaleway_instance_security_group`.
pub struct SecurityGroupController {
    session: Arc<Session>,
}

impl SecurityGroupController {
    /// Builds the controller over a shared session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn api(&self, zone: Zone) -> InstanceApi {
        InstanceApi::new(self.session.api(), zone)
    }

    /// Splits remote rules by direction, keeping only editable ones, in
    /// position order.
    fn editable_by_direction(
        rules: &[SecurityGroupRule],
        direction: &str,
    ) -> Vec<SecurityGroupRule> {
        let mut rules: Vec<SecurityGroupRule> = rules
            .iter()
            .filter(|rule| rule.editable && rule.direction == direction)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.position);
        rules
    }

    async fn reconcile_direction(
        &self,
        api: &InstanceApi,
        group_id: &str,
        direction: &str,
        declared: &[RuleConfig],
        remote: &[SecurityGroupRule],
    ) -> Result<(), OperationError> {
        let expanded: Vec<ExpandedRule> = declared
            .iter()
            .map(expand_rule)
            .collect::<Result<_, _>>()?;
        let remote = Self::editable_by_direction(remote, direction);
        let ops = reconcile_positional(&expanded, &remote, rules_equivalent);
        for op in ops {
            match op {
                PositionalOp::Update { index } => {
                    let position = u32::try_from(index).unwrap_or(u32::MAX);
                    let spec = rule_spec(direction, &expanded[index], Some(position));
                    api.update_security_group_rule(group_id, &remote[index].id, &spec)
                        .await?;
                }
                PositionalOp::Create { index } => {
                    let position = u32::try_from(index).unwrap_or(u32::MAX);
                    let spec = rule_spec(direction, &expanded[index], Some(position));
                    api.create_security_group_rule(group_id, &spec).await?;
                }
                PositionalOp::Delete { index } => {
                    api.delete_security_group_rule(group_id, &remote[index].id)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn reconcile_rules(
        &self,
        api: &InstanceApi,
        group_id: &str,
        config: &SecurityGroupConfig,
    ) -> Result<(), OperationError> {
        let remote = api.list_security_group_rules(group_id).await?;
        self.reconcile_direction(api, group_id, "inbound", &config.inbound_rules, &remote)
            .await?;
        self.reconcile_direction(api, group_id, "outbound", &config.outbound_rules, &remote)
            .await
    }

    async fn read_snapshot(
        &self,
        api: &InstanceApi,
        zone: Zone,
        group: &SecurityGroup,
    ) -> Result<SecurityGroupSnapshot, OperationError> {
        let rules = api.list_security_group_rules(&group.id).await?;
        let inbound = Self::editable_by_direction(&rules, "inbound")
            .iter()
            .map(rule_snapshot)
            .collect();
        let outbound = Self::editable_by_direction(&rules, "outbound")
            .iter()
            .map(rule_snapshot)
            .collect();
        Ok(SecurityGroupSnapshot {
            id: format!("{zone}/{}", group.id),
            name: group.name.clone(),
            description: group.description.clone(),
            inbound_default_policy: group.inbound_default_policy.clone(),
            outbound_default_policy: group.outbound_default_policy.clone(),
            stateful: group.stateful,
            tags: group.tags.clone(),
            project_id: group.project.clone(),
            inbound_rules: inbound,
            outbound_rules: outbound,
        })
    }

    fn group_body(&self, config: &SecurityGroupConfig, include_project: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "name": config.name,
            "description": config.description,
            "inbound_default_policy": config.inbound_default_policy,
            "outbound_default_policy": config.outbound_default_policy,
            "stateful": config.stateful,
            "tags": config.tags,
        });
        if include_project {
            let project = config
                .project_id
                .clone()
                .unwrap_or_else(|| self.session.default_project());
            if let Some(map) = body.as_object_mut() {
                map.insert(String::from("project"), serde_json::json!(project));
            }
        }
        body
    }
}

#[async_trait]
impl ResourceController for SecurityGroupController {
    type Config = SecurityGroupConfig;
    type State = SecurityGroupSnapshot;

    const KIND: &'static str = "scaleway_instance_security_group";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: vec![
                Attribute::required("name", AttributeKind::String).force_new(),
                Attribute::optional("description", AttributeKind::String),
                Attribute::optional("zone", AttributeKind::String).force_new(),
                Attribute::optional("project_id", AttributeKind::String).force_new(),
                Attribute::optional("inbound_default_policy", AttributeKind::String),
                Attribute::optional("outbound_default_policy", AttributeKind::String),
                Attribute::optional("stateful", AttributeKind::Bool).force_new(),
                Attribute::optional("tags", AttributeKind::StringList),
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
        info!(kind = Self::KIND, %zone, name = %config.name, "creating security group");
        let group = api
            .create_security_group(&self.group_body(config, true))
            .await
            .in_operation(Operation::Create, Self::KIND, "")?;
        let id = format!("{zone}/{}", group.id);
        self.reconcile_rules(&api, &group.id, config)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        let snapshot = self
            .read_snapshot(&api, zone, &group)
            .await
            .in_operation(Operation::Create, Self::KIND, &id)?;
        Ok((id, snapshot))
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Read, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Read, Self::KIND, id)?;
        let api = self.api(zone);
        let outcome = outcome_from(api.get_security_group(&uuid.to_string()).await, false)
            .in_operation(Operation::Read, Self::KIND, id)?;
        match outcome {
            ReadOutcome::Present(group) => {
                let snapshot = self
                    .read_snapshot(&api, zone, &group)
                    .await
                    .in_operation(Operation::Read, Self::KIND, id)?;
                Ok(ReadOutcome::Present(snapshot))
            }
            ReadOutcome::Gone => Ok(ReadOutcome::Gone),
        }
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
        let group_id = uuid.to_string();
        let group = api
            .update_security_group(&group_id, &self.group_body(config, false))
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        self.reconcile_rules(&api, &group_id, config)
            .await
            .in_operation(Operation::Update, Self::KIND, id)?;
        self.read_snapshot(&api, zone, &group)
            .await
            .in_operation(Operation::Update, Self::KIND, id)
    }

    async fn delete(&self, _ctx: &OperationContext, id: &str) -> Result<(), ControllerError> {
        let (scope, uuid) = decode(id).in_operation(Operation::Delete, Self::KIND, id)?;
        let zone = zone_scope(scope, id).in_operation(Operation::Delete, Self::KIND, id)?;
        let api = self.api(zone);
        info!(kind = Self::KIND, %zone, "deleting security group");
        ignore_gone(api.delete_security_group(&uuid.to_string()).await, false)
            .in_operation(Operation::Delete, Self::KIND, id)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn rule(action: &str, protocol: &str, ip_range: &str, port_range: &str) -> RuleConfig {
        RuleConfig {
            action: action.to_owned(),
            protocol: protocol.to_owned(),
            ip_range: ip_range.to_owned(),
            port_range: port_range.to_owned(),
        }
    }

    fn remote_rule(
        id: &str,
        position: u32,
        from: Option<u16>,
        to: Option<u16>,
    ) -> SecurityGroupRule {
        SecurityGroupRule {
            id: id.to_owned(),
            direction: String::from("inbound"),
            action: String::from("accept"),
            protocol: String::from("TCP"),
            ip_range: String::from("0.0.0.0/0"),
            dest_port_from: from,
            dest_port_to: to,
            position,
            editable: true,
        }
    }

    #[rstest]
    fn single_port_range_expands_to_both_ends() {
        let expanded = expand_rule(&rule("accept", "TCP", "0.0.0.0/32", "80-80"))
            .expect("rule should expand");
        assert_eq!(
            expanded,
            ExpandedRule {
                action: String::from("accept"),
                protocol: String::from("TCP"),
                ip_range: String::from("0.0.0.0/32"),
                dest_port_from: Some(80),
                dest_port_to: Some(80),
            }
        );
    }

    #[rstest]
    fn port_overflow_reports_the_documented_error_text() {
        let err = expand_rule(&rule("accept", "TCP", "", "6500000"))
            .expect_err("overflow should fail");
        let OperationError::Validation { attribute, message } = err else {
            panic!("expected a validation error");
        };
        assert_eq!(attribute, "port_range");
        assert_eq!(
            message,
            "port from 6500000, with error: address 6500000: invalid port"
        );
    }

    #[rstest]
    fn absent_port_range_means_any_port() {
        let expanded =
            expand_rule(&rule("accept", "TCP", "", "")).expect("rule should expand");
        assert_eq!(expanded.dest_port_from, None);
        assert_eq!(expanded.dest_port_to, None);
        assert_eq!(expanded.ip_range, "0.0.0.0/0");
    }

    #[rstest]
    fn wire_spec_drops_the_redundant_to_port() {
        let expanded = expand_rule(&rule("accept", "TCP", "1.2.3.4", "80-80"))
            .expect("rule should expand");
        let spec = rule_spec("inbound", &expanded, Some(0));
        assert_eq!(spec.dest_port_from, Some(80));
        assert_eq!(spec.dest_port_to, None);
        assert_eq!(spec.ip_range, "1.2.3.4/32");
    }

    #[rstest]
    fn remote_rules_missing_to_still_compare_equal() {
        let declared = expand_rule(&rule("accept", "TCP", "0.0.0.0/0", "80"))
            .expect("rule should expand");
        let remote = remote_rule("r1", 0, Some(80), None);
        assert!(rules_equivalent(&declared, &remote));
    }

    #[rstest]
    fn reconciliation_skips_non_editable_rules() {
        let mut system = remote_rule("system", 0, None, None);
        system.editable = false;
        let editable = remote_rule("user", 1, Some(22), None);
        let remote = vec![system, editable];
        let kept = SecurityGroupController::editable_by_direction(&remote, "inbound");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "user");
    }

    #[rstest]
    fn identical_declaration_produces_no_operations() {
        let declared = vec![
            expand_rule(&rule("accept", "TCP", "0.0.0.0/0", "80")).expect("expand"),
            expand_rule(&rule("accept", "TCP", "0.0.0.0/0", "")).expect("expand"),
        ];
        let remote = vec![
            remote_rule("r1", 0, Some(80), None),
            remote_rule("r2", 1, None, None),
        ];
        let ops = reconcile_positional(&declared, &remote, rules_equivalent);
        assert!(ops.is_empty());
    }
}
