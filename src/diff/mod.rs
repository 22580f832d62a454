//! Nested-collection reconciliation.
//!
//! Remote APIs expose ACL rules, security-group rules, and DNS record sets
//! as collections nested under a parent resource. The declared collection
//! is the source of truth; this module computes the minimal operations
//! that make the remote collection match it. Two strategies exist:
//! positional for ordered collections and content-hash for sets. Running
//! either reconciler a second time with an unchanged declaration yields no
//! operations.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::api::domain::DnsRecord;
use crate::api::lb::{Acl, AclMatch, AclSpec};

/// One step produced by the positional reconciler. Indices refer to the
/// declared list for updates and creates, and to the remote list for
/// deletes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PositionalOp {
    /// The remote element at this position differs; update it in place.
    Update {
        /// Position in both lists.
        index: usize,
    },
    /// The declared list extends past the remote one; create this element.
    Create {
        /// Position in the declared list.
        index: usize,
    },
    /// The remote list extends past the declared one; delete this element.
    Delete {
        /// Position in the remote list.
        index: usize,
    },
}

/// Reconciles an ordered collection by position. `equivalent` compares a
/// declared element against a remote one ignoring server-assigned fields.
pub fn reconcile_positional<D, R>(
    declared: &[D],
    remote: &[R],
    equivalent: impl Fn(&D, &R) -> bool,
) -> Vec<PositionalOp> {
    let mut ops = Vec::new();
    for (index, element) in declared.iter().enumerate() {
        match remote.get(index) {
            Some(existing) if equivalent(element, existing) => {}
            Some(_) => ops.push(PositionalOp::Update { index }),
            None => ops.push(PositionalOp::Create { index }),
        }
    }
    for index in declared.len()..remote.len() {
        ops.push(PositionalOp::Delete { index });
    }
    ops
}

/// Outcome of the content-hash reconciler. Indices refer to the declared
/// list for additions and to the observed list for removals.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SetDelta {
    /// Declared elements absent from the observed collection.
    pub additions: Vec<usize>,
    /// Observed elements absent from the declared collection.
    pub removals: Vec<usize>,
}

impl SetDelta {
    /// True when the collections already agree.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Reconciles an unordered collection by content hash. Duplicate elements
/// are matched one-for-one, so a declared duplicate only cancels one
/// observed copy.
pub fn reconcile_sets<D, R>(
    declared: &[D],
    observed: &[R],
    declared_key: impl Fn(&D) -> String,
    observed_key: impl Fn(&R) -> String,
) -> SetDelta {
    let mut unmatched: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, element) in observed.iter().enumerate() {
        unmatched.entry(observed_key(element)).or_default().push(index);
    }
    let mut delta = SetDelta::default();
    for (index, element) in declared.iter().enumerate() {
        let key = declared_key(element);
        match unmatched.get_mut(&key) {
            Some(indices) if !indices.is_empty() => {
                indices.remove(0);
            }
            _ => delta.additions.push(index),
        }
    }
    let mut removals: Vec<usize> = unmatched.into_values().flatten().collect();
    removals.sort_unstable();
    delta.removals = removals;
    delta
}

/// SHA-256 over the given parts joined with `-`, rendered as lowercase
/// hex. Shared by the content-hash reconciler and the synthetic
/// data-source identifiers.
#[must_use]
pub fn content_hash<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    let mut first = true;
    for part in parts {
        if !first {
            hasher.update(b"-");
        }
        hasher.update(part.as_ref().as_bytes());
        first = false;
    }
    hex::encode(hasher.finalize())
}

/// Subnets an ACL match applies to. An empty list means "everything", so
/// `0.0.0.0/0` is substituted before comparison to avoid a false diff
/// against the remote default.
#[must_use]
pub fn acl_effective_subnets(criteria: &AclMatch) -> Vec<String> {
    if criteria.ip_subnet.is_empty() {
        vec![String::from("0.0.0.0/0")]
    } else {
        criteria.ip_subnet.clone()
    }
}

fn acl_match_key(criteria: &AclMatch) -> String {
    let mut parts = acl_effective_subnets(criteria);
    parts.push(criteria.http_filter.clone());
    parts.extend(criteria.http_filter_value.iter().cloned());
    parts.push(criteria.invert.to_string());
    content_hash(parts)
}

/// Content key for a declared ACL rule, ignoring position and name.
#[must_use]
pub fn acl_spec_key(spec: &AclSpec) -> String {
    content_hash([spec.action.kind.clone(), acl_match_key(&spec.criteria)])
}

/// Content key for a remote ACL rule, ignoring its identifier, position,
/// name, and frontend back-reference.
#[must_use]
pub fn acl_key(acl: &Acl) -> String {
    content_hash([acl.action.kind.clone(), acl_match_key(&acl.criteria)])
}

/// True when a declared rule matches the remote one at the same position.
#[must_use]
pub fn acls_equivalent(spec: &AclSpec, acl: &Acl) -> bool {
    let names_agree = spec.name.is_empty() || spec.name == acl.name;
    names_agree && acl_spec_key(spec) == acl_key(acl)
}

/// Copies names from matching remote rules onto declared rules that omit
/// one, so an omitted name never forces an update.
pub fn inherit_acl_names(declared: &mut [AclSpec], remote: &[Acl]) {
    for (index, spec) in declared.iter_mut().enumerate() {
        if !spec.name.is_empty() {
            continue;
        }
        if let Some(existing) = remote.get(index) {
            spec.name.clone_from(&existing.name);
        }
    }
}

/// True for the registrar-managed NS records Online injects into every
/// zone. They are system-owned and excluded from reconciliation.
#[must_use]
pub fn is_online_ns_data(data: &str) -> bool {
    let Some(rest) = data.strip_prefix("ns") else {
        return false;
    };
    let mut chars = rest.chars();
    chars.next().is_some_and(|c| c.is_ascii_digit()) && chars.as_str() == ".online.net."
}

/// Drops system-owned Online NS records from an observed record set.
#[must_use]
pub fn filter_online_ns(records: Vec<DnsRecord>) -> Vec<DnsRecord> {
    records
        .into_iter()
        .filter(|record| !(record.record_type == "NS" && is_online_ns_data(&record.data)))
        .collect()
}

/// Content key for a DNS record over its semantic fields.
#[must_use]
pub fn dns_record_key(name: &str, record_type: &str, data: &str, ttl: u32, priority: u32) -> String {
    content_hash([
        name,
        record_type,
        data,
        &ttl.to_string(),
        &priority.to_string(),
    ])
}

#[cfg(test)]
mod tests;
