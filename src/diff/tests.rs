//! Unit tests for the collection reconcilers.

use rstest::rstest;

use super::*;
use crate::api::lb::{AclAction, AclFrontendRef};

fn spec(name: &str, kind: &str, subnets: &[&str]) -> AclSpec {
    AclSpec {
        name: name.to_owned(),
        index: 0,
        action: AclAction {
            kind: kind.to_owned(),
        },
        criteria: AclMatch {
            ip_subnet: subnets.iter().map(|s| (*s).to_owned()).collect(),
            ..AclMatch::default()
        },
    }
}

fn remote(name: &str, kind: &str, subnets: &[&str]) -> Acl {
    Acl {
        id: String::from("acl-id"),
        name: name.to_owned(),
        index: 0,
        action: AclAction {
            kind: kind.to_owned(),
        },
        criteria: AclMatch {
            ip_subnet: subnets.iter().map(|s| (*s).to_owned()).collect(),
            ..AclMatch::default()
        },
        frontend: Some(AclFrontendRef {
            id: String::from("frontend-id"),
        }),
    }
}

fn record(name: &str, record_type: &str, data: &str) -> DnsRecord {
    DnsRecord {
        id: String::from("record-id"),
        name: name.to_owned(),
        record_type: record_type.to_owned(),
        data: data.to_owned(),
        ttl: 300,
        priority: 0,
    }
}

#[rstest]
fn positional_plan_covers_update_create_and_delete() {
    let declared = vec!["a", "b", "c"];
    let observed = vec!["a", "x"];
    let ops = reconcile_positional(&declared, &observed, |d, r| d == r);
    assert_eq!(
        ops,
        vec![
            PositionalOp::Update { index: 1 },
            PositionalOp::Create { index: 2 },
        ]
    );
}

#[rstest]
fn positional_plan_deletes_trailing_remote_elements() {
    let declared = vec!["a"];
    let observed = vec!["a", "b", "c"];
    let ops = reconcile_positional(&declared, &observed, |d, r| d == r);
    assert_eq!(
        ops,
        vec![
            PositionalOp::Delete { index: 1 },
            PositionalOp::Delete { index: 2 },
        ]
    );
}

#[rstest]
fn positional_plan_reaches_a_fixed_point() {
    let declared = vec!["a", "b"];
    let observed = vec!["x"];
    let first = reconcile_positional(&declared, &observed, |d, r| d == r);
    assert!(!first.is_empty());
    // After applying the plan the remote equals the declaration.
    let converged = declared.clone();
    let second = reconcile_positional(&declared, &converged, |d, r| d == r);
    assert!(second.is_empty());
}

#[rstest]
fn set_delta_separates_additions_and_removals() {
    let declared = vec!["a", "b", "c"];
    let observed = vec!["b", "d"];
    let delta = reconcile_sets(&declared, &observed, |d| (*d).to_owned(), |r| (*r).to_owned());
    assert_eq!(delta.additions, vec![0, 2]);
    assert_eq!(delta.removals, vec![1]);
}

#[rstest]
fn set_delta_matches_duplicates_one_for_one() {
    let declared = vec!["a", "a"];
    let observed = vec!["a"];
    let delta = reconcile_sets(&declared, &observed, |d| (*d).to_owned(), |r| (*r).to_owned());
    assert_eq!(delta.additions, vec![1]);
    assert!(delta.removals.is_empty());
}

#[rstest]
fn set_delta_is_settled_when_collections_agree() {
    let declared = vec!["b", "a"];
    let observed = vec!["a", "b"];
    let delta = reconcile_sets(&declared, &observed, |d| (*d).to_owned(), |r| (*r).to_owned());
    assert!(delta.is_settled());
}

#[rstest]
fn empty_acl_subnets_hash_like_the_open_subnet() {
    let open = spec("", "allow", &["0.0.0.0/0"]);
    let omitted = spec("", "allow", &[]);
    assert_eq!(acl_spec_key(&open), acl_spec_key(&omitted));
}

#[rstest]
fn acl_equality_ignores_server_assigned_fields() {
    let declared = spec("rule-1", "allow", &["10.0.0.0/8"]);
    let mut observed = remote("rule-1", "allow", &["10.0.0.0/8"]);
    observed.id = String::from("other-id");
    observed.index = 7;
    assert!(acls_equivalent(&declared, &observed));
}

#[rstest]
fn omitted_acl_names_inherit_from_the_remote_rule() {
    let mut declared = vec![spec("", "allow", &["10.0.0.0/8"]), spec("named", "deny", &[])];
    let observed = vec![
        remote("keep-me", "allow", &["10.0.0.0/8"]),
        remote("remote-name", "deny", &[]),
    ];
    inherit_acl_names(&mut declared, &observed);
    assert_eq!(declared[0].name, "keep-me");
    assert_eq!(declared[1].name, "named");
    assert!(acls_equivalent(&declared[0], &observed[0]));
}

#[rstest]
#[case("ns0.online.net.", true)]
#[case("ns9.online.net.", true)]
#[case("ns10.online.net.", false)]
#[case("nsa.online.net.", false)]
#[case("ns0.online.net", false)]
#[case("ns1.scaleway.com.", false)]
fn online_ns_data_is_recognized(#[case] data: &str, #[case] expected: bool) {
    assert_eq!(is_online_ns_data(data), expected);
}

#[rstest]
fn observed_records_drop_registrar_ns_entries() {
    let records = vec![
        record("@", "NS", "ns0.online.net."),
        record("@", "NS", "ns1.online.net."),
        record("@", "A", "1.2.3.4"),
        record("ns0.online.net.", "A", "5.6.7.8"),
    ];
    let kept = filter_online_ns(records);
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|r| r.record_type != "NS"));
}

#[rstest]
fn content_hash_is_stable_and_order_sensitive() {
    assert_eq!(content_hash(["a", "b"]), content_hash(["a", "b"]));
    assert_ne!(content_hash(["a", "b"]), content_hash(["b", "a"]));
    assert_ne!(content_hash(["ab"]), content_hash(["a", "b"]));
}

#[rstest]
fn dns_record_key_tracks_every_semantic_field() {
    let base = dns_record_key("www", "A", "1.2.3.4", 300, 0);
    assert_eq!(base, dns_record_key("www", "A", "1.2.3.4", 300, 0));
    assert_ne!(base, dns_record_key("www", "A", "1.2.3.4", 600, 0));
    assert_ne!(base, dns_record_key("www", "AAAA", "1.2.3.4", 300, 0));
}
