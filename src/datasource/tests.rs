//! Unit tests for data-source resolution and synthetic identifiers.

use chrono::TimeZone;
use rstest::rstest;

use super::*;

#[derive(Clone, Debug, Eq, PartialEq)]
struct Image {
    name: String,
    modified_at: Option<DateTime<Utc>>,
}

fn image(name: &str, day: u32) -> Image {
    Image {
        name: name.to_owned(),
        modified_at: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).single(),
    }
}

#[rstest]
fn a_single_match_resolves_directly() {
    let found = resolve_lookup(
        vec![image("debian-12", 1)],
        &exact_only(),
        "instance_image",
        "debian-12",
    );
    assert_eq!(found, Ok(image("debian-12", 1)));
}

#[rstest]
fn zero_matches_fail_with_not_found() {
    let result = resolve_lookup(
        Vec::<Image>::new(),
        &exact_only(),
        "instance_image",
        "debian-13",
    );
    assert_eq!(
        result,
        Err(LookupError::NotFound {
            kind: "instance_image",
            filter: String::from("debian-13"),
        })
    );
}

#[rstest]
fn several_matches_without_latest_are_ambiguous() {
    let result = resolve_lookup(
        vec![image("debian-12", 1), image("debian-12", 2)],
        &exact_only(),
        "instance_image",
        "debian-12",
    );
    assert_eq!(
        result,
        Err(LookupError::Ambiguous {
            kind: "instance_image",
            filter: String::from("debian-12"),
            count: 2,
        })
    );
}

#[rstest]
fn latest_picks_the_most_recently_modified_match() {
    let tie_break = TieBreak::Latest(|item: &Image| item.modified_at);
    let found = resolve_lookup(
        vec![image("debian-12", 1), image("debian-12", 9), image("debian-12", 3)],
        &tie_break,
        "instance_image",
        "debian-12",
    );
    assert_eq!(found, Ok(image("debian-12", 9)));
}

#[rstest]
fn ambiguity_errors_name_the_filter_and_count() {
    let err = LookupError::Ambiguous {
        kind: "lb",
        filter: String::from("prod"),
        count: 3,
    };
    let rendered = err.to_string();
    assert!(rendered.contains("3 lb results"));
    assert!(rendered.contains("\"prod\""));
}

#[rstest]
fn filter_ids_are_stable_across_reads() {
    let first = filter_id(["a", "b"]);
    let second = filter_id(["a", "b"]);
    assert_eq!(first, second);
    assert_ne!(first, filter_id(["a", "c"]));
}

#[rstest]
fn billing_invoices_id_matches_the_documented_hash() {
    let filter = InvoiceFilter {
        started_after: String::from("2024-01-01"),
        started_before: String::from("2024-02-01"),
        invoice_type: String::from("periodic"),
        organization_id: String::from("ORG"),
    };
    assert_eq!(
        billing_invoices_id(&filter),
        "cd0216b10490cee714cf131fbb544884eea127202ed529c958bf8f8444aea1bd"
    );
}
