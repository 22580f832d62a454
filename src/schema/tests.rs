//! Unit tests for schema descriptors and diagnostics.

use rstest::rstest;

use super::*;

fn descriptor() -> SchemaDescriptor {
    SchemaDescriptor {
        kind: "scaleway_rdb_user",
        attributes: vec![
            Attribute::required("name", AttributeKind::String).force_new(),
            Attribute::required("password", AttributeKind::String).sensitive(),
            Attribute::optional("is_admin", AttributeKind::Bool),
            Attribute::computed("updated_at", AttributeKind::String),
        ],
    }
}

#[rstest]
fn attributes_are_found_by_name() {
    let schema = descriptor();
    let name = schema.attribute("name").expect("attribute should exist");
    assert!(name.required);
    assert!(name.force_new);
    assert!(schema.attribute("nonexistent").is_none());
}

#[rstest]
fn sensitive_attributes_are_enumerated_for_redaction() {
    assert_eq!(descriptor().sensitive_attributes(), vec!["password"]);
}

#[rstest]
fn computed_attributes_are_neither_required_nor_sensitive() {
    let schema = descriptor();
    let updated = schema
        .attribute("updated_at")
        .expect("attribute should exist");
    assert!(updated.computed);
    assert!(!updated.required);
    assert!(!updated.sensitive);
}

#[rstest]
fn diagnostics_report_errors_but_not_warnings() {
    let mut diagnostics = Diagnostics::new();
    assert!(!diagnostics.has_errors());
    diagnostics.push(Diagnostic::warning("drift", "tags reordered remotely"));
    assert!(!diagnostics.has_errors());
    diagnostics.push(
        Diagnostic::error("invalid CIDR", "bad prefix length").with_attribute("ip_range"),
    );
    assert!(diagnostics.has_errors());
    assert_eq!(diagnostics.entries().len(), 2);
    assert_eq!(
        diagnostics.entries()[1].attribute.as_deref(),
        Some("ip_range")
    );
}

#[rstest]
fn single_diagnostic_converts_into_a_collection() {
    let diagnostics: Diagnostics = Diagnostic::error("boom", "").into();
    assert!(diagnostics.has_errors());
    assert_eq!(diagnostics.entries().len(), 1);
}
