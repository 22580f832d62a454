//! Unit tests for the retry transport.

use super::*;
use rstest::rstest;

#[rstest]
fn default_policy_matches_documented_bounds() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.min_wait, Duration::from_secs(2));
    assert_eq!(policy.max_wait, Duration::from_secs(120));
}

#[rstest]
#[case(0, 2)]
#[case(1, 4)]
#[case(2, 8)]
#[case(10, 120)]
fn backoff_doubles_and_caps(#[case] attempt: u32, #[case] expected_secs: u64) {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(attempt), Duration::from_secs(expected_secs));
}

#[rstest]
fn request_spec_buffers_body_and_query() {
    let spec = RequestSpec::new(Method::POST, "https://api.scaleway.com/x")
        .with_query("page", "1")
        .with_body(serde_json::json!({"name": "demo"}));
    assert_eq!(spec.query, vec![(String::from("page"), String::from("1"))]);
    assert_eq!(
        spec.body.as_ref().and_then(|body| body.get("name")),
        Some(&serde_json::json!("demo"))
    );
}

#[rstest]
fn transport_builds_with_a_plain_secret() {
    assert!(RetryTransport::new("scw-secret", RetryPolicy::default()).is_ok());
}

#[rstest]
fn transport_rejects_unprintable_secrets() {
    assert!(RetryTransport::new("bad\nsecret", RetryPolicy::default()).is_err());
}
