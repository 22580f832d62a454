//! Unit tests for value conversions.

use super::*;
use rstest::rstest;

#[rstest]
#[case("", None)]
#[case("value", Some("value"))]
fn empty_string_means_unset(#[case] input: &str, #[case] expected: Option<&str>) {
    assert_eq!(empty_as_none(input), expected.map(str::to_owned));
    assert_eq!(none_as_empty(expected), input);
}

#[rstest]
#[case("30s", 30)]
#[case("10m", 600)]
#[case("1h30m", 5400)]
#[case("2h", 7200)]
fn durations_parse_whole_seconds(#[case] input: &str, #[case] secs: u64) {
    assert_eq!(
        parse_duration(input).expect("duration should parse"),
        std::time::Duration::from_secs(secs)
    );
}

#[rstest]
#[case("")]
#[case("abc")]
#[case("10")]
#[case("10w")]
#[case("s10")]
fn malformed_durations_are_rejected(#[case] input: &str) {
    assert!(matches!(
        parse_duration(input),
        Err(CodecError::UnparsableDuration { .. })
    ));
}

#[rstest]
#[case("60s", "1m")]
#[case("1m", "60s")]
#[case("3600s", "1h")]
#[case("90s", "1m30s")]
fn equivalent_durations_suppress_diffs(#[case] a: &str, #[case] b: &str) {
    assert!(durations_equivalent(a, b));
}

#[rstest]
#[case(60, "1m")]
#[case(90, "90s")]
#[case(3600, "1h")]
#[case(0, "0s")]
fn durations_render_largest_exact_unit(#[case] secs: u64, #[case] expected: &str) {
    assert_eq!(render_duration(std::time::Duration::from_secs(secs)), expected);
}

#[rstest]
#[case("1.2.3.4", "1.2.3.4/32")]
#[case("", "0.0.0.0/0")]
#[case("10.0.0.0/8", "10.0.0.0/8")]
#[case("::1", "::1/128")]
fn bare_ips_expand_to_subnets(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(
        expand_ip_to_cidr(input).expect("value should expand"),
        expected
    );
}

#[rstest]
#[case("not-an-ip")]
#[case("1.2.3.4/33")]
#[case("1.2.3/8")]
fn malformed_cidrs_are_rejected(#[case] input: &str) {
    assert!(matches!(
        expand_ip_to_cidr(input),
        Err(CodecError::MalformedCidr { .. })
    ));
}

#[rstest]
fn equivalent_cidrs_suppress_diffs() {
    assert!(cidrs_equivalent("1.2.3.4", "1.2.3.4/32"));
    assert!(!cidrs_equivalent("1.2.3.4", "1.2.3.5/32"));
}

#[rstest]
#[case("80-80", Some(80), Some(80))]
#[case("80-443", Some(80), Some(443))]
#[case("443", Some(443), Some(443))]
#[case("", None, None)]
fn port_ranges_parse(#[case] input: &str, #[case] from: Option<u16>, #[case] to: Option<u16>) {
    let range = PortRange::parse(input).expect("range should parse");
    assert_eq!(range.from, from);
    assert_eq!(range.to, to);
}

#[rstest]
fn port_overflow_carries_the_documented_message() {
    let err = PortRange::parse("6500000").expect_err("range should be rejected");
    assert_eq!(
        err.to_string(),
        "port from 6500000, with error: address 6500000: invalid port"
    );
}

#[rstest]
fn single_port_sends_only_from() {
    let range = PortRange::parse("80-80").expect("range should parse");
    assert_eq!(range.wire_fields(), (Some(80), None));
}

#[rstest]
fn zero_zero_means_any_port() {
    let range = PortRange {
        from: Some(0),
        to: Some(0),
    };
    assert_eq!(range.wire_fields(), (None, None));
    assert_eq!(PortRange::default().wire_fields(), (None, None));
}

#[rstest]
fn timestamps_render_rfc3339_and_empty_when_unset() {
    assert_eq!(render_timestamp(None), "");
    let ts = parse_timestamp("2024-01-15T10:00:00Z").expect("timestamp should parse");
    assert_eq!(render_timestamp(ts), "2024-01-15T10:00:00Z");
    assert_eq!(parse_timestamp("").expect("empty should parse"), None);
    assert!(matches!(
        parse_timestamp("yesterday"),
        Err(CodecError::MalformedTimestamp { .. })
    ));
}

#[rstest]
fn tag_order_differences_are_tolerated() {
    let declared = vec![String::from("a"), String::from("b")];
    let remote = vec![String::from("b"), String::from("a")];
    assert!(tags_equivalent(&declared, &remote));
    assert!(!tags_equivalent(&declared, &[String::from("a")]));
}
