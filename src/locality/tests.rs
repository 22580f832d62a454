//! Unit tests for the locality codec.

use super::*;
use rstest::rstest;

const UUID_A: &str = "11111111-1111-4111-8111-111111111111";

fn uuid_a() -> Uuid {
    Uuid::parse_str(UUID_A).expect("test uuid should parse")
}

#[rstest]
#[case(Zone::FrPar1, Region::FrPar)]
#[case(Zone::NlAms3, Region::NlAms)]
#[case(Zone::PlWaw2, Region::PlWaw)]
fn zone_maps_to_its_region(#[case] zone: Zone, #[case] expected: Region) {
    assert_eq!(zone.region(), expected);
}

#[rstest]
fn every_zone_round_trips_through_its_wire_form() {
    for zone in Zone::ALL {
        let parsed: Zone = zone.as_str().parse().expect("zone should parse");
        assert_eq!(parsed, zone);
    }
}

#[rstest]
fn encode_decode_round_trips() {
    for zone in Zone::ALL {
        let id = encode(zone, &uuid_a());
        let (scope, uuid) = decode(&id).expect("identifier should decode");
        assert_eq!(scope, Locality::Zone(zone));
        assert_eq!(uuid, uuid_a());
    }
    for region in Region::ALL {
        let id = encode(region, &uuid_a());
        let (scope, uuid) = decode(&id).expect("identifier should decode");
        assert_eq!(scope, Locality::Region(region));
        assert_eq!(uuid, uuid_a());
    }
}

#[rstest]
#[case("user_data/cloud-init")]
#[case("plain-key")]
fn nested_encode_decode_preserves_child_slashes(#[case] child: &str) {
    let id = encode_nested(Zone::FrPar1, &uuid_a(), child);
    let (scope, parent, key) = decode_nested(&id).expect("nested identifier should decode");
    assert_eq!(scope, Locality::Zone(Zone::FrPar1));
    assert_eq!(parent, uuid_a());
    assert_eq!(key, child);
}

#[rstest]
#[case("not-an-id")]
#[case("fr-par-1/not-a-uuid")]
#[case("fr-par-1")]
fn decode_rejects_malformed_identifiers(#[case] input: &str) {
    assert!(matches!(
        decode(input),
        Err(LocalityError::MalformedId { .. })
    ));
}

#[rstest]
fn decode_rejects_unknown_scope() {
    let id = format!("xx-yyy-1/{UUID_A}");
    assert!(matches!(
        decode(&id),
        Err(LocalityError::MalformedScope { .. })
    ));
}

#[rstest]
fn expand_last_uuid_handles_every_provenance() {
    let prefixed = format!("fr-par-1/{UUID_A}");
    let nested = format!("fr-par-1/{UUID_A}/invalid");
    assert_eq!(expand_last_uuid(&prefixed), UUID_A);
    assert_eq!(expand_last_uuid(UUID_A), UUID_A);
    assert_eq!(expand_last_uuid(&nested), UUID_A);
    assert_eq!(expand_last_uuid("invalid"), "invalid");
}

#[rstest]
fn equality_ignores_scope_prefix() {
    let prefixed = format!("fr-par-1/{UUID_A}");
    assert!(equal_ignoring_scope(&prefixed, UUID_A));
    assert!(equal_ignoring_scope(UUID_A, &prefixed));
    assert!(!equal_ignoring_scope(
        UUID_A,
        "22222222-2222-4222-8222-222222222222"
    ));
}
