//! Unit tests for the session and its credential chain.

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;

fn full_config() -> ProviderConfig {
    ProviderConfig {
        access_key: Some(String::from("SCWXXXXXXXXXXXXXXXXX")),
        secret_key: Some(String::from("config-secret")),
        default_project_id: Some(String::from("11111111-1111-4111-8111-111111111111")),
        default_organization_id: None,
        default_zone: Some(String::from("nl-ams-2")),
        default_region: None,
    }
}

fn full_profile() -> Profile {
    Profile {
        access_key: Some(String::from("SCWYYYYYYYYYYYYYYYYY")),
        secret_key: Some(String::from("profile-secret")),
        default_project_id: Some(String::from("22222222-2222-4222-8222-222222222222")),
        default_organization_id: Some(String::from("33333333-3333-4333-8333-333333333333")),
        default_zone: Some(String::from("pl-waw-1")),
        default_region: Some(String::from("pl-waw")),
    }
}

#[rstest]
fn config_values_win_over_the_profile() {
    let session =
        Session::connect(&full_config(), Some(&full_profile())).expect("session should connect");
    assert_eq!(
        session.default_project(),
        "11111111-1111-4111-8111-111111111111"
    );
    assert_eq!(session.zone_or_default(None), Zone::NlAms2);
    // Each default resolves through the chain on its own: the config sets
    // no region, so the profile's explicit region wins over the fallback
    // derived from the config's zone.
    assert_eq!(session.region_or_default(None), Region::PlWaw);
}

#[rstest]
fn profile_fills_the_gaps_the_config_leaves() {
    let config = ProviderConfig::default();
    let session =
        Session::connect(&config, Some(&full_profile())).expect("session should connect");
    assert_eq!(
        session.default_project(),
        "22222222-2222-4222-8222-222222222222"
    );
    assert_eq!(session.zone_or_default(None), Zone::PlWaw1);
    assert_eq!(session.region_or_default(None), Region::PlWaw);
}

#[rstest]
fn missing_secret_key_is_rejected() {
    let mut config = full_config();
    config.secret_key = None;
    let result = Session::connect(&config, None);
    assert!(matches!(
        result,
        Err(SessionError::MissingCredential {
            field: "secret_key",
            ..
        })
    ));
}

#[rstest]
fn missing_project_is_rejected() {
    let mut config = full_config();
    config.default_project_id = None;
    let result = Session::connect(&config, None);
    assert!(matches!(
        result,
        Err(SessionError::MissingCredential {
            field: "default_project_id",
            ..
        })
    ));
}

#[rstest]
fn region_defaults_to_the_zone_region() {
    let mut config = full_config();
    config.default_zone = Some(String::from("pl-waw-2"));
    let session = Session::connect(&config, None).expect("session should connect");
    assert_eq!(session.region_or_default(None), Region::PlWaw);
}

#[rstest]
fn unknown_zone_is_rejected() {
    let mut config = full_config();
    config.default_zone = Some(String::from("mars-central-1"));
    let result = Session::connect(&config, None);
    assert!(matches!(result, Err(SessionError::Locality(_))));
}

#[rstest]
fn per_resource_scopes_override_the_defaults() {
    let session = Session::connect(&full_config(), None).expect("session should connect");
    assert_eq!(session.zone_or_default(Some(Zone::FrPar2)), Zone::FrPar2);
    assert_eq!(
        session.region_or_default(Some(Region::PlWaw)),
        Region::PlWaw
    );
}

#[rstest]
fn scoped_clients_are_cached_per_region() {
    let session = Session::connect(&full_config(), None).expect("session should connect");
    let first = session
        .api_for_region(Region::PlWaw)
        .expect("scoped client");
    let second = session
        .api_for_region(Region::PlWaw)
        .expect("scoped client");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.base_url(), "https://api.pl-waw.scw.cloud");
}

#[rstest]
fn default_region_reuses_the_shared_client() {
    let session = Session::connect(&full_config(), None).expect("session should connect");
    let scoped = session
        .api_for_region(Region::NlAms)
        .expect("scoped client");
    assert!(Arc::ptr_eq(&scoped, &session.api()));
}

#[rstest]
fn profile_loads_from_a_yaml_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("config.yaml"))
        .expect("utf-8 temp path");
    std::fs::write(
        &path,
        "access_key: SCWZZZZZZZZZZZZZZZZZ\nsecret_key: from-disk\ndefault_zone: fr-par-2\n",
    )
    .expect("write profile");
    let profile = Profile::load(&path).expect("profile should load");
    assert_eq!(profile.secret_key.as_deref(), Some("from-disk"));
    assert_eq!(profile.default_zone.as_deref(), Some("fr-par-2"));
    assert_eq!(profile.default_region, None);
}

#[rstest]
fn unreadable_profile_reports_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("missing.yaml"))
        .expect("utf-8 temp path");
    let result = Profile::load(&path);
    assert!(matches!(
        result,
        Err(SessionError::Profile { path: reported, .. }) if reported == path
    ));
}
