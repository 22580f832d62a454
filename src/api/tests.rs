//! Unit tests for the shared API client and error taxonomy.

use super::*;
use crate::transport::RetryPolicy;
use rstest::rstest;

fn credentials() -> Credentials {
    Credentials {
        access_key: Some(String::from("SCWXXXXXXXXXXXXXXXXX")),
        secret_key: String::from("secret"),
        default_project_id: String::from("11111111-1111-4111-8111-111111111111"),
        default_organization_id: None,
    }
}

fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        body: String::from("{}"),
    }
}

#[rstest]
fn client_builds_against_the_public_api() {
    let client = ApiClient::new(credentials(), RetryPolicy::default()).expect("client");
    assert_eq!(client.base_url(), DEFAULT_BASE_URL);
}

#[rstest]
fn rebased_client_keeps_credentials() {
    let client = ApiClient::new(credentials(), RetryPolicy::default()).expect("client");
    let scoped = client.rebased("https://api.nl-ams.example").expect("rebased");
    assert_eq!(scoped.base_url(), "https://api.nl-ams.example");
    assert_eq!(scoped.credentials(), client.credentials());
}

#[rstest]
#[case(404, true)]
#[case(403, false)]
#[case(500, false)]
fn not_found_is_only_404(#[case] status: u16, #[case] expected: bool) {
    assert_eq!(status_error(status).is_not_found(), expected);
}

#[rstest]
#[case(404, false, true)]
#[case(404, true, true)]
#[case(403, false, false)]
#[case(403, true, true)]
#[case(409, true, false)]
fn gone_includes_403_only_where_flagged(
    #[case] status: u16,
    #[case] forbidden_means_gone: bool,
    #[case] expected: bool,
) {
    assert_eq!(
        status_error(status).is_gone(forbidden_means_gone),
        expected
    );
}

#[rstest]
fn conflict_and_precondition_map_to_their_statuses() {
    assert!(status_error(409).is_conflict());
    assert!(!status_error(409).is_precondition_failed());
    assert!(status_error(412).is_precondition_failed());
}

#[rstest]
fn transport_errors_carry_no_status() {
    let err = ApiError::Decode {
        message: String::from("eof"),
    };
    assert_eq!(err.status(), None);
    assert!(!err.is_gone(true));
}
