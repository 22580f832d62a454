//! Unit tests for controller error wrapping and gone-handling.

use rstest::rstest;

use super::*;

fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        body: String::from("{}"),
    }
}

#[rstest]
fn errors_carry_operation_kind_and_id() {
    let err = ControllerError::new(
        Operation::Delete,
        "scaleway_lb",
        "fr-par-1/11111111-1111-4111-8111-111111111111",
        status_error(500),
    );
    let rendered = err.to_string();
    assert!(rendered.contains("delete of scaleway_lb"));
    assert!(rendered.contains("fr-par-1/11111111-1111-4111-8111-111111111111"));
}

#[rstest]
fn validation_diagnostics_point_at_the_attribute() {
    let err = ControllerError::new(
        Operation::Create,
        "scaleway_instance_security_group_rules",
        "",
        OperationError::Validation {
            attribute: String::from("port_range"),
            message: String::from("address 6500000: invalid port"),
        },
    );
    let diagnostic = err.to_diagnostic();
    assert_eq!(diagnostic.attribute.as_deref(), Some("port_range"));
    assert!(diagnostic.detail.contains("invalid port"));
}

#[rstest]
fn immutable_diagnostics_point_at_the_attribute() {
    let err = ControllerError::new(
        Operation::Update,
        "scaleway_instance_server",
        "fr-par-1/11111111-1111-4111-8111-111111111111",
        OperationError::Immutable {
            attribute: String::from("image"),
        },
    );
    assert_eq!(err.to_diagnostic().attribute.as_deref(), Some("image"));
}

#[rstest]
fn transport_diagnostics_carry_no_attribute() {
    let err = ControllerError::new(Operation::Read, "scaleway_lb", "id", status_error(500));
    assert_eq!(err.to_diagnostic().attribute, None);
}

#[rstest]
#[case(404, false, true)]
#[case(403, true, true)]
#[case(403, false, false)]
fn read_outcomes_fold_gone_statuses(
    #[case] status: u16,
    #[case] forbidden_means_gone: bool,
    #[case] gone: bool,
) {
    let result = outcome_from::<()>(Err(status_error(status)), forbidden_means_gone);
    match result {
        Ok(ReadOutcome::Gone) => assert!(gone),
        Err(_) => assert!(!gone),
        Ok(ReadOutcome::Present(())) => panic!("an error can never be present"),
    }
}

#[rstest]
fn successful_reads_are_present() {
    let result = outcome_from(Ok(7), false);
    assert!(matches!(result, Ok(ReadOutcome::Present(7))));
    assert_eq!(ReadOutcome::Present(7).into_present(), Some(7));
    assert_eq!(ReadOutcome::<i32>::Gone.into_present(), None);
}

#[rstest]
fn deletes_ignore_gone_but_surface_other_failures() {
    assert!(ignore_gone(Err(status_error(404)), false).is_ok());
    assert!(ignore_gone(Err(status_error(403)), true).is_ok());
    assert!(ignore_gone(Err(status_error(500)), true).is_err());
    assert!(ignore_gone(Ok(()), false).is_ok());
}

struct CannedController {
    present: bool,
}

#[async_trait]
impl ResourceController for CannedController {
    type Config = ();
    type State = String;

    const KIND: &'static str = "scaleway_vpc_private_network";

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: Self::KIND,
            attributes: Vec::new(),
        }
    }

    async fn create(
        &self,
        _ctx: &OperationContext,
        _config: &(),
    ) -> Result<(String, String), ControllerError> {
        unreachable!("import never creates")
    }

    async fn read(
        &self,
        _ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<String>, ControllerError> {
        if self.present {
            Ok(ReadOutcome::Present(format!("state of {id}")))
        } else {
            Ok(ReadOutcome::Gone)
        }
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        _id: &str,
        _config: &(),
    ) -> Result<String, ControllerError> {
        unreachable!("import never updates")
    }

    async fn delete(&self, _ctx: &OperationContext, _id: &str) -> Result<(), ControllerError> {
        unreachable!("import never deletes")
    }
}

#[tokio::test]
async fn import_reads_the_resource_back() {
    let ctx = OperationContext::with_timeout(Duration::from_secs(1));
    let controller = CannedController { present: true };
    let id = "fr-par/11111111-1111-4111-8111-111111111111";
    let state = controller.import(&ctx, id).await.expect("import");
    assert_eq!(state, format!("state of {id}"));
}

#[tokio::test]
async fn importing_a_missing_resource_is_an_error() {
    let ctx = OperationContext::with_timeout(Duration::from_secs(1));
    let controller = CannedController { present: false };
    let err = controller
        .import(&ctx, "fr-par/11111111-1111-4111-8111-111111111111")
        .await
        .expect_err("missing resource");
    assert_eq!(err.operation, Operation::Import);
    assert!(matches!(err.source, OperationError::NotFound));
}

#[rstest]
fn module_errors_pick_up_context_through_the_extension() {
    let result: Result<(), ApiError> = Err(status_error(500));
    let wrapped = result
        .in_operation(Operation::Update, "scaleway_rdb_user", "fr-par/uuid/name")
        .expect_err("error should be wrapped");
    assert_eq!(wrapped.operation, Operation::Update);
    assert_eq!(wrapped.kind, "scaleway_rdb_user");
    assert_eq!(wrapped.id, "fr-par/uuid/name");
}
