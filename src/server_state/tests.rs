//! Unit tests for the compute state machine.

use rstest::rstest;

use super::*;

fn simulate(from: ServerState, actions: &[ServerAction]) -> ServerState {
    actions.iter().fold(from, |state, &action| {
        apply_action(state, action).expect("planned action should be accepted")
    })
}

#[rstest]
#[case(ServerState::Stopped, ServerState::Stopped, vec![])]
#[case(ServerState::Stopped, ServerState::Running, vec![ServerAction::PowerOn])]
#[case(
    ServerState::Stopped,
    ServerState::Standby,
    vec![ServerAction::PowerOn, ServerAction::StopInPlace]
)]
#[case(ServerState::Running, ServerState::Stopped, vec![ServerAction::PowerOff])]
#[case(ServerState::Running, ServerState::Running, vec![])]
#[case(ServerState::Running, ServerState::Standby, vec![ServerAction::StopInPlace])]
#[case(ServerState::Standby, ServerState::Stopped, vec![ServerAction::PowerOff])]
#[case(ServerState::Standby, ServerState::Running, vec![ServerAction::PowerOn])]
#[case(ServerState::Standby, ServerState::Standby, vec![])]
fn plans_match_the_transition_table(
    #[case] from: ServerState,
    #[case] to: ServerState,
    #[case] expected: Vec<ServerAction>,
) {
    assert_eq!(plan_transition(from, to, false), expected);
}

#[rstest]
fn force_reboot_only_changes_the_running_self_transition() {
    for from in [ServerState::Stopped, ServerState::Running, ServerState::Standby] {
        for to in [ServerState::Stopped, ServerState::Running, ServerState::Standby] {
            let plain = plan_transition(from, to, false);
            let forced = plan_transition(from, to, true);
            if from == ServerState::Running && to == ServerState::Running {
                assert_eq!(forced, vec![ServerAction::Reboot]);
            } else {
                assert_eq!(forced, plain);
            }
        }
    }
}

#[rstest]
fn every_plan_lands_exactly_on_the_target() {
    for from in [ServerState::Stopped, ServerState::Running, ServerState::Standby] {
        for to in [ServerState::Stopped, ServerState::Running, ServerState::Standby] {
            for force_reboot in [false, true] {
                let plan = plan_transition(from, to, force_reboot);
                assert_eq!(
                    simulate(from, &plan),
                    to,
                    "plan {plan:?} from {from} should end at {to}"
                );
                assert!(plan.len() <= 2, "plan {plan:?} is longer than necessary");
            }
        }
    }
}

#[rstest]
fn running_to_standby_is_a_single_stop_in_place() {
    let plan = plan_transition(ServerState::Running, ServerState::Standby, false);
    assert_eq!(plan, vec![ServerAction::StopInPlace]);
    assert_eq!(simulate(ServerState::Running, &plan), ServerState::Standby);
}

#[rstest]
#[case(ServerState::Stopped, ServerAction::StopInPlace)]
#[case(ServerState::Stopped, ServerAction::Reboot)]
#[case(ServerState::Standby, ServerAction::StopInPlace)]
fn refused_actions_report_expected_and_found(
    #[case] state: ServerState,
    #[case] action: ServerAction,
) {
    let err = apply_action(state, action).expect_err("action should be refused");
    assert_eq!(
        err,
        StateError::UnexpectedState {
            action,
            expected: action.required_state(),
            found: state,
        }
    );
    let rendered = err.to_string();
    assert!(rendered.contains("expects state"));
}

#[rstest]
#[case("stopped", Some(ServerState::Stopped))]
#[case("running", Some(ServerState::Running))]
#[case("stopped in place", Some(ServerState::Standby))]
#[case("starting", None)]
#[case("stopping", None)]
fn wire_statuses_map_to_settled_states(
    #[case] status: &str,
    #[case] expected: Option<ServerState>,
) {
    assert_eq!(ServerState::from_api_status(status), expected);
}

#[rstest]
fn declared_names_parse_with_started_alias() {
    assert_eq!("standby".parse::<ServerState>(), Ok(ServerState::Standby));
    assert_eq!("started".parse::<ServerState>(), Ok(ServerState::Running));
    assert!(matches!(
        "paused".parse::<ServerState>(),
        Err(StateError::UnknownState { state }) if state == "paused"
    ));
}
