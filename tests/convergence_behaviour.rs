//! Behaviour checks across the public surface: the compute state machine
//! converges, the reconcilers reach a fixed point, and identifiers stay
//! stable across runs.

use obriy::datasource::billing_invoices_id;
use obriy::diff::{reconcile_positional, reconcile_sets, PositionalOp};
use obriy::locality::{decode, encode, equal_ignoring_scope, Locality, Zone};
use obriy::server_state::{apply_action, plan_transition, ServerAction, ServerState};
use rstest::rstest;
use uuid::Uuid;

const STATES: [ServerState; 3] = [
    ServerState::Stopped,
    ServerState::Running,
    ServerState::Standby,
];

#[rstest]
fn every_transition_plan_reaches_its_goal() {
    for from in STATES {
        for to in STATES {
            for force_reboot in [false, true] {
                let plan = plan_transition(from, to, force_reboot);
                let mut state = from;
                for action in &plan {
                    state = apply_action(state, *action)
                        .unwrap_or_else(|err| panic!("{from} -> {to}: {err}"));
                }
                assert_eq!(state, to, "plan from {from} to {to} missed its goal");
            }
        }
    }
}

#[rstest]
fn no_plan_needs_more_than_two_actions() {
    for from in STATES {
        for to in STATES {
            assert!(plan_transition(from, to, true).len() <= 2);
        }
    }
}

#[rstest]
fn a_running_server_moves_to_standby_without_a_stop_off_cycle() {
    assert_eq!(
        plan_transition(ServerState::Running, ServerState::Standby, false),
        vec![ServerAction::StopInPlace]
    );
}

#[rstest]
fn a_forced_reboot_only_applies_when_already_running() {
    assert_eq!(
        plan_transition(ServerState::Running, ServerState::Running, true),
        vec![ServerAction::Reboot]
    );
    // Any other move already boots the server; no extra reboot.
    assert_eq!(
        plan_transition(ServerState::Stopped, ServerState::Running, true),
        vec![ServerAction::PowerOn]
    );
}

#[rstest]
fn positional_reconciliation_reaches_a_fixed_point() {
    let declared = ["a", "b", "c"];
    let remote = vec!["a", "x"];
    let ops = reconcile_positional(&declared, &remote, |d, r| d == r);
    assert_eq!(
        ops,
        vec![
            PositionalOp::Update { index: 1 },
            PositionalOp::Create { index: 2 },
        ]
    );

    // Apply the ops, then reconcile again: nothing left to do.
    let mut converged = remote;
    for op in ops {
        match op {
            PositionalOp::Update { index } => converged[index] = declared[index],
            PositionalOp::Create { index } => converged.push(declared[index]),
            PositionalOp::Delete { index } => {
                converged.remove(index);
            }
        }
    }
    assert!(reconcile_positional(&declared, &converged, |d, r| d == r).is_empty());
}

#[rstest]
fn set_reconciliation_reaches_a_fixed_point() {
    let declared = [String::from("alpha"), String::from("beta")];
    let observed = vec![String::from("beta"), String::from("gamma")];
    let key = |value: &String| value.clone();
    let delta = reconcile_sets(&declared, &observed, key, key);
    assert_eq!(delta.additions, vec![0]);
    assert_eq!(delta.removals, vec![1]);

    let mut converged: Vec<String> = observed
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !delta.removals.contains(index))
        .map(|(_, value)| value)
        .collect();
    converged.extend(delta.additions.iter().map(|&index| declared[index].clone()));
    assert!(reconcile_sets(&declared, &converged, key, key).is_settled());
}

#[rstest]
fn identifiers_round_trip_and_compare_across_scopes() {
    let uuid = Uuid::parse_str("0f1d2c3b-4a59-4687-9584-3210fedcba98").unwrap();
    let id = encode(Zone::FrPar1, &uuid);
    assert_eq!(id, "fr-par-1/0f1d2c3b-4a59-4687-9584-3210fedcba98");
    let (scope, decoded) = decode(&id).unwrap();
    assert_eq!(scope, Locality::Zone(Zone::FrPar1));
    assert_eq!(decoded, uuid);

    let other = encode(Zone::NlAms1, &uuid);
    assert!(equal_ignoring_scope(&id, &other));
    assert!(!equal_ignoring_scope(&id, "fr-par-1/11111111-1111-4111-8111-111111111111"));
}

#[rstest]
fn list_data_source_identifiers_are_stable_hashes() {
    let filter = obriy::api::billing::InvoiceFilter {
        started_after: String::from("2024-01-01"),
        started_before: String::from("2024-02-01"),
        invoice_type: String::from("periodic"),
        organization_id: String::from("ORG"),
    };
    let first = billing_invoices_id(&filter);
    assert_eq!(
        first,
        "cd0216b10490cee714cf131fbb544884eea127202ed529c958bf8f8444aea1bd"
    );
    assert_eq!(first, billing_invoices_id(&filter));
}
