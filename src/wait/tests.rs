//! Unit tests for the convergence waiter.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use super::*;

#[derive(Clone, Debug, Eq, PartialEq)]
struct Snapshot {
    state: String,
}

impl Snapshot {
    fn new(state: &str) -> Self {
        Self {
            state: state.to_owned(),
        }
    }
}

impl HasStatus for Snapshot {
    fn status(&self) -> &str {
        &self.state
    }
}

/// Replays queued observations in FIFO order; repeats the last one when the
/// queue drains.
struct ScriptedPoller {
    observations: RefCell<VecDeque<Observation<Snapshot>>>,
}

impl ScriptedPoller {
    fn new(observations: Vec<Observation<Snapshot>>) -> Self {
        Self {
            observations: RefCell::new(observations.into()),
        }
    }

    fn next(&self) -> Observation<Snapshot> {
        let mut queue = self.observations.borrow_mut();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Observation::Gone)
        } else {
            queue.front().cloned().unwrap_or(Observation::Gone)
        }
    }
}

fn quick_ctx() -> OperationContext {
    OperationContext::with_timeout(Duration::from_millis(50))
}

const TICK: Duration = Duration::from_millis(1);

#[tokio::test]
async fn wait_reaches_the_target_state() {
    let poller = ScriptedPoller::new(vec![
        Observation::Present(Snapshot::new("starting")),
        Observation::Present(Snapshot::new("starting")),
        Observation::Present(Snapshot::new("running")),
    ]);
    let result = wait_for_status(&quick_ctx(), TICK, &["running"], &["error"], || async {
        Ok(poller.next())
    })
    .await;
    assert_eq!(
        result.expect("wait should succeed"),
        Snapshot::new("running")
    );
}

#[tokio::test]
async fn wait_aborts_on_terminal_failure_state() {
    let poller = ScriptedPoller::new(vec![
        Observation::Present(Snapshot::new("starting")),
        Observation::Present(Snapshot::new("error")),
    ]);
    let result = wait_for_status(&quick_ctx(), TICK, &["running"], &["error"], || async {
        Ok(poller.next())
    })
    .await;
    assert!(matches!(
        result,
        Err(WaitError::Terminal { state }) if state == "error"
    ));
}

#[tokio::test]
async fn wait_times_out_with_the_last_observed_status() {
    let poller = ScriptedPoller::new(vec![Observation::Present(Snapshot::new("starting"))]);
    let result = wait_for_status(&quick_ctx(), TICK, &["running"], &[], || async {
        Ok(poller.next())
    })
    .await;
    assert!(matches!(
        result,
        Err(WaitError::Timeout { last }) if last == "starting"
    ));
}

#[tokio::test]
async fn wait_reports_vanished_resources() {
    let poller = ScriptedPoller::new(vec![Observation::Gone]);
    let result = wait_for_status(&quick_ctx(), TICK, &["running"], &[], || async {
        Ok(poller.next())
    })
    .await;
    assert!(matches!(result, Err(WaitError::Vanished)));
}

#[tokio::test]
async fn gone_waiter_succeeds_once_the_resource_disappears() {
    let poller = ScriptedPoller::new(vec![
        Observation::Present(Snapshot::new("deleting")),
        Observation::Gone,
    ]);
    let result =
        wait_for_gone::<Snapshot, _, _>(&quick_ctx(), TICK, || async { Ok(poller.next()) }).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn gone_waiter_times_out_on_residual_resources() {
    let poller = ScriptedPoller::new(vec![Observation::Present(Snapshot::new("deleting"))]);
    let result =
        wait_for_gone::<Snapshot, _, _>(&quick_ctx(), TICK, || async { Ok(poller.next()) }).await;
    assert!(matches!(
        result,
        Err(WaitError::Timeout { last }) if last == "deleting"
    ));
}

#[tokio::test]
async fn cancellation_interrupts_the_wait() {
    let (ctx, cancel) = OperationContext::cancellable(Duration::from_secs(60));
    cancel.send(true).ok();
    let poller = ScriptedPoller::new(vec![Observation::Present(Snapshot::new("starting"))]);
    let result = wait_for_status(&ctx, TICK, &["running"], &[], || async { Ok(poller.next()) })
        .await;
    assert!(matches!(result, Err(WaitError::Canceled)));
}
