//! Compute server state machine.
//!
//! Servers settle in one of three states and move between them through
//! asynchronous actions. [`plan_transition`] emits the minimal action
//! sequence for a desired move; the controller issues each action and
//! waits for its landing state before issuing the next.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A settled compute server state. Servers default to `running` when the
/// configuration does not declare a state.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ServerState {
    /// Powered off; local storage released to the archive tier.
    Stopped,
    /// Powered on and booted.
    #[default]
    Running,
    /// Powered off in place; local storage stays provisioned.
    Standby,
}

impl ServerState {
    /// Wire status the API reports for this settled state.
    #[must_use]
    pub const fn api_status(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Standby => "stopped in place",
        }
    }

    /// Maps a wire status to a settled state, if it is one. Transient
    /// statuses (`starting`, `stopping`) map to `None`.
    #[must_use]
    pub fn from_api_status(status: &str) -> Option<Self> {
        match status {
            "stopped" => Some(Self::Stopped),
            "running" => Some(Self::Running),
            "stopped in place" => Some(Self::Standby),
            _ => None,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Standby => "standby",
        };
        f.write_str(label)
    }
}

impl FromStr for ServerState {
    type Err = StateError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "stopped" => Ok(Self::Stopped),
            "running" | "started" => Ok(Self::Running),
            "standby" => Ok(Self::Standby),
            other => Err(StateError::UnknownState {
                state: other.to_owned(),
            }),
        }
    }
}

/// One server action issued through the instance API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerAction {
    /// Boots the server.
    PowerOn,
    /// Powers the server off and archives local storage.
    PowerOff,
    /// Powers the server off leaving local storage in place.
    StopInPlace,
    /// Reboots a running server.
    Reboot,
}

impl ServerAction {
    /// Action name as sent on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::PowerOn => "poweron",
            Self::PowerOff => "poweroff",
            Self::StopInPlace => "stop_in_place",
            Self::Reboot => "reboot",
        }
    }

    /// Settled state the server lands in once the action completes.
    #[must_use]
    pub const fn landing_state(self) -> ServerState {
        match self {
            Self::PowerOn | Self::Reboot => ServerState::Running,
            Self::PowerOff => ServerState::Stopped,
            Self::StopInPlace => ServerState::Standby,
        }
    }

    /// Settled state the server must be in for the API to accept the
    /// action.
    #[must_use]
    pub const fn required_state(self) -> ServerState {
        match self {
            Self::PowerOn => ServerState::Stopped,
            Self::PowerOff | Self::StopInPlace | Self::Reboot => ServerState::Running,
        }
    }
}

impl fmt::Display for ServerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Errors from state parsing and transition simulation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StateError {
    /// Raised when a declared state name is not one of the three settled
    /// states.
    #[error("unknown server state {state:?}, expected stopped, running, or standby")]
    UnknownState {
        /// The offending name.
        state: String,
    },
    /// Raised when an action is applied to a state the API would reject
    /// it in.
    #[error("action {action} expects state {expected} but found {found}")]
    UnexpectedState {
        /// Action that was refused.
        action: ServerAction,
        /// State the action requires.
        expected: ServerState,
        /// State actually observed.
        found: ServerState,
    },
}

/// Emits the minimal action sequence moving a server from one settled
/// state to another. `force_reboot` requests a reboot when the server is
/// already running and a pending change needs one.
#[must_use]
pub fn plan_transition(
    from: ServerState,
    to: ServerState,
    force_reboot: bool,
) -> Vec<ServerAction> {
    use ServerAction::{PowerOff, PowerOn, Reboot, StopInPlace};
    use ServerState::{Running, Standby, Stopped};

    match (from, to) {
        (Running, Running) if force_reboot => vec![Reboot],
        (Stopped, Stopped) | (Running, Running) | (Standby, Standby) => Vec::new(),
        (Stopped, Running) | (Standby, Running) => vec![PowerOn],
        (Stopped, Standby) => vec![PowerOn, StopInPlace],
        (Running, Stopped) => vec![PowerOff],
        (Running, Standby) => vec![StopInPlace],
        (Standby, Stopped) => vec![PowerOff],
    }
}

/// Applies one action to a settled state, refusing actions the API would
/// refuse. Standby servers accept the power actions directly.
///
/// # Errors
///
/// Returns [`StateError::UnexpectedState`] when the action cannot be
/// issued from `state`.
pub fn apply_action(state: ServerState, action: ServerAction) -> Result<ServerState, StateError> {
    let accepted = state == action.required_state()
        || (state == ServerState::Standby
            && matches!(action, ServerAction::PowerOn | ServerAction::PowerOff));
    if accepted {
        Ok(action.landing_state())
    } else {
        Err(StateError::UnexpectedState {
            action,
            expected: action.required_state(),
            found: state,
        })
    }
}

#[cfg(test)]
mod tests;
