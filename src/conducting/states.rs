// src/conducting/states.rs

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::errors::FlowError;

/// Lifecycle state shared by task-flow entries and the workflow itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Entered but not yet handed to an executor.
    #[default]
    Unset,
    Requested,
    Scheduled,
    Running,
    /// Waiting on something outside the workflow (e.g. an approval).
    Pending,
    Pausing,
    Paused,
    Resuming,
    Canceling,
    Canceled,
    Succeeded,
    Failed,
    Expired,
    Abandoned,
}

impl State {
    pub const ALL: [State; 14] = [
        State::Unset,
        State::Requested,
        State::Scheduled,
        State::Running,
        State::Pending,
        State::Pausing,
        State::Paused,
        State::Resuming,
        State::Canceling,
        State::Canceled,
        State::Succeeded,
        State::Failed,
        State::Expired,
        State::Abandoned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Unset => "unset",
            State::Requested => "requested",
            State::Scheduled => "scheduled",
            State::Running => "running",
            State::Pending => "pending",
            State::Pausing => "pausing",
            State::Paused => "paused",
            State::Resuming => "resuming",
            State::Canceling => "canceling",
            State::Canceled => "canceled",
            State::Succeeded => "succeeded",
            State::Failed => "failed",
            State::Expired => "expired",
            State::Abandoned => "abandoned",
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, State::Unset)
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Succeeded | State::Failed | State::Canceled | State::Expired | State::Abandoned
        )
    }

    /// Terminal states that count as a failure of the task's action.
    pub fn is_abended(&self) -> bool {
        matches!(self, State::Failed | State::Expired | State::Abandoned)
    }

    /// Handed to an executor and not yet settled.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            State::Requested
                | State::Scheduled
                | State::Running
                | State::Pending
                | State::Pausing
                | State::Resuming
                | State::Canceling
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| FlowError::InvalidState(s.to_string()))
    }
}

/// Forward moves a task-flow entry may make. Anything else is ignored by the
/// conductor so duplicate or stale events leave the entry untouched.
pub fn task_transition_allowed(from: State, to: State) -> bool {
    use State::*;

    match from {
        Unset => matches!(to, Requested | Scheduled | Running | Failed | Canceled),
        Requested => matches!(
            to,
            Scheduled | Running | Pausing | Paused | Canceling | Canceled | Failed
        ),
        Scheduled => matches!(
            to,
            Running | Pausing | Paused | Canceling | Canceled | Failed
        ),
        Running => matches!(
            to,
            Pausing
                | Paused
                | Pending
                | Canceling
                | Canceled
                | Succeeded
                | Failed
                | Expired
                | Abandoned
        ),
        Pending => matches!(to, Running | Canceling | Canceled | Failed | Expired),
        Pausing => matches!(to, Paused | Canceling | Canceled | Succeeded | Failed),
        Paused => matches!(to, Resuming | Running | Canceling | Canceled),
        Resuming => matches!(to, Running | Canceling | Canceled | Failed | Succeeded),
        Canceling => matches!(to, Canceled | Failed),
        Canceled | Succeeded | Failed | Expired | Abandoned => false,
    }
}

/// Moves the workflow as a whole may make on request.
pub fn workflow_transition_allowed(from: State, to: State) -> bool {
    use State::*;

    match from {
        Unset => matches!(to, Requested | Scheduled | Running | Failed | Canceled),
        Requested => matches!(
            to,
            Scheduled | Running | Pausing | Paused | Canceling | Canceled | Failed
        ),
        Scheduled => matches!(
            to,
            Running | Pausing | Paused | Canceling | Canceled | Failed
        ),
        Running => matches!(
            to,
            Pausing | Paused | Canceling | Canceled | Succeeded | Failed
        ),
        Pausing => matches!(to, Paused | Canceling | Canceled | Succeeded | Failed),
        Paused => matches!(to, Resuming | Running | Canceling | Canceled),
        Resuming => matches!(
            to,
            Running | Pausing | Paused | Canceling | Canceled | Failed
        ),
        Canceling => matches!(to, Canceled | Failed),
        Pending | Canceled | Succeeded | Failed | Expired | Abandoned => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_lowercase() {
        for state in State::ALL {
            assert_eq!(state.to_string().parse::<State>().unwrap(), state);
        }
        assert_eq!(" Running ".parse::<State>().unwrap(), State::Running);
        assert!(matches!(
            "foobar".parse::<State>(),
            Err(FlowError::InvalidState(ref s)) if s == "foobar"
        ));
    }

    #[test]
    fn terminal_states_never_move() {
        for from in State::ALL.into_iter().filter(State::is_terminal) {
            for to in State::ALL {
                assert!(!task_transition_allowed(from, to), "{from} -> {to}");
                assert!(!workflow_transition_allowed(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn task_cannot_skip_running() {
        assert!(!task_transition_allowed(State::Requested, State::Succeeded));
        assert!(!task_transition_allowed(State::Unset, State::Succeeded));
        assert!(task_transition_allowed(State::Running, State::Succeeded));
        assert!(!task_transition_allowed(State::Running, State::Running));
    }

    #[test]
    fn workflow_table_rejects_pending() {
        assert!(!workflow_transition_allowed(State::Running, State::Pending));
        assert!(workflow_transition_allowed(State::Running, State::Canceling));
        assert!(workflow_transition_allowed(State::Paused, State::Resuming));
    }
}
