// src/conducting/events.rs

use std::str::FromStr;

use serde_json::Value;

use crate::conducting::states::State;
use crate::errors::FlowError;

/// A lifecycle event reported by whoever executes a task's action.
///
/// Only `Succeeded` and `Failed` carry the action's result.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Requested,
    Scheduled,
    Running,
    Pending,
    Pausing,
    Paused,
    Resuming,
    Canceling,
    Canceled,
    Succeeded { result: Option<Value> },
    Failed { result: Option<Value> },
    Expired,
    Abandoned,
}

impl TaskEvent {
    pub fn succeeded(result: Value) -> Self {
        TaskEvent::Succeeded {
            result: Some(result),
        }
    }

    pub fn failed(result: Value) -> Self {
        TaskEvent::Failed {
            result: Some(result),
        }
    }

    /// State the entry moves to when this event applies.
    pub fn state(&self) -> State {
        match self {
            TaskEvent::Requested => State::Requested,
            TaskEvent::Scheduled => State::Scheduled,
            TaskEvent::Running => State::Running,
            TaskEvent::Pending => State::Pending,
            TaskEvent::Pausing => State::Pausing,
            TaskEvent::Paused => State::Paused,
            TaskEvent::Resuming => State::Resuming,
            TaskEvent::Canceling => State::Canceling,
            TaskEvent::Canceled => State::Canceled,
            TaskEvent::Succeeded { .. } => State::Succeeded,
            TaskEvent::Failed { .. } => State::Failed,
            TaskEvent::Expired => State::Expired,
            TaskEvent::Abandoned => State::Abandoned,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            TaskEvent::Succeeded { result } | TaskEvent::Failed { result } => result.as_ref(),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<Value> {
        match self {
            TaskEvent::Succeeded { result } | TaskEvent::Failed { result } => result,
            _ => None,
        }
    }
}

impl TryFrom<State> for TaskEvent {
    type Error = FlowError;

    fn try_from(state: State) -> Result<Self, Self::Error> {
        Ok(match state {
            State::Requested => TaskEvent::Requested,
            State::Scheduled => TaskEvent::Scheduled,
            State::Running => TaskEvent::Running,
            State::Pending => TaskEvent::Pending,
            State::Pausing => TaskEvent::Pausing,
            State::Paused => TaskEvent::Paused,
            State::Resuming => TaskEvent::Resuming,
            State::Canceling => TaskEvent::Canceling,
            State::Canceled => TaskEvent::Canceled,
            State::Succeeded => TaskEvent::Succeeded { result: None },
            State::Failed => TaskEvent::Failed { result: None },
            State::Expired => TaskEvent::Expired,
            State::Abandoned => TaskEvent::Abandoned,
            State::Unset => return Err(FlowError::InvalidState(state.to_string())),
        })
    }
}

impl TryFrom<&str> for TaskEvent {
    type Error = FlowError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        TaskEvent::try_from(value.parse::<State>()?)
    }
}

impl FromStr for TaskEvent {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskEvent::try_from(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_event_names() {
        assert_eq!(TaskEvent::try_from("running").unwrap(), TaskEvent::Running);
        assert_eq!(
            "succeeded".parse::<TaskEvent>().unwrap(),
            TaskEvent::Succeeded { result: None }
        );
    }

    #[test]
    fn rejects_unknown_and_unset() {
        assert!(matches!(
            TaskEvent::try_from("foobar"),
            Err(FlowError::InvalidState(_))
        ));
        assert!(matches!(
            TaskEvent::try_from("unset"),
            Err(FlowError::InvalidState(_))
        ));
    }

    #[test]
    fn result_is_carried_by_completion_events() {
        let ev = TaskEvent::failed(json!({"stderr": "boom"}));
        assert_eq!(ev.state(), State::Failed);
        assert_eq!(ev.result(), Some(&json!({"stderr": "boom"})));
        assert_eq!(TaskEvent::Running.result(), None);
    }
}
