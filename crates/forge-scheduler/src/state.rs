//! Task state machine

use crate::error::SchedulerError;
use std::fmt::{self, Display, Formatter};

/// Lifecycle state of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for its resource lane
    Queued,
    /// Executing
    Running,
    /// Suspended until another resource drains
    Waiting,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
    /// Abandoned before finishing
    Cancelled,
}

impl TaskState {
    /// No further transitions possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Validate a state transition
///
/// # Errors
/// Returns [`SchedulerError::IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: TaskState, to: TaskState) -> Result<(), SchedulerError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SchedulerError::IllegalTransition { from, to })
    }
}

/// States reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: TaskState) -> &'static [TaskState] {
    use TaskState::{Cancelled, Done, Failed, Queued, Running, Waiting};
    match from {
        Queued => &[Running, Cancelled],
        Running => &[Waiting, Done, Failed, Cancelled],
        Waiting => &[Running, Cancelled],
        Done | Failed | Cancelled => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_wait() {
        use TaskState::*;
        for (from, to) in [(Queued, Running), (Running, Waiting), (Waiting, Running), (Running, Done)] {
            validate_transition(from, to).unwrap();
        }
    }

    #[test]
    fn every_live_state_can_be_cancelled() {
        for state in [TaskState::Queued, TaskState::Running, TaskState::Waiting] {
            validate_transition(state, TaskState::Cancelled).unwrap();
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for state in [TaskState::Done, TaskState::Failed, TaskState::Cancelled] {
            assert!(state.is_terminal());
            assert!(allowed_transitions(state).is_empty());
        }
        assert!(matches!(
            validate_transition(TaskState::Queued, TaskState::Done),
            Err(SchedulerError::IllegalTransition { .. })
        ));
        assert!(validate_transition(TaskState::Waiting, TaskState::Done).is_err());
    }
}
