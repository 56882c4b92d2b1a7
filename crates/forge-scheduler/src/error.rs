//! Scheduler errors

use crate::state::TaskState;
use crate::TaskId;

/// Errors reported by the scheduler
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Waiting would close a cycle in the wait-for graph
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// Resources on the cycle, starting and ending at the refused waiter
        cycle: Vec<String>,
    },

    /// State machine violation
    #[error("illegal task transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: TaskState,
        /// Requested state
        to: TaskState,
    },

    /// Task is not known to the scheduler (already finished or never enqueued)
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    /// Task was cancelled before producing a result
    #[error("task cancelled")]
    Cancelled,

    /// Operation returned an error
    #[error("task failed: {0}")]
    TaskFailed(#[source] anyhow::Error),
}

impl SchedulerError {
    /// Can the caller degrade and carry on?
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DependencyCycle { .. })
    }

    /// Is this a misuse of the scheduler API?
    #[inline]
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. } | Self::UnknownTask(_))
    }
}
