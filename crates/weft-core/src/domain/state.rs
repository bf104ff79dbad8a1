//! Task lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task state.
///
/// State transitions:
/// - Pending -> Ready (every prerequisite Finished)
/// - Ready -> Executing -> Finished | Failed
/// - Ready -> Finished | Failed (external conditions, via fulfill)
/// - Pending | Ready | Executing -> Cancelled
/// - Cancelled | Failed -> Pending | Ready (retry)
/// - any -> Pending (reset)
///
/// There is no Pending -> Executing edge: a task always passes through Ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for prerequisites to finish.
    Pending,

    /// Prerequisites finished; eligible to start.
    Ready,

    /// Work is running.
    Executing,

    /// Cancelled explicitly or because a prerequisite failed or was cancelled.
    Cancelled,

    /// Work reported an error (or panicked).
    Failed,

    /// Work finished successfully.
    Finished,
}

impl TaskState {
    /// Is this a terminal state (no transition without retry or reset)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Failed | TaskState::Finished
        )
    }

    /// Failed or Cancelled: the states that block dependents and can be retried.
    pub fn is_unsuccessful(self) -> bool {
        matches!(self, TaskState::Cancelled | TaskState::Failed)
    }

    /// Can this task still be cancelled?
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            TaskState::Pending | TaskState::Ready | TaskState::Executing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Executing => "executing",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
            TaskState::Finished => "finished",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
