use serde::{Deserialize, Serialize};

use crate::domain::TaskState;

/// Number of tasks in each state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub ready: usize,
    pub executing: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub finished: usize,
}

impl TaskCounts {
    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Pending => self.pending += 1,
            TaskState::Ready => self.ready += 1,
            TaskState::Executing => self.executing += 1,
            TaskState::Cancelled => self.cancelled += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Finished => self.finished += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.ready + self.executing + self.cancelled + self.failed + self.finished
    }

    /// Tasks not yet in a terminal state.
    pub fn unfinished(&self) -> usize {
        self.pending + self.ready + self.executing
    }
}

impl FromIterator<TaskState> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = TaskState>>(iter: I) -> Self {
        let mut counts = Self::default();
        for state in iter {
            counts.record(state);
        }
        counts
    }
}
