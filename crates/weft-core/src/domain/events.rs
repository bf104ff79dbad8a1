//! Events published by a workflow.
//!
//! Events are pushed into the workflow's outbox while the transition that
//! caused them is being applied, so every subscriber observes them in
//! transition order.

use serde::Serialize;

use super::{TaskError, TaskId, TaskState, WorkflowId};

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Completion {
    /// Every task finished.
    Succeeded,
    /// Every task is terminal but some failed or were cancelled.
    PartiallyFailed { failed: usize, cancelled: usize },
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Succeeded)
    }
}

/// WorkflowEvent is an ephemeral notification about a workflow.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// `start()` was called.
    WorkflowStarted { workflow: WorkflowId, name: String },

    /// A task moved between states. Emitted for every transition.
    TaskStateChanged {
        workflow: WorkflowId,
        task: TaskId,
        name: String,
        old: TaskState,
        new: TaskState,
    },

    /// A task entered Failed. Follows the matching `TaskStateChanged`.
    TaskFailed {
        workflow: WorkflowId,
        task: TaskId,
        name: String,
        error: TaskError,
    },

    /// A task entered Cancelled. Follows the matching `TaskStateChanged`.
    TaskCancelled {
        workflow: WorkflowId,
        task: TaskId,
        name: String,
    },

    /// Executing work reported progress.
    TaskProgressed {
        workflow: WorkflowId,
        task: TaskId,
        progress: f64,
    },

    /// Every task reached a terminal state. Emitted once per run.
    WorkflowFinished {
        workflow: WorkflowId,
        name: String,
        completion: Completion,
    },
}

impl WorkflowEvent {
    pub fn workflow(&self) -> WorkflowId {
        match self {
            WorkflowEvent::WorkflowStarted { workflow, .. }
            | WorkflowEvent::TaskStateChanged { workflow, .. }
            | WorkflowEvent::TaskFailed { workflow, .. }
            | WorkflowEvent::TaskCancelled { workflow, .. }
            | WorkflowEvent::TaskProgressed { workflow, .. }
            | WorkflowEvent::WorkflowFinished { workflow, .. } => *workflow,
        }
    }

    /// The task this event is about, if any.
    pub fn task(&self) -> Option<TaskId> {
        match self {
            WorkflowEvent::TaskStateChanged { task, .. }
            | WorkflowEvent::TaskFailed { task, .. }
            | WorkflowEvent::TaskCancelled { task, .. }
            | WorkflowEvent::TaskProgressed { task, .. } => Some(*task),
            WorkflowEvent::WorkflowStarted { .. } | WorkflowEvent::WorkflowFinished { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
            WorkflowEvent::TaskStateChanged { .. } => "task_state_changed",
            WorkflowEvent::TaskFailed { .. } => "task_failed",
            WorkflowEvent::TaskCancelled { .. } => "task_cancelled",
            WorkflowEvent::TaskProgressed { .. } => "task_progressed",
            WorkflowEvent::WorkflowFinished { .. } => "workflow_finished",
        }
    }
}
