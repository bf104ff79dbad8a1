use thiserror::Error;

use crate::domain::{TaskId, TaskState};

/// Structural errors: contract violations reported to the caller.
///
/// A call that returns one of these has not changed the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("task {0} does not belong to this workflow")]
    UnknownTask(TaskId),

    #[error("prerequisite {prerequisite} of task {task} has not been added to the workflow")]
    UnknownPrerequisite { task: TaskId, prerequisite: TaskId },

    #[error("task {0} cannot be its own prerequisite")]
    SelfDependency(TaskId),

    #[error("adding task {task} would create a dependency cycle: {cycle:?}")]
    CycleDetected { task: TaskId, cycle: Vec<TaskId> },

    #[error("task {0} has already been added")]
    DuplicateTask(TaskId),

    #[error("task {task} is missing required prerequisite keys: {missing:?}")]
    MissingPrerequisiteKeys { task: TaskId, missing: Vec<String> },

    #[error("workflow has started; its task set is frozen")]
    AlreadyStarted,

    #[error("task {0} is an external condition and cannot be started; fulfill it instead")]
    StartExternalCondition(TaskId),

    #[error("task {0} is not an external condition")]
    NotExternalCondition(TaskId),

    #[error("task {task} is {state}, expected ready")]
    NotReady { task: TaskId, state: TaskState },
}
