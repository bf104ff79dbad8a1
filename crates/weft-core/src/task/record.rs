//! Task record: a task plus its runtime state inside a workflow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Prerequisites, Task, TaskKind};
use crate::domain::{TaskError, TaskId, TaskState};

/// The single source of truth for a task's state. Owned by the workflow and
/// only mutated under its lock.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    pub prerequisites: Prerequisites,
    pub state: TaskState,

    pub result: Option<Value>,
    pub error: Option<TaskError>,

    /// Set on Finished or Failed.
    pub finished_at: Option<DateTime<Utc>>,

    /// Last progress reported by the current run.
    pub progress: f64,

    /// External conditions only.
    pub fulfilled: bool,

    /// Incremented on every start. A run's result is applied only while the
    /// generation it was launched with is current.
    pub generation: u64,

    /// Token of the current run.
    pub cancel: CancellationToken,
}

impl TaskRecord {
    pub fn new(task: Task, prerequisites: Prerequisites) -> Self {
        Self {
            id: task.id,
            name: task.name,
            kind: task.kind,
            prerequisites,
            state: TaskState::Pending,
            result: None,
            error: None,
            finished_at: None,
            progress: 0.0,
            fulfilled: false,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_external_condition(&self) -> bool {
        matches!(self.kind, TaskKind::ExternalCondition)
    }

    /// Forget everything the last run or fulfillment produced.
    pub fn clear_outcome(&mut self) {
        self.result = None;
        self.error = None;
        self.finished_at = None;
        self.progress = 0.0;
        self.fulfilled = false;
    }

    /// 1.0 once finished, the reported value while executing, 0.0 otherwise.
    pub fn progress(&self) -> f64 {
        match self.state {
            TaskState::Finished => 1.0,
            TaskState::Executing => self.progress,
            _ => 0.0,
        }
    }

    pub fn snapshot(&self, prerequisites: Vec<TaskId>, dependents: Vec<TaskId>) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            is_external_condition: self.is_external_condition(),
            fulfilled: self.fulfilled,
            prerequisites,
            keyed_prerequisites: self.prerequisites.key_map().clone(),
            dependents,
            result: self.result.clone(),
            error: self.error.clone(),
            finished_at: self.finished_at,
            progress: self.progress(),
        }
    }
}

/// Point-in-time copy of a task's observable state.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub is_external_condition: bool,
    pub fulfilled: bool,
    pub prerequisites: Vec<TaskId>,
    pub keyed_prerequisites: BTreeMap<String, TaskId>,
    pub dependents: Vec<TaskId>,
    pub result: Option<Value>,
    pub error: Option<TaskError>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: f64,
}
