use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::domain::TaskId;
use crate::workflow::Shared;

/// Results of a task's prerequisites, captured when the task starts.
///
/// Every prerequisite has finished by then, so each one has a result
/// (`Value::Null` when the work returned nothing meaningful).
#[derive(Debug, Clone, Default)]
pub struct PrerequisiteResults {
    results: Vec<(TaskId, Value)>,
    keys: BTreeMap<String, TaskId>,
}

impl PrerequisiteResults {
    pub(crate) fn new(results: Vec<(TaskId, Value)>, keys: BTreeMap<String, TaskId>) -> Self {
        Self { results, keys }
    }

    /// Result of the first prerequisite. Handy when there is exactly one.
    pub fn any(&self) -> Option<&Value> {
        self.results.first().map(|(_, value)| value)
    }

    /// All results, in prerequisite order.
    pub fn all(&self) -> Vec<&Value> {
        self.results.iter().map(|(_, value)| value).collect()
    }

    pub fn result_of(&self, task: TaskId) -> Option<&Value> {
        self.results
            .iter()
            .find(|(id, _)| *id == task)
            .map(|(_, value)| value)
    }

    /// Result of the prerequisite added under `key`.
    pub fn keyed(&self, key: &str) -> Option<&Value> {
        self.keys.get(key).and_then(|&task| self.result_of(task))
    }

    /// Results of every keyed prerequisite, by key.
    pub fn keyed_results(&self) -> BTreeMap<&str, &Value> {
        self.keys
            .iter()
            .filter_map(|(key, &task)| self.result_of(task).map(|value| (key.as_str(), value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Handed to [`TaskWork::run`](super::TaskWork::run) for one run of a task.
#[derive(Clone)]
pub struct TaskContext {
    task: TaskId,
    name: String,
    generation: u64,
    cancel: CancellationToken,
    prerequisites: Arc<PrerequisiteResults>,
    workflow: Weak<Shared>,
}

impl TaskContext {
    pub(crate) fn new(
        task: TaskId,
        name: String,
        generation: u64,
        cancel: CancellationToken,
        prerequisites: PrerequisiteResults,
        workflow: Weak<Shared>,
    ) -> Self {
        Self {
            task,
            name,
            generation,
            cancel,
            prerequisites: Arc::new(prerequisites),
            workflow,
        }
    }

    pub fn id(&self) -> TaskId {
        self.task
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled, either directly or because a
    /// prerequisite was reset.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn prerequisites(&self) -> &PrerequisiteResults {
        &self.prerequisites
    }

    /// Report fractional completion (clamped to `0.0..=1.0`).
    ///
    /// Advisory only. Ignored once the run has been cancelled or the
    /// workflow dropped.
    pub async fn report_progress(&self, progress: f64) {
        let Some(shared) = self.workflow.upgrade() else {
            return;
        };
        shared
            .record_progress(self.task, self.generation, progress)
            .await;
    }
}
