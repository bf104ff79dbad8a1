//! Task definitions.
//!
//! A [`Task`] is built detached from any workflow and moved into one by
//! `Workflow::add_task`. Its variant is a closed set ([`TaskKind`]): either
//! work run by the engine, or an external condition finalized by `fulfill`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{TaskError, TaskId};

mod context;
mod record;
mod subworkflow;
mod work;

pub use context::{PrerequisiteResults, TaskContext};
pub(crate) use record::TaskRecord;
pub use record::TaskSnapshot;
pub use subworkflow::SubworkflowWork;
pub use work::{FnWork, TaskWork};

/// What a task does when started.
#[derive(Clone)]
pub enum TaskKind {
    /// Work run on the Tokio runtime.
    Work(Arc<dyn TaskWork>),
    /// No work; finished or failed from outside through `fulfill`.
    ExternalCondition,
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Work(_) => f.write_str("Work"),
            TaskKind::ExternalCondition => f.write_str("ExternalCondition"),
        }
    }
}

/// A unit of work, not yet part of a workflow.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    name: String,
    kind: TaskKind,
    required_keys: BTreeSet<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, work: impl TaskWork) -> Self {
        Self::with_kind(name, TaskKind::Work(Arc::new(work)))
    }

    /// Task whose work is a closure returning a future.
    ///
    /// ```ignore
    /// let task = Task::from_fn("fetch", |ctx| async move {
    ///     Ok(serde_json::json!({ "task": ctx.name() }))
    /// });
    /// ```
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self::new(name, FnWork::new(f))
    }

    /// Task finalized by an outside actor through `Workflow::fulfill`.
    pub fn external_condition(name: impl Into<String>) -> Self {
        Self::with_kind(name, TaskKind::ExternalCondition)
    }

    pub fn with_kind(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: TaskId::generate(),
            name: name.into(),
            kind,
            required_keys: BTreeSet::new(),
        }
    }

    /// Keys that must appear among the task's keyed prerequisites when it is
    /// added to a workflow.
    pub fn with_required_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.required_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn is_external_condition(&self) -> bool {
        matches!(self.kind, TaskKind::ExternalCondition)
    }

    pub fn required_keys(&self) -> &BTreeSet<String> {
        &self.required_keys
    }

    /// Required keys not present in `prerequisites`.
    pub(crate) fn missing_keys(&self, prerequisites: &Prerequisites) -> Vec<String> {
        self.required_keys
            .iter()
            .filter(|key| !prerequisites.keyed.contains_key(key.as_str()))
            .cloned()
            .collect()
    }
}

/// The prerequisites a task is added with.
///
/// Unkeyed prerequisites are only waited for. Keyed ones are also reachable
/// by key from the task's [`TaskContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prerequisites {
    unkeyed: Vec<TaskId>,
    keyed: BTreeMap<String, TaskId>,
}

impl Prerequisites {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: TaskId) -> Self {
        if !self.unkeyed.contains(&task) {
            self.unkeyed.push(task);
        }
        self
    }

    pub fn keyed(mut self, key: impl Into<String>, task: TaskId) -> Self {
        self.keyed.insert(key.into(), task);
        self
    }

    pub fn key_map(&self) -> &BTreeMap<String, TaskId> {
        &self.keyed
    }

    /// Every distinct prerequisite: unkeyed first, then keyed by key order.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids = self.unkeyed.clone();
        for &task in self.keyed.values() {
            if !ids.contains(&task) {
                ids.push(task);
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.unkeyed.is_empty() && self.keyed.is_empty()
    }
}

impl From<Vec<TaskId>> for Prerequisites {
    fn from(tasks: Vec<TaskId>) -> Self {
        tasks.into_iter().fold(Self::none(), Self::with)
    }
}

impl From<&[TaskId]> for Prerequisites {
    fn from(tasks: &[TaskId]) -> Self {
        tasks.iter().copied().fold(Self::none(), Self::with)
    }
}

impl<const N: usize> From<[TaskId; N]> for Prerequisites {
    fn from(tasks: [TaskId; N]) -> Self {
        tasks.into_iter().fold(Self::none(), Self::with)
    }
}

impl From<TaskId> for Prerequisites {
    fn from(task: TaskId) -> Self {
        Self::none().with(task)
    }
}
