//! WorkflowBuilder: assemble a workflow in one step.
//!
//! The whole task set is validated at `build()` (fail-fast): if any task is
//! invalid, no workflow is returned.

use std::sync::Arc;

use crate::config::{CancellationPolicy, WorkflowConfig};
use crate::error::WorkflowError;
use crate::ports::EventSink;
use crate::task::{Prerequisites, Task};
use crate::workflow::Workflow;

/// ```ignore
/// let fetch = Task::from_fn("fetch", |_| async { Ok(json!(1)) });
/// let fetch_id = fetch.id();
/// let workflow = WorkflowBuilder::new("pipeline")
///     .task(fetch, [])
///     .task(Task::external_condition("approved"), [fetch_id])
///     .sink(Arc::new(TracingEventSink))
///     .build()
///     .await?;
/// ```
pub struct WorkflowBuilder {
    config: WorkflowConfig,
    tasks: Vec<(Task, Prerequisites)>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(WorkflowConfig::named(name))
    }

    pub fn from_config(config: WorkflowConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.config.cancellation_policy = policy;
        self
    }

    pub fn task(mut self, task: Task, prerequisites: impl Into<Prerequisites>) -> Self {
        self.tasks.push((task, prerequisites.into()));
        self
    }

    /// Sinks are attached before any task is added, so they observe every
    /// event of the workflow.
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Create the workflow and add every task as one batch.
    ///
    /// # Panics
    /// Outside a Tokio runtime (see [`Workflow::with_config`]).
    pub async fn build(self) -> Result<Workflow, WorkflowError> {
        let workflow = Workflow::with_config(self.config);
        for sink in self.sinks {
            workflow.add_sink(sink);
        }
        workflow.add_tasks(self.tasks).await?;
        Ok(workflow)
    }
}
