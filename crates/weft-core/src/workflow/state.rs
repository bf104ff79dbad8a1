//! Workflow state and its transitions.
//!
//! Every method here runs under the workflow lock. Nothing is published or
//! spawned directly: events, runs to launch and completion signals are
//! collected in [`Effects`] and applied by the caller before the lock is
//! released (events) or right after (launches).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CancellationPolicy;
use crate::domain::{
    Completion, TaskError, TaskErrorKind, TaskId, TaskState, WorkflowEvent, WorkflowId,
};
use crate::error::WorkflowError;
use crate::graph::DependencyGraph;
use crate::observability::TaskCounts;
use crate::task::{
    PrerequisiteResults, Prerequisites, Task, TaskKind, TaskRecord, TaskSnapshot, TaskWork,
};

/// A run to spawn once the lock is released.
pub(crate) struct Launch {
    pub task: TaskId,
    pub name: String,
    pub generation: u64,
    pub work: Arc<dyn TaskWork>,
    pub cancel: CancellationToken,
    pub prerequisites: PrerequisiteResults,
}

/// Side effects of one or more transitions.
#[derive(Default)]
pub(crate) struct Effects {
    pub events: Vec<WorkflowEvent>,
    pub launches: Vec<Launch>,
    /// Set when the run just completed.
    pub finished: Option<Completion>,
    /// Set when a finished run was reopened by retry or reset.
    pub rearmed: bool,
}

pub(crate) struct WorkflowState {
    workflow: WorkflowId,
    name: String,
    policy: CancellationPolicy,
    tasks: HashMap<TaskId, TaskRecord>,
    graph: DependencyGraph,
    started: bool,
    /// A `WorkflowFinished` is owed for the current run.
    armed: bool,
}

impl WorkflowState {
    pub fn new(workflow: WorkflowId, name: String, policy: CancellationPolicy) -> Self {
        Self {
            workflow,
            name,
            policy,
            tasks: HashMap::new(),
            graph: DependencyGraph::new(),
            started: false,
            armed: false,
        }
    }

    // ---------------------------------------------------------------------
    // Building the graph
    // ---------------------------------------------------------------------

    pub fn add_task(
        &mut self,
        task: Task,
        prerequisites: Prerequisites,
        fx: &mut Effects,
    ) -> Result<TaskId, WorkflowError> {
        let id = task.id();
        self.add_tasks(vec![(task, prerequisites)], fx)?;
        Ok(id)
    }

    /// Validate the whole batch, then insert it in order.
    ///
    /// A prerequisite may be a task already in the workflow or one placed
    /// earlier in the same batch.
    pub fn add_tasks(
        &mut self,
        batch: Vec<(Task, Prerequisites)>,
        fx: &mut Effects,
    ) -> Result<Vec<TaskId>, WorkflowError> {
        if self.started {
            return Err(WorkflowError::AlreadyStarted);
        }

        let mut staged = HashSet::new();
        for (task, prerequisites) in &batch {
            if let Err(err) = self
                .graph
                .validate_node(task.id(), &prerequisites.ids(), &staged)
            {
                return Err(explain_forward_reference(err, &batch));
            }
            let missing = task.missing_keys(prerequisites);
            if !missing.is_empty() {
                return Err(WorkflowError::MissingPrerequisiteKeys {
                    task: task.id(),
                    missing,
                });
            }
            staged.insert(task.id());
        }

        let mut added = Vec::with_capacity(batch.len());
        for (task, prerequisites) in batch {
            added.push(self.insert(task, prerequisites, fx));
        }
        Ok(added)
    }

    fn insert(&mut self, task: Task, prerequisites: Prerequisites, fx: &mut Effects) -> TaskId {
        let id = task.id();
        let ids = prerequisites.ids();
        let blocked = ids
            .iter()
            .any(|&p| self.state_of(p).is_some_and(TaskState::is_unsuccessful));

        self.graph.insert(id, ids);
        let record = TaskRecord::new(task, prerequisites);
        debug!(workflow = %self.workflow, task = %id, name = %record.name, "task added");
        let exempt = self.is_exempt(&record);
        self.tasks.insert(id, record);

        if !blocked {
            self.evaluate(id, fx);
        } else if !exempt {
            self.cancel_one(id, fx);
        }
        id
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Freeze the graph and start every ready task. Idempotent.
    pub fn start(&mut self, fx: &mut Effects) {
        if self.started {
            return;
        }
        self.started = true;
        self.armed = true;

        info!(workflow = %self.workflow, name = %self.name, tasks = self.graph.len(), "workflow started");
        fx.events.push(WorkflowEvent::WorkflowStarted {
            workflow: self.workflow,
            name: self.name.clone(),
        });

        for id in self.graph.nodes().to_vec() {
            if self.state_of(id) == Some(TaskState::Ready) {
                self.launch(id, fx);
            }
        }
    }

    pub fn start_task(&mut self, id: TaskId, fx: &mut Effects) -> Result<(), WorkflowError> {
        let record = self.record(id)?;
        if record.is_external_condition() {
            return Err(WorkflowError::StartExternalCondition(id));
        }
        if record.state != TaskState::Ready {
            return Err(WorkflowError::NotReady {
                task: id,
                state: record.state,
            });
        }
        self.launch(id, fx);
        Ok(())
    }

    /// Cancel a task and its transitive dependents. No-op on terminal tasks.
    pub fn cancel(&mut self, id: TaskId, fx: &mut Effects) -> Result<(), WorkflowError> {
        if !self.record(id)?.state.is_cancellable() {
            return Ok(());
        }
        self.cancel_one(id, fx);
        self.propagate(id, fx);
        Ok(())
    }

    /// Re-enter readiness evaluation after Failed or Cancelled. Dependents are
    /// left alone. No-op in any other state.
    pub fn retry(&mut self, id: TaskId, fx: &mut Effects) -> Result<(), WorkflowError> {
        let record = self.record_mut(id)?;
        if !record.state.is_unsuccessful() {
            return Ok(());
        }
        record.clear_outcome();
        self.set_state(id, TaskState::Pending, fx);
        self.evaluate(id, fx);
        Ok(())
    }

    /// Return a task and every transitive dependent to Pending, then
    /// re-evaluate the task. An executing run is abandoned. No-op on Pending.
    pub fn reset(&mut self, id: TaskId, fx: &mut Effects) -> Result<(), WorkflowError> {
        if self.record(id)?.state == TaskState::Pending {
            return Ok(());
        }
        self.reset_one(id, fx);
        for dependent in self.graph.transitive_dependents(id) {
            self.reset_one(dependent, fx);
        }
        self.evaluate(id, fx);
        Ok(())
    }

    /// Finalize a ready external condition.
    pub fn fulfill(
        &mut self,
        id: TaskId,
        outcome: Result<Value, TaskError>,
        fx: &mut Effects,
    ) -> Result<(), WorkflowError> {
        let record = self.record_mut(id)?;
        if !record.is_external_condition() {
            return Err(WorkflowError::NotExternalCondition(id));
        }
        if record.state != TaskState::Ready {
            return Err(WorkflowError::NotReady {
                task: id,
                state: record.state,
            });
        }
        record.fulfilled = outcome.is_ok();
        match outcome {
            Ok(value) => self.finish(id, value, fx),
            Err(error) => self.fail(id, error, fx),
        }
        Ok(())
    }

    pub fn cancel_all(&mut self, fx: &mut Effects) {
        for id in self.graph.nodes().to_vec() {
            if self.state_of(id).is_some_and(TaskState::is_cancellable) {
                self.cancel_one(id, fx);
                self.propagate(id, fx);
            }
        }
    }

    /// Retry every failed or cancelled task, prerequisites before dependents.
    pub fn retry_all(&mut self, fx: &mut Effects) {
        for id in self.graph.nodes().to_vec() {
            // Ids come from the graph, so the lookup cannot fail.
            let _ = self.retry(id, fx);
        }
    }

    pub fn reset_all(&mut self, fx: &mut Effects) {
        for id in self.graph.nodes().to_vec() {
            let _ = self.reset(id, fx);
        }
    }

    // ---------------------------------------------------------------------
    // Reports from running work
    // ---------------------------------------------------------------------

    /// Apply the outcome of a run. Ignored unless the run is still current.
    pub fn complete(
        &mut self,
        id: TaskId,
        generation: u64,
        outcome: Result<Value, TaskError>,
        fx: &mut Effects,
    ) {
        let Some(record) = self.tasks.get(&id) else {
            return;
        };
        if record.state != TaskState::Executing || record.generation != generation {
            debug!(
                workflow = %self.workflow,
                task = %id,
                generation,
                current = record.generation,
                state = %record.state,
                "discarding result of abandoned run"
            );
            return;
        }

        match outcome {
            Ok(value) => self.finish(id, value, fx),
            Err(error) if error.kind() == TaskErrorKind::Cancelled => {
                self.cancel_one(id, fx);
                self.propagate(id, fx);
            }
            Err(error) => self.fail(id, error, fx),
        }
    }

    pub fn record_progress(
        &mut self,
        id: TaskId,
        generation: u64,
        progress: f64,
        fx: &mut Effects,
    ) {
        if !progress.is_finite() {
            return;
        }
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        if record.state != TaskState::Executing || record.generation != generation {
            return;
        }
        record.progress = progress.clamp(0.0, 1.0);
        fx.events.push(WorkflowEvent::TaskProgressed {
            workflow: self.workflow,
            task: id,
            progress: record.progress,
        });
    }

    /// Emit `WorkflowFinished` once every task is terminal, at most once per
    /// run.
    pub fn check_completion(&mut self, fx: &mut Effects) {
        if !self.started || !self.armed {
            return;
        }
        if !self.tasks.values().all(|r| r.state.is_terminal()) {
            return;
        }
        self.armed = false;

        let counts = self.counts();
        let completion = if counts.failed + counts.cancelled == 0 {
            Completion::Succeeded
        } else {
            Completion::PartiallyFailed {
                failed: counts.failed,
                cancelled: counts.cancelled,
            }
        };
        info!(
            workflow = %self.workflow,
            name = %self.name,
            finished = counts.finished,
            failed = counts.failed,
            cancelled = counts.cancelled,
            "workflow finished"
        );
        fx.events.push(WorkflowEvent::WorkflowFinished {
            workflow: self.workflow,
            name: self.name.clone(),
            completion: completion.clone(),
        });
        fx.finished = Some(completion);
    }

    // ---------------------------------------------------------------------
    // Transition helpers
    // ---------------------------------------------------------------------

    fn set_state(&mut self, id: TaskId, new: TaskState, fx: &mut Effects) {
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        let old = record.state;
        if old == new {
            return;
        }
        record.state = new;

        if old.is_terminal() && !new.is_terminal() && self.started && !self.armed {
            self.armed = true;
            fx.rearmed = true;
        }

        debug!(workflow = %self.workflow, task = %id, name = %record.name, from = %old, to = %new, "task state changed");
        fx.events.push(WorkflowEvent::TaskStateChanged {
            workflow: self.workflow,
            task: id,
            name: record.name.clone(),
            old,
            new,
        });
    }

    /// Pending -> Ready once every prerequisite has finished; starts the task
    /// too when the workflow is running.
    fn evaluate(&mut self, id: TaskId, fx: &mut Effects) {
        if self.state_of(id) != Some(TaskState::Pending) {
            return;
        }
        let satisfied = self
            .graph
            .prerequisites(id)
            .iter()
            .all(|&p| self.state_of(p) == Some(TaskState::Finished));
        if !satisfied {
            return;
        }
        self.set_state(id, TaskState::Ready, fx);
        if self.started {
            self.launch(id, fx);
        }
    }

    /// Ready -> Executing for work tasks. External conditions stay Ready.
    fn launch(&mut self, id: TaskId, fx: &mut Effects) {
        let prerequisites = self.prerequisite_results(id);
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        let TaskKind::Work(work) = &record.kind else {
            return;
        };
        let work = Arc::clone(work);

        record.generation += 1;
        record.cancel = CancellationToken::new();
        record.progress = 0.0;
        fx.launches.push(Launch {
            task: id,
            name: record.name.clone(),
            generation: record.generation,
            work,
            cancel: record.cancel.clone(),
            prerequisites,
        });
        self.set_state(id, TaskState::Executing, fx);
    }

    fn finish(&mut self, id: TaskId, value: Value, fx: &mut Effects) {
        if let Some(record) = self.tasks.get_mut(&id) {
            record.result = Some(value);
            record.error = None;
            record.finished_at = Some(Utc::now());
        }
        self.set_state(id, TaskState::Finished, fx);

        for dependent in self.graph.dependents(id).to_vec() {
            self.evaluate(dependent, fx);
        }
    }

    fn fail(&mut self, id: TaskId, error: TaskError, fx: &mut Effects) {
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        record.result = None;
        record.error = Some(error.clone());
        record.finished_at = Some(Utc::now());
        let name = record.name.clone();

        self.set_state(id, TaskState::Failed, fx);
        fx.events.push(WorkflowEvent::TaskFailed {
            workflow: self.workflow,
            task: id,
            name,
            error,
        });
        self.propagate(id, fx);
    }

    /// Cancel a single task without touching its dependents.
    fn cancel_one(&mut self, id: TaskId, fx: &mut Effects) {
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        if !record.state.is_cancellable() {
            return;
        }
        if record.state == TaskState::Executing {
            record.cancel.cancel();
        }
        let name = record.name.clone();

        self.set_state(id, TaskState::Cancelled, fx);
        fx.events.push(WorkflowEvent::TaskCancelled {
            workflow: self.workflow,
            task: id,
            name,
        });
    }

    /// Cancel every live transitive dependent of `origin`.
    fn propagate(&mut self, origin: TaskId, fx: &mut Effects) {
        for dependent in self.graph.transitive_dependents(origin) {
            let Some(record) = self.tasks.get(&dependent) else {
                continue;
            };
            if !record.state.is_cancellable() || self.is_exempt(record) {
                continue;
            }
            debug!(workflow = %self.workflow, task = %dependent, origin = %origin, "cancelling dependent");
            self.cancel_one(dependent, fx);
        }
    }

    fn reset_one(&mut self, id: TaskId, fx: &mut Effects) {
        let Some(record) = self.tasks.get_mut(&id) else {
            return;
        };
        if record.state == TaskState::Pending {
            return;
        }
        if record.state == TaskState::Executing {
            record.cancel.cancel();
        }
        record.clear_outcome();
        self.set_state(id, TaskState::Pending, fx);
    }

    fn is_exempt(&self, record: &TaskRecord) -> bool {
        self.policy == CancellationPolicy::ExemptExternalConditions
            && record.is_external_condition()
    }

    fn prerequisite_results(&self, id: TaskId) -> PrerequisiteResults {
        let results = self
            .graph
            .prerequisites(id)
            .iter()
            .map(|&p| {
                let value = self.tasks.get(&p).and_then(|r| r.result.clone());
                (p, value.unwrap_or(Value::Null))
            })
            .collect();
        let keys = self
            .tasks
            .get(&id)
            .map(|r| r.prerequisites.key_map().clone())
            .unwrap_or_default();
        PrerequisiteResults::new(results, keys)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn record(&self, id: TaskId) -> Result<&TaskRecord, WorkflowError> {
        self.tasks.get(&id).ok_or(WorkflowError::UnknownTask(id))
    }

    fn record_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, WorkflowError> {
        self.tasks.get_mut(&id).ok_or(WorkflowError::UnknownTask(id))
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|r| r.state)
    }

    pub fn state(&self, id: TaskId) -> Result<TaskState, WorkflowError> {
        self.record(id).map(|r| r.state)
    }

    pub fn task_name(&self, id: TaskId) -> Result<String, WorkflowError> {
        self.record(id).map(|r| r.name.clone())
    }

    pub fn result(&self, id: TaskId) -> Result<Option<Value>, WorkflowError> {
        self.record(id).map(|r| r.result.clone())
    }

    pub fn error(&self, id: TaskId) -> Result<Option<TaskError>, WorkflowError> {
        self.record(id).map(|r| r.error.clone())
    }

    pub fn progress(&self, id: TaskId) -> Result<f64, WorkflowError> {
        self.record(id).map(TaskRecord::progress)
    }

    pub fn prerequisites(&self, id: TaskId) -> Result<Vec<TaskId>, WorkflowError> {
        self.record(id)?;
        Ok(self.graph.prerequisites(id).to_vec())
    }

    pub fn keyed_prerequisites(
        &self,
        id: TaskId,
    ) -> Result<BTreeMap<String, TaskId>, WorkflowError> {
        self.record(id).map(|r| r.prerequisites.key_map().clone())
    }

    pub fn dependents(&self, id: TaskId) -> Result<Vec<TaskId>, WorkflowError> {
        self.record(id)?;
        Ok(self.graph.dependents(id).to_vec())
    }

    pub fn snapshot(&self, id: TaskId) -> Result<TaskSnapshot, WorkflowError> {
        let record = self.record(id)?;
        Ok(record.snapshot(
            self.graph.prerequisites(id).to_vec(),
            self.graph.dependents(id).to_vec(),
        ))
    }

    /// Snapshots of every task, in insertion order.
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.graph
            .nodes()
            .iter()
            .filter_map(|&id| self.snapshot(id).ok())
            .collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn counts(&self) -> TaskCounts {
        self.tasks.values().map(|r| r.state).collect()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn has_unfinished_tasks(&self) -> bool {
        self.tasks.values().any(|r| !r.state.is_terminal())
    }

    pub fn has_failed_tasks(&self) -> bool {
        self.tasks.values().any(|r| r.state == TaskState::Failed)
    }
}

/// A prerequisite placed later in the same batch is a forward reference,
/// unless following the batch's own declarations leads back to the task, in
/// which case the batch describes a cycle.
fn explain_forward_reference(
    err: WorkflowError,
    batch: &[(Task, Prerequisites)],
) -> WorkflowError {
    let WorkflowError::UnknownPrerequisite { task, prerequisite } = err else {
        return err;
    };
    if !batch.iter().any(|(t, _)| t.id() == prerequisite) {
        return err;
    }

    let mut declared = DependencyGraph::new();
    for (t, prerequisites) in batch {
        declared.insert(t.id(), prerequisites.ids());
    }
    match declared.detect_cycle() {
        Some(cycle) if cycle.contains(&task) => WorkflowError::CycleDetected { task, cycle },
        _ => err,
    }
}
