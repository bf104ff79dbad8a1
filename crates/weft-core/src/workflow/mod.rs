//! Workflow: owns the tasks and their dependency graph, and drives them.
//!
//! # Concurrency
//! - One `tokio::sync::Mutex` guards the whole state; every transition,
//!   propagation included, happens under it.
//! - The lock is never held while task work or event sinks run.
//! - Events are pushed to the outbox before the lock is released, so all
//!   subscribers see one global order.
//! - Work is spawned after the lock is released, each run on its own Tokio
//!   task.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{Instrument, info_span, warn};

use crate::app::publisher_loop::{Outbound, PublisherLoop};
use crate::config::WorkflowConfig;
use crate::domain::{Completion, TaskError, TaskId, TaskState, WorkflowEvent, WorkflowId};
use crate::error::WorkflowError;
use crate::impls::ChannelEventSink;
use crate::observability::TaskCounts;
use crate::ports::EventSink;
use crate::task::{Prerequisites, Task, TaskContext, TaskSnapshot};

mod state;

use state::{Effects, Launch, WorkflowState};

pub(crate) struct Shared {
    id: WorkflowId,
    name: String,
    state: Mutex<WorkflowState>,
    outbox: mpsc::UnboundedSender<Outbound>,
    finished: watch::Sender<Option<Completion>>,
}

impl Shared {
    /// Apply a transition under the lock, publish its events, then spawn the
    /// runs it launched.
    async fn transact<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&mut WorkflowState, &mut Effects) -> Result<R, WorkflowError>,
    ) -> Result<R, WorkflowError> {
        let mut fx = Effects::default();
        let result = {
            let mut state = self.state.lock().await;
            let result = f(&mut state, &mut fx);
            state.check_completion(&mut fx);
            self.publish(&mut fx);
            result
        }; // Lock released here

        for launch in fx.launches {
            self.spawn_run(launch);
        }
        result
    }

    /// Called with the lock held.
    fn publish(&self, fx: &mut Effects) {
        for event in fx.events.drain(..) {
            // Only fails once the publisher loop is gone.
            let _ = self.outbox.send(Outbound::Event(event));
        }
        if fx.rearmed {
            self.finished.send_replace(None);
        }
        if let Some(completion) = fx.finished.take() {
            self.finished.send_replace(Some(completion));
        }
    }

    async fn read<R>(&self, f: impl FnOnce(&WorkflowState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    fn spawn_run(self: &Arc<Self>, launch: Launch) {
        let span = info_span!(
            "task_run",
            workflow = %self.id,
            task = %launch.task,
            name = %launch.name,
            generation = launch.generation,
        );
        let shared = Arc::clone(self);
        tokio::spawn(shared.run(launch).instrument(span));
    }

    async fn run(self: Arc<Self>, launch: Launch) {
        let Launch {
            task,
            name,
            generation,
            work,
            cancel,
            prerequisites,
        } = launch;
        let ctx = TaskContext::new(
            task,
            name,
            generation,
            cancel,
            prerequisites,
            Arc::downgrade(&self),
        );

        // A separate task so a panic in the work surfaces as a JoinError
        // instead of tearing down this one.
        let outcome = match tokio::spawn(async move { work.run(ctx).await }).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                warn!(panic = %message, "task work panicked");
                Err(TaskError::panicked(format!("task panicked: {message}")))
            }
            Err(err) => Err(TaskError::new(format!("task run aborted: {err}"))),
        };

        let _ = self
            .transact(|state, fx| {
                state.complete(task, generation, outcome, fx);
                Ok(())
            })
            .await;
    }

    pub(crate) async fn record_progress(
        self: &Arc<Self>,
        task: TaskId,
        generation: u64,
        progress: f64,
    ) {
        let _ = self
            .transact(|state, fx| {
                state.record_progress(task, generation, progress, fx);
                Ok(())
            })
            .await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a workflow. Cheap to clone; clones share the same workflow.
#[derive(Clone)]
pub struct Workflow {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// # Panics
    /// Outside a Tokio runtime (see [`Workflow::with_config`]).
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(WorkflowConfig::named(name))
    }

    /// Create an empty workflow.
    ///
    /// # Panics
    /// Outside a Tokio runtime: the workflow's publisher loop is spawned here.
    pub fn with_config(config: WorkflowConfig) -> Self {
        let id = WorkflowId::generate();
        let name = config.name.unwrap_or_else(|| format!("Workflow {id}"));
        let (outbox, rx) = mpsc::unbounded_channel();
        PublisherLoop::new(rx).spawn();

        let state = WorkflowState::new(id, name.clone(), config.cancellation_policy);
        Self {
            shared: Arc::new(Shared {
                id,
                name,
                state: Mutex::new(state),
                outbox,
                finished: watch::Sender::new(None),
            }),
        }
    }

    pub fn id(&self) -> WorkflowId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WorkflowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(Arc::new(ChannelEventSink::new(tx)));
        rx
    }

    /// Deliver every event published from now on to `sink`.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        let _ = self.shared.outbox.send(Outbound::Subscribe(sink));
    }

    /// Wait for the current run to finish.
    ///
    /// Resolves immediately if it already has. A run reopened by retry or
    /// reset is waited for again.
    pub async fn wait_until_finished(&self) -> Completion {
        let mut rx = self.shared.finished.subscribe();
        loop {
            if let Some(completion) = rx.borrow_and_update().clone() {
                return completion;
            }
            // The sender lives in `self.shared`, so the channel stays open.
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Building
    // ---------------------------------------------------------------------

    /// Add a task. Its prerequisites must already be in the workflow.
    pub async fn add_task(
        &self,
        task: Task,
        prerequisites: impl Into<Prerequisites>,
    ) -> Result<TaskId, WorkflowError> {
        let prerequisites = prerequisites.into();
        self.shared
            .transact(|state, fx| state.add_task(task, prerequisites, fx))
            .await
    }

    /// Add several tasks at once. A task may name tasks placed earlier in the
    /// same batch as prerequisites. Either every task is added or none is.
    pub async fn add_tasks(
        &self,
        batch: Vec<(Task, Prerequisites)>,
    ) -> Result<Vec<TaskId>, WorkflowError> {
        self.shared
            .transact(|state, fx| state.add_tasks(batch, fx))
            .await
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Freeze the task set and start every ready task. From then on each task
    /// that becomes ready is started automatically. Idempotent.
    pub async fn start(&self) {
        let _ = self
            .shared
            .transact(|state, fx| {
                state.start(fx);
                Ok(())
            })
            .await;
    }

    /// Start one ready task, whether or not the workflow has started.
    pub async fn start_task(&self, task: TaskId) -> Result<(), WorkflowError> {
        self.shared
            .transact(|state, fx| state.start_task(task, fx))
            .await
    }

    /// Cancel a task and every live transitive dependent.
    pub async fn cancel(&self, task: TaskId) -> Result<(), WorkflowError> {
        self.shared
            .transact(|state, fx| state.cancel(task, fx))
            .await
    }

    /// Re-run a failed or cancelled task once its prerequisites allow it.
    /// Its dependents keep their state.
    pub async fn retry(&self, task: TaskId) -> Result<(), WorkflowError> {
        self.shared
            .transact(|state, fx| state.retry(task, fx))
            .await
    }

    /// Return a task and all its transitive dependents to Pending.
    pub async fn reset(&self, task: TaskId) -> Result<(), WorkflowError> {
        self.shared
            .transact(|state, fx| state.reset(task, fx))
            .await
    }

    /// Finalize a ready external condition: `Ok` finishes it with the value,
    /// `Err` fails it.
    pub async fn fulfill(
        &self,
        task: TaskId,
        outcome: Result<Value, TaskError>,
    ) -> Result<(), WorkflowError> {
        self.shared
            .transact(|state, fx| state.fulfill(task, outcome, fx))
            .await
    }

    /// Cancel every task that is not terminal yet.
    pub async fn cancel_all(&self) {
        let _ = self
            .shared
            .transact(|state, fx| {
                state.cancel_all(fx);
                Ok(())
            })
            .await;
    }

    /// Retry every failed or cancelled task.
    pub async fn retry_all(&self) {
        let _ = self
            .shared
            .transact(|state, fx| {
                state.retry_all(fx);
                Ok(())
            })
            .await;
    }

    /// Reset every task.
    pub async fn reset_all(&self) {
        let _ = self
            .shared
            .transact(|state, fx| {
                state.reset_all(fx);
                Ok(())
            })
            .await;
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub async fn state(&self, task: TaskId) -> Result<TaskState, WorkflowError> {
        self.shared.read(|state| state.state(task)).await
    }

    pub async fn task_name(&self, task: TaskId) -> Result<String, WorkflowError> {
        self.shared.read(|state| state.task_name(task)).await
    }

    pub async fn prerequisites(&self, task: TaskId) -> Result<Vec<TaskId>, WorkflowError> {
        self.shared.read(|state| state.prerequisites(task)).await
    }

    /// Prerequisites added under a key, by key.
    pub async fn keyed_prerequisites(
        &self,
        task: TaskId,
    ) -> Result<BTreeMap<String, TaskId>, WorkflowError> {
        self.shared
            .read(|state| state.keyed_prerequisites(task))
            .await
    }

    pub async fn dependents(&self, task: TaskId) -> Result<Vec<TaskId>, WorkflowError> {
        self.shared.read(|state| state.dependents(task)).await
    }

    /// 1.0 once finished, the last reported value while executing, 0.0
    /// otherwise.
    pub async fn progress(&self, task: TaskId) -> Result<f64, WorkflowError> {
        self.shared.read(|state| state.progress(task)).await
    }

    pub async fn result(&self, task: TaskId) -> Result<Option<Value>, WorkflowError> {
        self.shared.read(|state| state.result(task)).await
    }

    pub async fn error(&self, task: TaskId) -> Result<Option<TaskError>, WorkflowError> {
        self.shared.read(|state| state.error(task)).await
    }

    pub async fn snapshot(&self, task: TaskId) -> Result<TaskSnapshot, WorkflowError> {
        self.shared.read(|state| state.snapshot(task)).await
    }

    /// Snapshots of every task, in insertion order.
    pub async fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.shared.read(WorkflowState::snapshots).await
    }

    /// Every task id, in insertion order.
    pub async fn tasks(&self) -> Vec<TaskId> {
        self.shared.read(|state| state.graph().nodes().to_vec()).await
    }

    /// Tasks without prerequisites.
    pub async fn root_tasks(&self) -> Vec<TaskId> {
        self.shared.read(|state| state.graph().roots()).await
    }

    /// Tasks without dependents.
    pub async fn leaf_tasks(&self) -> Vec<TaskId> {
        self.shared.read(|state| state.graph().leaves()).await
    }

    pub async fn counts_by_state(&self) -> TaskCounts {
        self.shared.read(WorkflowState::counts).await
    }

    pub async fn is_started(&self) -> bool {
        self.shared.read(WorkflowState::is_started).await
    }

    pub async fn has_unfinished_tasks(&self) -> bool {
        self.shared.read(WorkflowState::has_unfinished_tasks).await
    }

    pub async fn has_failed_tasks(&self) -> bool {
        self.shared.read(WorkflowState::has_failed_tasks).await
    }
}
