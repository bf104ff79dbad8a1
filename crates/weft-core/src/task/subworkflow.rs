use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{TaskContext, TaskWork};
use crate::domain::{Completion, TaskError, TaskErrorKind, TaskState};
use crate::workflow::Workflow;

/// Work that runs a whole child workflow.
///
/// - Finishes with `{"workflow": <name>, "id": <id>}` once every child task
///   finishes.
/// - Fails with the error of the child task that failed first.
/// - Cancels itself when the child ends with cancellations only.
/// - Cancelling the parent task cancels every child task.
///
/// A rerun (after retry or reset of the parent task) resets the child first.
/// Runs are serialized: a rerun touches the child only once the abandoned
/// run has finished cancelling it.
pub struct SubworkflowWork {
    workflow: Workflow,
    running: Mutex<()>,
}

impl SubworkflowWork {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            running: Mutex::new(()),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    async fn first_failure(&self) -> Option<TaskError> {
        let child = self.workflow.name();
        self.workflow
            .snapshots()
            .await
            .into_iter()
            .filter(|s| s.state == TaskState::Failed)
            .min_by_key(|s| s.finished_at)
            .and_then(|s| {
                let error = s.error?;
                let message = format!("subworkflow {child}: task {} failed", s.name);
                Some(TaskError::from_source(message, error).into_kind(TaskErrorKind::Subworkflow))
            })
    }
}

#[async_trait]
impl TaskWork for SubworkflowWork {
    async fn run(&self, ctx: TaskContext) -> Result<Value, TaskError> {
        let _running = self.running.lock().await;
        // Abandoned before it got its turn.
        if ctx.is_cancelled() {
            return Err(TaskError::cancelled());
        }

        let child = &self.workflow;
        if child.is_started().await {
            child.reset_all().await;
        }
        child.start().await;

        let completion = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                child.cancel_all().await;
                return Err(TaskError::cancelled());
            }
            completion = child.wait_until_finished() => completion,
        };

        match completion {
            Completion::Succeeded => Ok(json!({
                "workflow": child.name(),
                "id": child.id().to_string(),
            })),
            Completion::PartiallyFailed { failed, .. } if failed > 0 => {
                Err(self.first_failure().await.unwrap_or_else(|| {
                    TaskError::with_kind(TaskErrorKind::Subworkflow, "subworkflow task failed")
                }))
            }
            Completion::PartiallyFailed { .. } => Err(TaskError::cancelled()),
        }
    }
}
