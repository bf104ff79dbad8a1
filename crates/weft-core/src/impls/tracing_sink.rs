use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::WorkflowEvent;
use crate::ports::{EventSink, EventSinkError};

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &WorkflowEvent) -> Result<(), EventSinkError> {
        match event {
            WorkflowEvent::WorkflowStarted { workflow, name } => {
                info!(%workflow, %name, "workflow started");
            }
            WorkflowEvent::TaskStateChanged {
                task, name, old, new, ..
            } => {
                info!(%task, %name, from = %old, to = %new, "task state changed");
            }
            WorkflowEvent::TaskFailed {
                task, name, error, ..
            } => {
                warn!(%task, %name, %error, "task failed");
            }
            WorkflowEvent::TaskCancelled { task, name, .. } => {
                info!(%task, %name, "task cancelled");
            }
            WorkflowEvent::TaskProgressed { task, progress, .. } => {
                debug!(%task, progress, "task progressed");
            }
            WorkflowEvent::WorkflowFinished {
                workflow,
                name,
                completion,
            } => {
                info!(%workflow, %name, ?completion, "workflow finished");
            }
        }
        Ok(())
    }
}
