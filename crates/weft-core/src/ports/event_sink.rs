//! EventSink port: where workflow events go.
//!
//! Sinks are driven by the workflow's publisher loop, one event at a time and
//! in transition order. They never run under the workflow lock, so a sink may
//! call back into the workflow.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::WorkflowEvent;

#[derive(Debug, Error)]
pub enum EventSinkError {
    /// The receiving side is gone. The sink is dropped from the workflow.
    #[error("event sink closed")]
    Closed,

    #[error("event sink failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn emit(&self, event: &WorkflowEvent) -> Result<(), EventSinkError>;
}
