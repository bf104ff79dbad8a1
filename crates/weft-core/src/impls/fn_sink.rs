use async_trait::async_trait;

use crate::domain::WorkflowEvent;
use crate::ports::{EventSink, EventSinkError};

/// Calls a closure for every event.
pub struct FnEventSink<F> {
    f: F,
}

impl<F> FnEventSink<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EventSink for FnEventSink<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync + 'static,
{
    async fn emit(&self, event: &WorkflowEvent) -> Result<(), EventSinkError> {
        (self.f)(event);
        Ok(())
    }
}
