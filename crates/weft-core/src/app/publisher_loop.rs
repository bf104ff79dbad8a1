//! PublisherLoop: delivers the workflow outbox to event sinks.
//!
//! # Flow
//! 1. Transitions push events into the outbox while holding the workflow lock
//! 2. This loop receives them in that order
//! 3. Each event is handed to every sink, one sink after another
//! 4. Sinks reporting `Closed` are dropped
//!
//! Subscriptions travel through the same channel, so a new sink sees exactly
//! the events published after it subscribed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::WorkflowEvent;
use crate::ports::{EventSink, EventSinkError};

pub(crate) enum Outbound {
    Event(WorkflowEvent),
    Subscribe(Arc<dyn EventSink>),
}

pub(crate) struct PublisherLoop {
    outbox: mpsc::UnboundedReceiver<Outbound>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl PublisherLoop {
    pub fn new(outbox: mpsc::UnboundedReceiver<Outbound>) -> Self {
        Self {
            outbox,
            sinks: Vec::new(),
        }
    }

    /// Run on the current Tokio runtime until every sender is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while let Some(message) = self.outbox.recv().await {
            match message {
                Outbound::Subscribe(sink) => self.sinks.push(sink),
                Outbound::Event(event) => self.publish(&event).await,
            }
        }
        debug!("outbox closed; publisher stopping");
    }

    async fn publish(&mut self, event: &WorkflowEvent) {
        let mut closed = Vec::new();
        for (index, sink) in self.sinks.iter().enumerate() {
            match sink.emit(event).await {
                Ok(()) => {}
                Err(EventSinkError::Closed) => closed.push(index),
                Err(err) => warn!(error = %err, event = event.kind(), "event sink failed"),
            }
        }
        for index in closed.into_iter().rev() {
            self.sinks.remove(index);
        }
    }
}
