use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::WorkflowEvent;
use crate::ports::{EventSink, EventSinkError};

/// Forwards events into an unbounded channel.
///
/// Backs `Workflow::subscribe`. Dropping the receiver unsubscribes.
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &WorkflowEvent) -> Result<(), EventSinkError> {
        self.sender
            .send(event.clone())
            .map_err(|_| EventSinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkflowId;

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelEventSink::new(tx);
        let event = WorkflowEvent::WorkflowStarted {
            workflow: WorkflowId::generate(),
            name: "w".to_string(),
        };

        assert!(sink.emit(&event).await.is_ok());
        drop(rx);
        assert!(matches!(
            sink.emit(&event).await,
            Err(EventSinkError::Closed)
        ));
    }
}
