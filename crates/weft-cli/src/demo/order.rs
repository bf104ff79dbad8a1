//! The order-product workflow: create a project, upload two photos once the
//! user provides them, then submit the order once its metadata is in.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};
use weft_core::impls::TracingEventSink;
use weft_core::{
    Prerequisites, Task, TaskError, TaskId, Workflow, WorkflowBuilder, WorkflowConfig,
    WorkflowError,
};

use super::TimeSlicedWork;

/// Knobs for one demo run.
#[derive(Debug, Clone, Copy)]
pub struct DemoSettings {
    pub time_scale: f64,
    pub failure_scale: f64,
    pub reject_photo: bool,
}

impl DemoSettings {
    fn seconds(&self, seconds: f64) -> Duration {
        Duration::from_secs_f64((seconds * self.time_scale).max(0.0))
    }

    fn work(&self, seconds: f64, failure_probability: f64) -> TimeSlicedWork {
        TimeSlicedWork::new(
            self.seconds(seconds),
            failure_probability * self.failure_scale,
        )
    }
}

pub struct OrderWorkflow {
    pub workflow: Workflow,
    pub photo_1: TaskId,
    pub photo_2: TaskId,
    pub metadata: TaskId,
    pub submit: TaskId,
}

impl OrderWorkflow {
    pub async fn build(
        config: WorkflowConfig,
        settings: DemoSettings,
    ) -> Result<Self, WorkflowError> {
        let create_project = Task::new("Create Project", settings.work(2.0, 0.1));
        let photo_1 = Task::external_condition("Photo 1 Available");
        let photo_2 = Task::external_condition("Photo 2 Available");
        let metadata = Task::external_condition("Metadata Available");
        let upload_1 = Task::new("Upload Photo 1", settings.work(5.0, 0.15))
            .with_required_keys(["project", "photo"]);
        let upload_2 = Task::new("Upload Photo 2", settings.work(6.0, 0.15))
            .with_required_keys(["project", "photo"]);
        let submit = Task::new("Submit Order", settings.work(2.0, 0.1))
            .with_required_keys(["metadata"]);

        let (photo_1_id, photo_2_id, metadata_id, submit_id) =
            (photo_1.id(), photo_2.id(), metadata.id(), submit.id());
        let project = create_project.id();
        let (upload_1_id, upload_2_id) = (upload_1.id(), upload_2.id());

        let workflow = WorkflowBuilder::from_config(config)
            .sink(Arc::new(TracingEventSink))
            .task(create_project, Prerequisites::none())
            .task(photo_1, Prerequisites::none())
            .task(
                upload_1,
                Prerequisites::none()
                    .keyed("project", project)
                    .keyed("photo", photo_1_id),
            )
            .task(photo_2, Prerequisites::none())
            .task(
                upload_2,
                Prerequisites::none()
                    .keyed("project", project)
                    .keyed("photo", photo_2_id),
            )
            .task(metadata, Prerequisites::none())
            .task(
                submit,
                Prerequisites::none()
                    .with(upload_1_id)
                    .with(upload_2_id)
                    .keyed("metadata", metadata_id),
            )
            .build()
            .await?;

        Ok(Self {
            workflow,
            photo_1: photo_1_id,
            photo_2: photo_2_id,
            metadata: metadata_id,
            submit: submit_id,
        })
    }

    /// Stand in for the user: provide the photos and metadata after a while.
    pub fn provide_conditions(&self, settings: DemoSettings) {
        let photo_2 = if settings.reject_photo {
            Err(TaskError::new("photo 2 could not be read"))
        } else {
            Ok(json!({ "file": "photo-2.jpg" }))
        };

        let schedule = [
            (self.photo_1, settings.seconds(1.0), Ok(json!({ "file": "photo-1.jpg" }))),
            (self.photo_2, settings.seconds(3.0), photo_2),
            (
                self.metadata,
                settings.seconds(4.0),
                Ok(json!({ "title": "Holiday prints", "copies": 2 })),
            ),
        ];

        for (task, delay, outcome) in schedule {
            let workflow = self.workflow.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                match workflow.fulfill(task, outcome).await {
                    Ok(()) => info!(%task, "condition provided"),
                    Err(err) => warn!(%task, error = %err, "condition could not be provided"),
                }
            });
        }
    }
}
