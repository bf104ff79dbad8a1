//! weft-core
//!
//! A dependency-driven task execution engine.
//!
//! A [`Workflow`] owns a directed acyclic graph of [`Task`]s. A task becomes
//! ready once all of its prerequisites have finished; once the workflow is
//! started, ready tasks run on the Tokio runtime. A failed or cancelled task
//! cancels its transitive dependents, and the workflow reports completion once
//! every task has reached a terminal state.
//!
//! # Modules
//! - **domain**: ids, task states, execution errors, events
//! - **task**: task definitions, the [`TaskWork`] contract, run context
//! - **workflow**: the workflow handle and its state machine
//! - **ports** / **impls**: event sinks
//! - **app**: workflow builder and event publisher
//! - **config**: workflow configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod task;
pub mod workflow;

pub use app::WorkflowBuilder;
pub use config::{CancellationPolicy, WorkflowConfig};
pub use domain::{
    Completion, TaskError, TaskErrorKind, TaskId, TaskState, WorkflowEvent, WorkflowId,
};
pub use error::WorkflowError;
pub use observability::TaskCounts;
pub use ports::{EventSink, EventSinkError};
pub use task::{
    FnWork, PrerequisiteResults, Prerequisites, SubworkflowWork, Task, TaskContext, TaskKind,
    TaskSnapshot, TaskWork,
};
pub use workflow::Workflow;
