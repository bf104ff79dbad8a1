//! Application layer: workflow assembly and event delivery.

pub mod builder;
pub(crate) mod publisher_loop;

pub use builder::WorkflowBuilder;
