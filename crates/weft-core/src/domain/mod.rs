//! Domain model: identifiers, task states, execution errors and events.

pub mod errors;
pub mod events;
pub mod ids;
pub mod state;

pub use errors::{TaskError, TaskErrorKind};
pub use events::{Completion, WorkflowEvent};
pub use ids::{Id, IdMarker, TaskId, WorkflowId};
pub use state::TaskState;
