//! Execution errors reported by task work.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Classification of an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The work returned an error.
    Failed,
    /// The work panicked; the panic was caught by the runner.
    Panicked,
    /// The work gave up after observing cancellation.
    Cancelled,
    /// A subworkflow run by the task did not finish successfully.
    Subworkflow,
}

/// TaskError is the error a task fails with.
///
/// Cheap to clone: it is stored on the task, sent with `TaskFailed` events
/// and handed to dependents' hosts, so the optional source is shared.
#[derive(Debug, Clone)]
pub struct TaskError {
    kind: TaskErrorKind,
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(TaskErrorKind::Failed, message)
    }

    pub fn with_kind(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    pub fn from_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: TaskErrorKind::Failed,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Same error, reclassified.
    pub fn into_kind(mut self, kind: TaskErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn cancelled() -> Self {
        Self::with_kind(TaskErrorKind::Cancelled, "cancelled")
    }

    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self::with_kind(TaskErrorKind::Panicked, message)
    }

    pub fn kind(&self) -> TaskErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskErrorKind::Failed => write!(f, "{}", self.message),
            kind => write!(f, "{} ({kind:?})", self.message),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn plain_failure_displays_message_only() {
        let err = TaskError::new("upload rejected");
        assert_eq!(err.kind(), TaskErrorKind::Failed);
        assert_eq!(err.to_string(), "upload rejected");
    }

    #[test]
    fn other_kinds_are_tagged() {
        let err = TaskError::panicked("boom");
        assert_eq!(err.to_string(), "boom (Panicked)");
    }

    #[test]
    fn source_is_preserved_across_clones() {
        let io = std::io::Error::other("disk full");
        let err = TaskError::from_source("write failed", io);
        let cloned = err.clone();

        assert_eq!(err, cloned);
        let source = cloned.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }
}
