//! Workflow configuration.

use serde::{Deserialize, Serialize};

/// How failure and cancellation spread to dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Every pending, ready or executing transitive dependent is cancelled.
    #[default]
    Strict,

    /// Like `Strict`, but external conditions are left as they are. Their own
    /// dependents are still cancelled. A workflow holding a waiting
    /// external condition does not finish until it is fulfilled or cancelled.
    ExemptExternalConditions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Display name. Defaults to "Workflow <id>".
    pub name: Option<String>,

    pub cancellation_policy: CancellationPolicy,
}

impl WorkflowConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation_policy = policy;
        self
    }
}
