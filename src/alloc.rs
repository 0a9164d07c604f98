//! # Allocation and task identity.
//!
//! [`Allocation`] is the outer unit of work this agent was assigned; the
//! supervisor only reads its identity fields. [`TaskDefinition`] describes
//! what to run: a logical type name, the driver kind, and opaque
//! driver-specific parameters. Both are plain values.

use serde::{Deserialize, Serialize};

/// Identity of the allocation a task belongs to.
///
/// Owned by the caller; the supervisor references it read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Allocation {
    /// Allocation identifier, unique across the cluster.
    pub id: String,
    /// Name of the job this allocation was created for.
    pub job_name: String,
    /// Key of the task within the job.
    pub task_key: String,
}

impl Allocation {
    pub fn new(
        id: impl Into<String>,
        job_name: impl Into<String>,
        task_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            job_name: job_name.into(),
            task_key: task_key.into(),
        }
    }
}

/// Immutable description of the workload a supervisor runs.
///
/// `task_type` doubles as the task's logical name in state updates, log
/// lines, metrics keys, and the durable state path. `params` is passed to
/// the driver untouched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    /// Type identifier, used as the task's logical name.
    pub task_type: String,
    /// Which driver executes this task (e.g. `"mysql"`).
    pub driver: String,
    /// Opaque driver-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl TaskDefinition {
    pub fn new(task_type: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            driver: driver.into(),
            params: serde_json::Value::Null,
        }
    }

    /// Attaches driver-specific parameters.
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}
