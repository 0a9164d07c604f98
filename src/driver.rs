//! # Driver capability surface consumed by the supervisor.
//!
//! Defines the narrow view the supervisor has of a driver plugin:
//!
//! - **[`Driver`]** — starts a task or re-opens a handle by id.
//! - **[`DriverHandle`]** — a live execution: wait, stats, shutdown.
//! - **[`DriverFactory`]** — builds a driver for a task's driver kind.
//!
//! Driver loading and process management live outside this crate; the
//! supervisor only talks to these traits.
//!
//! ## Wait contract
//! [`DriverHandle::wait_ch`] returns a fresh receiver per call that resolves
//! with the task's terminal [`WaitResult`]. A driver must always deliver a
//! result; a sender dropped without one is a contract violation and the
//! supervisor aborts loudly on it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{
    alloc::TaskDefinition,
    config::ClientConfig,
    error::{DriverError, StatsError},
    stats::ResourceUsage,
};

/// Shared handle to a driver object.
pub type DriverRef = Arc<dyn Driver>;

/// Shared handle to a live execution.
pub type HandleRef = Arc<dyn DriverHandle>;

/// Execution context handed to a driver on start/open.
#[derive(Clone, Debug)]
pub struct ExecContext {
    /// Name of the job the task belongs to.
    pub job_name: String,
    /// Logical task type.
    pub task_type: String,
}

impl ExecContext {
    pub fn new(job_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            task_type: task_type.into(),
        }
    }
}

/// Context available while constructing a driver.
#[derive(Clone)]
pub struct DriverContext {
    /// Driver kind to construct (e.g. `"mysql"`).
    pub driver: String,
    /// Logical task type.
    pub task_type: String,
    /// Allocation identifier.
    pub alloc_id: String,
    /// Agent configuration.
    pub config: Arc<ClientConfig>,
}

impl DriverContext {
    pub fn new(
        driver: impl Into<String>,
        task_type: impl Into<String>,
        alloc_id: impl Into<String>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            driver: driver.into(),
            task_type: task_type.into(),
            alloc_id: alloc_id.into(),
            config,
        }
    }
}

/// Terminal outcome of a task execution, delivered through the wait channel.
#[derive(Clone, Debug)]
pub struct WaitResult {
    /// Whether the task exited cleanly.
    pub successful: bool,
    /// Driver-provided exit description.
    pub message: String,
}

impl WaitResult {
    /// A clean exit with the given message.
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            successful: true,
            message: message.into(),
        }
    }

    /// A failed exit with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            successful: false,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for WaitResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.successful {
            write!(f, "exited: {}", self.message)
        } else {
            write!(f, "failed: {}", self.message)
        }
    }
}

/// A pluggable backend that executes one kind of task.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Starts the task and returns a live handle.
    async fn start(
        &self,
        ctx: &ExecContext,
        task: &TaskDefinition,
    ) -> Result<HandleRef, DriverError>;

    /// Re-opens a handle persisted by a previous process incarnation.
    async fn open(&self, ctx: &ExecContext, handle_id: &str) -> Result<HandleRef, DriverError>;
}

/// A live execution owned by a driver.
#[async_trait]
pub trait DriverHandle: Send + Sync {
    /// Stable identifier, re-openable across process restarts.
    fn id(&self) -> String;

    /// Returns a fresh receiver for the terminal result.
    ///
    /// The driver must eventually send exactly one [`WaitResult`] to every
    /// receiver it hands out. Dropping the sender without a result violates
    /// the contract.
    fn wait_ch(&self) -> oneshot::Receiver<WaitResult>;

    /// Samples current resource usage.
    ///
    /// Drivers without stats support return [`StatsError::NotImplemented`].
    async fn stats(&self) -> Result<ResourceUsage, StatsError>;

    /// Stops the execution and releases its resources.
    async fn shutdown(&self) -> Result<(), DriverError>;
}

/// Builds drivers by task driver kind.
///
/// Injected into the supervisor; the registry of available drivers is the
/// caller's concern.
pub trait DriverFactory: Send + Sync {
    /// Constructs a driver able to run `ctx`'s task.
    fn create(&self, ctx: &DriverContext) -> Result<DriverRef, DriverError>;
}
