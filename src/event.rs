//! # Task states and lifecycle events emitted through the updater.
//!
//! The [`TaskEventKind`] enum classifies transition causes across three
//! categories:
//! - **Lifecycle events**: receipt, start, termination (received, started, terminated)
//! - **Kill events**: cooperative shutdown flow (killing, killed)
//! - **Restart events**: tracker decisions and external signals
//!   (restarting, not-restarting, restart-signal)
//!
//! The [`TaskEvent`] struct carries additional metadata such as exit
//! messages, kill errors and timeouts, restart reasons and delays, and the
//! fails-task marker.
//!
//! ## State symbols
//! [`TaskState`] is the externally visible state of the task. A transition
//! may also be event-only: the updater then receives `None` in place of a
//! state symbol, meaning "no state change, event only".
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use allocvisor::{TaskEvent, TaskEventKind};
//!
//! let ev = TaskEvent::new(TaskEventKind::Restarting)
//!     .with_restart_reason("within allowed attempts")
//!     .with_restart_delay(Duration::from_secs(15));
//!
//! assert_eq!(ev.kind, TaskEventKind::Restarting);
//! assert_eq!(ev.restart_delay, Some(Duration::from_secs(15)));
//! ```

use std::time::Duration;

/// Externally visible state of a supervised task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The task is known but not yet running.
    Pending,
    /// The task has a live driver handle.
    Running,
    /// The task will never run again under this supervisor.
    Dead,
}

impl TaskState {
    /// Returns the wire label for a state symbol. The event-only empty
    /// symbol is the `None` case of `Option<TaskState>`; see [`state_label`].
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Dead => "dead",
        }
    }
}

/// Returns the wire label for an optional state symbol (`""` for event-only).
pub fn state_label(state: Option<TaskState>) -> &'static str {
    state.map(|s| s.as_str()).unwrap_or("")
}

/// Classification of task lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventKind {
    /// The supervisor accepted the task.
    Received,
    /// The driver produced a live handle.
    Started,
    /// The task exited on its own.
    Terminated,
    /// A kill is in progress.
    Killing,
    /// The kill flow finished (successfully or not).
    Killed,
    /// `start_task` failed after the run loop was entered.
    DriverFailure,
    /// Driver construction failed before the run loop.
    SetupFailure,
    /// The tracker scheduled a restart.
    Restarting,
    /// The tracker refused to restart.
    NotRestarting,
    /// An external actor requested a graceful restart.
    RestartSignal,
}

impl TaskEventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskEventKind::Received => "task_received",
            TaskEventKind::Started => "task_started",
            TaskEventKind::Terminated => "task_terminated",
            TaskEventKind::Killing => "task_killing",
            TaskEventKind::Killed => "task_killed",
            TaskEventKind::DriverFailure => "driver_failure",
            TaskEventKind::SetupFailure => "setup_failure",
            TaskEventKind::Restarting => "task_restarting",
            TaskEventKind::NotRestarting => "task_not_restarting",
            TaskEventKind::RestartSignal => "restart_signal",
        }
    }
}

/// A transition cause with optional metadata.
///
/// Built with the `with_*` combinators; only the fields relevant to the
/// kind are populated.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    /// The kind of event.
    pub kind: TaskEventKind,
    /// Exit message from the driver handle, if the task terminated.
    pub exit_message: Option<String>,
    /// Error message from driver construction at setup.
    pub setup_error: Option<String>,
    /// Error message from a failed task start.
    pub driver_error: Option<String>,
    /// Last error of an exhausted kill flow.
    pub kill_error: Option<String>,
    /// Why the task is being killed.
    pub kill_reason: Option<String>,
    /// Kill timeout granted to the driver.
    pub kill_timeout: Option<Duration>,
    /// Why the task is (not) restarting.
    pub restart_reason: Option<String>,
    /// Delay before the next restart attempt.
    pub restart_delay: Option<Duration>,
    /// Whether this event marks the task as failed.
    pub fails_task: bool,
}

impl TaskEvent {
    /// Creates a new event of the given kind with no metadata.
    pub fn new(kind: TaskEventKind) -> Self {
        Self {
            kind,
            exit_message: None,
            setup_error: None,
            driver_error: None,
            kill_error: None,
            kill_reason: None,
            kill_timeout: None,
            restart_reason: None,
            restart_delay: None,
            fails_task: false,
        }
    }

    /// Forces the event kind, keeping all metadata.
    pub fn with_kind(mut self, kind: TaskEventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attaches the driver exit message.
    pub fn with_exit_message(mut self, msg: impl Into<String>) -> Self {
        self.exit_message = Some(msg.into());
        self
    }

    /// Attaches a setup error message.
    pub fn with_setup_error(mut self, msg: impl Into<String>) -> Self {
        self.setup_error = Some(msg.into());
        self
    }

    /// Attaches a driver start error message.
    pub fn with_driver_error(mut self, msg: impl Into<String>) -> Self {
        self.driver_error = Some(msg.into());
        self
    }

    /// Attaches the last kill error.
    pub fn with_kill_error(mut self, msg: impl Into<String>) -> Self {
        self.kill_error = Some(msg.into());
        self
    }

    /// Attaches a kill reason.
    pub fn with_kill_reason(mut self, msg: impl Into<String>) -> Self {
        self.kill_reason = Some(msg.into());
        self
    }

    /// Attaches the kill timeout.
    pub fn with_kill_timeout(mut self, d: Duration) -> Self {
        self.kill_timeout = Some(d);
        self
    }

    /// Attaches a restart reason.
    pub fn with_restart_reason(mut self, msg: impl Into<String>) -> Self {
        self.restart_reason = Some(msg.into());
        self
    }

    /// Attaches a restart delay.
    pub fn with_restart_delay(mut self, d: Duration) -> Self {
        self.restart_delay = Some(d);
        self
    }

    /// Marks the task as failed by this event.
    pub fn fails_task(mut self) -> Self {
        self.fails_task = true;
        self
    }
}

/// Sink for state transitions emitted by the supervisor.
///
/// All state-bearing calls originate from the run-loop task, so
/// implementations observe a single-writer order. The snapshot is persisted
/// before `update` is invoked.
pub trait StateUpdater: Send + Sync + 'static {
    /// Reports a transition of `task_name` to `state`, caused by `event`.
    ///
    /// `state = None` means "event only, no externally visible change".
    fn update(&self, task_name: &str, state: Option<TaskState>, event: Option<TaskEvent>);
}
