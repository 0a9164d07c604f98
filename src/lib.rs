//! # allocvisor
//!
//! **Allocvisor** supervises the lifecycle of a single task inside an
//! allocation of a distributed job-execution agent.
//!
//! It sits between an opaque *driver* plugin that actually executes the
//! workload and an outer *allocation runner* that issues commands, and owns
//! the state machine governing start, restart, kill, and destroy.
//!
//! ## Features
//!
//! | Area              | Description                                                     | Key types / traits                        |
//! |-------------------|-----------------------------------------------------------------|-------------------------------------------|
//! | **Supervision**   | Run loop multiplexing starts, restarts, kills, and destroy.     | [`Supervisor`]                            |
//! | **Drivers**       | The capability surface the supervisor consumes.                 | [`Driver`], [`DriverHandle`], [`DriverFactory`] |
//! | **Restarts**      | Bounded-attempt restart budget with forced-restart bypass.      | [`RestartPolicy`], [`RestartTracker`]     |
//! | **Persistence**   | Crash-safe snapshots keyed on the task identity.                | [`StatePersistor`], [`PersistedSnapshot`] |
//! | **Stats**         | Periodic resource sampling into an injected gauge sink.         | [`ResourceUsage`], [`StatsSink`]          |
//! | **Updates**       | State transitions broadcast to the embedding runner.            | [`StateUpdater`], [`TaskState`], [`TaskEvent`] |
//! | **SQL building**  | Chunked range scans and DML replay for the MySQL driver.        | [`sql`]                                   |
//!
//! ```no_run
//! use std::sync::Arc;
//! use allocvisor::{
//!     Allocation, ClientConfig, NoopSink, StateUpdater, Supervisor, TaskDefinition,
//!     TaskEvent, TaskState,
//! };
//!
//! struct PrintUpdater;
//!
//! impl StateUpdater for PrintUpdater {
//!     fn update(&self, task: &str, state: Option<TaskState>, _event: Option<TaskEvent>) {
//!         println!("{task} -> {:?}", state);
//!     }
//! }
//!
//! # fn factory() -> Arc<dyn allocvisor::DriverFactory> { unimplemented!() }
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let supervisor = Supervisor::new(
//!         ClientConfig::default(),
//!         Arc::new(PrintUpdater),
//!         Allocation::new("alloc-1", "migrate-orders", "src"),
//!         TaskDefinition::new("extract", "mysql"),
//!         factory(),
//!         Arc::new(NoopSink),
//!     );
//!
//!     supervisor.mark_received();
//!     let done = supervisor.wait_token();
//!     tokio::spawn(supervisor.run());
//!     done.cancelled().await;
//! }
//! ```
//!
//! ---

mod alloc;
mod config;
mod driver;
mod error;
mod event;
mod metrics;
mod persist;
mod restart;
mod stats;
mod supervisor;

pub mod sql;

// ---- Public re-exports ----

pub use alloc::{Allocation, TaskDefinition};
pub use config::ClientConfig;
pub use driver::{
    Driver, DriverContext, DriverFactory, DriverHandle, DriverRef, ExecContext, HandleRef,
    WaitResult,
};
pub use error::{DriverError, PersistError, RestoreError, StatsError};
pub use event::{state_label, StateUpdater, TaskEvent, TaskEventKind, TaskState};
pub use metrics::{NoopSink, SinkHandle, StatsSink};
pub use persist::{PersistedSnapshot, StatePersistor};
pub use restart::{Jitter, RestartPolicy, RestartState, RestartTracker};
pub use stats::{DelayStats, ResourceUsage, TableStats, ThroughputStats};
pub use supervisor::Supervisor;
