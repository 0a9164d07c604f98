//! # Client-side runtime configuration.
//!
//! [`ClientConfig`] carries the knobs the supervisor reads: where durable
//! state lives, how often resource usage is sampled, the kill timeout
//! attached to killing events, whether allocation gauges are published,
//! and the restart policy applied to the supervised task.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use allocvisor::ClientConfig;
//!
//! let mut cfg = ClientConfig::default();
//! cfg.stats_collection_interval = Duration::from_secs(5);
//! cfg.publish_allocation_metrics = true;
//!
//! assert!(cfg.publish_allocation_metrics);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::restart::RestartPolicy;

/// Configuration for a task supervisor.
///
/// Controls durable state location, stats sampling, kill behavior, metrics
/// publication, and the restart policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Agent version recorded in persisted snapshots.
    pub version: String,
    /// Root directory for durable supervisor state.
    pub state_dir: PathBuf,
    /// Interval between resource usage samples.
    pub stats_collection_interval: Duration,
    /// Kill timeout attached to every killing event.
    pub max_kill_timeout: Duration,
    /// Whether per-allocation gauges are published to the stats sink.
    pub publish_allocation_metrics: bool,
    /// Restart policy applied when the task fails or exits.
    pub restart_policy: RestartPolicy,
}

impl Default for ClientConfig {
    /// Provides a default configuration:
    /// - `version` = crate version
    /// - `state_dir` = `"state"`
    /// - `stats_collection_interval` = 1s
    /// - `max_kill_timeout` = 5s
    /// - `publish_allocation_metrics` = false
    /// - `restart_policy` = [`RestartPolicy::default`]
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state_dir: PathBuf::from("state"),
            stats_collection_interval: Duration::from_secs(1),
            max_kill_timeout: Duration::from_secs(5),
            publish_allocation_metrics: false,
            restart_policy: RestartPolicy::default(),
        }
    }
}
