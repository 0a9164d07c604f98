//! # Error types used by the supervisor and its collaborators.
//!
//! This module defines the error taxonomy of the crate:
//!
//! - [`DriverError`] failures reported by (or about) a driver plugin.
//! - [`StatsError`] failures while sampling resource usage from a handle.
//! - [`PersistError`] failures of the snapshot persistor.
//! - [`RestoreError`] umbrella for state restoration, which touches both
//!   the persistor and the driver.
//!
//! [`DriverError`] carries a recoverability marker: a recoverable start
//! failure feeds the restart budget, a non-recoverable one terminates the
//! task outright.

use std::path::PathBuf;

use thiserror::Error;

/// Error produced by a driver plugin or while constructing one.
///
/// The `recoverable` flag decides whether the restart tracker may schedule
/// another attempt after a start failure.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DriverError {
    /// Human-readable failure description.
    pub message: String,
    /// Whether a retry may succeed.
    pub recoverable: bool,
}

impl DriverError {
    /// Creates a non-recoverable driver error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: false,
        }
    }

    /// Creates a recoverable driver error.
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: true,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        if self.recoverable {
            "driver_recoverable"
        } else {
            "driver_unrecoverable"
        }
    }
}

/// Errors produced while sampling resource usage from a driver handle.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StatsError {
    /// The driver does not implement stats at all. The collector exits
    /// permanently when it sees this.
    #[error("resource usage stats are not implemented by this driver")]
    NotImplemented,

    /// The driver transport was shut down under the sampler. Suppressed,
    /// since it is a benign race with collection stopping.
    #[error("driver connection is shut down")]
    TransportClosed,

    /// Any other sampling failure. Logged and retried on the next tick.
    #[error("failed to collect stats: {reason}")]
    Collection { reason: String },
}

impl StatsError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            StatsError::NotImplemented => "stats_not_implemented",
            StatsError::TransportClosed => "stats_transport_closed",
            StatsError::Collection { .. } => "stats_collection",
        }
    }
}

/// Errors produced by the snapshot persistor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PersistError {
    /// No snapshot exists at the derived path.
    #[error("no snapshot found at {}", path.display())]
    NotFound { path: PathBuf },

    /// A snapshot exists but cannot be decoded.
    #[error("snapshot at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Reading or writing the snapshot failed at the filesystem level.
    #[error("snapshot i/o failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            PersistError::NotFound { .. } => "persist_not_found",
            PersistError::Corrupt { .. } => "persist_corrupt",
            PersistError::Io { .. } => "persist_io",
        }
    }
}

/// Errors produced by [`Supervisor::restore_state`](crate::Supervisor::restore_state).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}
