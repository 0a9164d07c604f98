//! # Crash-safe snapshot persistence.
//!
//! [`StatePersistor`] owns the durable state path of one task and performs
//! atomic reads and writes of [`PersistedSnapshot`].
//!
//! The snapshot path is derived from the task identity:
//!
//! ```text
//! {state_dir}/alloc/{alloc_id}/task-{hex(md5(task_type))}/store.json
//! ```
//!
//! Hashing the task type decouples the directory name from characters that
//! are unsafe on disk. Writes go through a temp file in the same directory
//! followed by a rename, so a crash mid-write never leaves a partially
//! written readable snapshot behind.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::{alloc::TaskDefinition, error::PersistError};

/// File name of the snapshot inside the task state directory.
const SNAPSHOT_FILE: &str = "store.json";

/// Durable subset of the supervisor state.
///
/// Everything else is reconstructed after a restart: the handle is
/// re-opened from `handle_id`, and the runtime flags start over.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersistedSnapshot {
    /// Agent version that wrote the snapshot.
    pub version: String,
    /// Task definition at the time of the write.
    pub task: TaskDefinition,
    /// Identifier of the live driver handle, or empty when none.
    #[serde(default)]
    pub handle_id: String,
    /// Whether one-time payload materialization already happened.
    #[serde(default)]
    pub payload_rendered: bool,
}

/// Atomic snapshot reader/writer bound to one task's state path.
pub struct StatePersistor {
    path: PathBuf,
}

impl StatePersistor {
    /// Derives the snapshot path for a task identity under `state_dir`.
    pub fn for_task(state_dir: &Path, alloc_id: &str, task_type: &str) -> Self {
        use std::fmt::Write as _;

        let digest = Md5::digest(task_type.as_bytes());
        let mut dir_name = String::with_capacity(5 + 32);
        dir_name.push_str("task-");
        for byte in digest {
            let _ = write!(dir_name, "{byte:02x}");
        }
        let path = state_dir
            .join("alloc")
            .join(alloc_id)
            .join(dir_name)
            .join(SNAPSHOT_FILE);
        Self { path }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and decodes the snapshot.
    pub fn restore(&self) -> Result<PersistedSnapshot, PersistError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(PersistError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(err) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source: err,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|err| PersistError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    /// Writes the snapshot atomically (temp file in the same directory,
    /// then rename over the target).
    pub fn persist(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistError> {
        let io_err = |err| PersistError::Io {
            path: self.path.clone(),
            source: err,
        };

        let dir = self.path.parent().expect("snapshot path has a parent");
        fs::create_dir_all(dir).map_err(io_err)?;

        let bytes = serde_json::to_vec(snapshot).map_err(|err| PersistError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    /// Removes the snapshot file and the task directory, if now empty.
    pub fn destroy(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source: err,
                });
            }
        }

        // The task directory is owned by this task alone; the allocation
        // directory above it may be shared and is left in place.
        if let Some(dir) = self.path.parent() {
            let _ = fs::remove_dir(dir);
        }
        Ok(())
    }
}
