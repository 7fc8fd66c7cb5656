//! External collaborators: filesystem access, recovery-cleanup scheduling,
//! and the rebuild-time change source. Each trait ships a concrete, usable
//! default implementation rather than staying purely abstract.

use std::path::Path;

use crate::error::Result;
use crate::model::NodeLabelUpdate;
use crate::store::BulkAppendWriter;

/// Thin wrapper over filesystem operations the store needs, so tests can
/// substitute a fake.
pub trait FileSystem {
    /// True if `path` exists.
    fn exists(&self, path: &Path) -> bool;
    /// Deletes `path`, failing loudly unless the file is already absent.
    fn delete_or_fail(&self, path: &Path) -> Result<()>;
}

/// `std::fs`-backed default.
#[derive(Default, Debug)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn delete_or_fail(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Accepts background cleanup work handed off by the tree during recovery.
pub trait RecoveryCleanupWorkCollector {
    /// Schedules (or runs) one cleanup task, described for logging.
    fn submit(&self, description: &str);
}

/// Runs cleanup tasks inline; this crate has no background thread pool of its own.
#[derive(Default, Debug)]
pub struct ImmediateCleanup;

impl RecoveryCleanupWorkCollector for ImmediateCleanup {
    fn submit(&self, description: &str) {
        tracing::debug!(description, "running recovery cleanup inline");
    }
}

/// Produces the stream of per-node label sets used to repopulate the index
/// during rebuild.
pub trait FullStoreChangeStream {
    /// Drains this change stream into `writer`, returning the number of nodes applied.
    fn apply_to(&self, writer: &mut BulkAppendWriter<'_>) -> Result<u64>;
}

/// An in-memory change stream, useful for tests and small stores.
pub struct InMemoryChangeStream {
    updates: Vec<NodeLabelUpdate>,
}

impl InMemoryChangeStream {
    /// Builds a change stream from an update list.
    pub fn new(updates: Vec<NodeLabelUpdate>) -> Self {
        Self { updates }
    }
}

impl FullStoreChangeStream for InMemoryChangeStream {
    fn apply_to(&self, writer: &mut BulkAppendWriter<'_>) -> Result<u64> {
        for update in &self.updates {
            writer.apply(update)?;
        }
        Ok(self.updates.len() as u64)
    }
}
