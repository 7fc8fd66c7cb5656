//! The label-scan store: lifecycle, tree instantiation, rebuild orchestration,
//! and the writer/reader surface built atop [`crate::tree::BTree`].

mod batching_writer;
mod bulk_writer;
mod consistency;
mod header;
mod reader;

pub use batching_writer::BatchingWriter;
pub use bulk_writer::BulkAppendWriter;
pub use consistency::ConsistencyReport;
pub use reader::Reader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::{
    FileSystem, FullStoreChangeStream, ImmediateCleanup, RecoveryCleanupWorkCollector,
    StdFileSystem,
};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::layout::{Bitset, Key};
use crate::model::{LabelId, NodeLabelUpdate, RangeId};
use crate::monitor::StoreMonitor;
use crate::pager::store::FilePageStore;
use crate::tree::{BTree, BTreeOptions};

use header::HeaderCodec;

const DEFAULT_PAGE_SIZE: u32 = 4096;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum StoreState {
    OpenedDirty,
    Rebuilding,
    Ready,
    Forcing,
    ReadOnlyDegraded,
    Shutdown,
}

/// A one-slot exclusive guard matching the teacher's pattern for
/// exclusive-resource seats: a `parking_lot` mutex around an `owner` flag,
/// compare-and-set by hand rather than blocking.
struct WriterSeat(Mutex<bool>);

impl WriterSeat {
    fn new() -> Self {
        Self(Mutex::new(false))
    }

    fn acquire(&self) -> Result<()> {
        let mut held = self.0.lock();
        if *held {
            tracing::warn!("writer seat already held; refusing second acquisition");
            return Err(Error::WriterBusy);
        }
        *held = true;
        tracing::debug!("writer seat acquired");
        Ok(())
    }

    fn release(&self) {
        *self.0.lock() = false;
        tracing::debug!("writer seat released");
    }
}

/// The persistent, recoverable secondary index: `(tree, header, writer-seat)`.
pub struct LabelScanStore {
    path: PathBuf,
    page_store: FilePageStore,
    tree: BTree<Key, Bitset>,
    config: StoreConfig,
    monitor: Arc<dyn StoreMonitor>,
    filesystem: Arc<dyn FileSystem>,
    recovery_cleanup: Arc<dyn RecoveryCleanupWorkCollector>,
    state: Mutex<StoreState>,
    writer_seat: WriterSeat,
}

impl LabelScanStore {
    /// Opens (creating if absent) the store file at `path`, using the default
    /// `StdFileSystem`/`ImmediateCleanup` collaborators. Mirrors the `init`
    /// lifecycle step: a missing or dirty tree leaves the store in
    /// `OPENED_DIRTY` until [`start`](Self::start) rebuilds it.
    pub fn init(
        path: impl AsRef<Path>,
        config: StoreConfig,
        monitor: Arc<dyn StoreMonitor>,
    ) -> Result<Self> {
        Self::init_with_collaborators(
            path,
            config,
            monitor,
            Arc::new(StdFileSystem),
            Arc::new(ImmediateCleanup),
        )
    }

    /// As [`init`](Self::init), but with the filesystem and recovery-cleanup
    /// collaborators supplied explicitly — the seam tests use to substitute fakes.
    pub fn init_with_collaborators(
        path: impl AsRef<Path>,
        config: StoreConfig,
        monitor: Arc<dyn StoreMonitor>,
        filesystem: Arc<dyn FileSystem>,
        recovery_cleanup: Arc<dyn RecoveryCleanupWorkCollector>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = filesystem.exists(&path);
        let page_size = if config.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            config.page_size
        };
        let page_store = FilePageStore::open_or_create(&path, page_size)?;
        let tree: BTree<Key, Bitset> = BTree::new(BTreeOptions { page_size });

        let guard = page_store.begin_read()?;
        let header = HeaderCodec::decode(guard.user_header())?;
        let mut needs_rebuild = !existed || header.state == header::STATE_NEEDS_REBUILD;

        if needs_rebuild && !config.read_only {
            let mut tx = page_store.begin_write()?;
            let had_root = tx.root().is_some();
            tx.clear_root();
            let dirty_header = HeaderCodec {
                state: header::STATE_NEEDS_REBUILD,
                max_label_id: 0,
            };
            tx.set_user_header(dirty_header.encode());
            page_store.commit(tx)?;
            needs_rebuild = true;
            if had_root {
                recovery_cleanup.submit(
                    "reclaim orphaned tree pages left behind by a discarded dirty root",
                );
            }
        }

        monitor.init();
        if needs_rebuild {
            if existed {
                monitor.not_valid_index();
            } else {
                monitor.no_index();
            }
        }

        let state = if !needs_rebuild {
            StoreState::Ready
        } else if config.read_only {
            StoreState::ReadOnlyDegraded
        } else {
            StoreState::OpenedDirty
        };

        tracing::info!(path = %path.display(), ?state, "label-scan store opened");

        Ok(Self {
            path,
            page_store,
            tree,
            config,
            monitor,
            filesystem,
            recovery_cleanup,
            state: Mutex::new(state),
            writer_seat: WriterSeat::new(),
        })
    }

    fn monitor_part_name(&self) -> String {
        format!("labelscan[{}]", self.config.range_width.bits())
    }

    /// Rebuilds from `change_stream` if the store is dirty and writable,
    /// then checkpoints clean. A dirty read-only store stays in
    /// `READY_READONLY_DEGRADED`; writers there refuse with `NotWritable`.
    pub fn start(&self, change_stream: &dyn FullStoreChangeStream) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                StoreState::Ready | StoreState::ReadOnlyDegraded => return Ok(()),
                StoreState::Shutdown => return Err(Error::FileMissing),
                StoreState::Rebuilding | StoreState::Forcing => return Err(Error::WriterBusy),
                StoreState::OpenedDirty => {
                    if self.config.read_only {
                        *state = StoreState::ReadOnlyDegraded;
                        tracing::warn!(
                            path = %self.path.display(),
                            "store opened dirty and read-only; writers will refuse"
                        );
                        return Ok(());
                    }
                    *state = StoreState::Rebuilding;
                }
            }
        }

        tracing::info!(path = %self.path.display(), "rebuilding label-scan store from change stream");
        self.monitor.rebuilding(&self.monitor_part_name());
        let result = (|| -> Result<u64> {
            let mut writer = self.new_bulk_append_writer()?;
            let count = change_stream.apply_to(&mut writer)?;
            writer.close()?;
            self.force()?;
            Ok(count)
        })();

        match result {
            Ok(count) => {
                *self.state.lock() = StoreState::Ready;
                self.monitor.rebuilt(&self.monitor_part_name(), count);
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = StoreState::OpenedDirty;
                Err(e)
            }
        }
    }

    /// Checkpoints the tree and writes header `CLEAN`.
    pub fn force(&self) -> Result<()> {
        tracing::info!(path = %self.path.display(), "forcing label-scan checkpoint");
        {
            let mut state = self.state.lock();
            if *state == StoreState::Shutdown {
                return Err(Error::FileMissing);
            }
            if *state == StoreState::Ready {
                *state = StoreState::Forcing;
            }
        }
        let mut tx = self.page_store.begin_write()?;
        let mut header = HeaderCodec::decode(tx.user_header())?;
        header.state = header::STATE_CLEAN;
        tx.set_user_header(header.encode());
        self.page_store.commit(tx)?;
        {
            let mut state = self.state.lock();
            if *state == StoreState::Forcing {
                *state = StoreState::Ready;
            }
        }
        self.monitor.forced();
        Ok(())
    }

    /// Closes the tree and deletes the backing file, tolerating "file absent".
    pub fn drop_store(self) -> Result<()> {
        let path = self.path.clone();
        let filesystem = Arc::clone(&self.filesystem);
        tracing::info!(path = %path.display(), "dropping label-scan store");
        self.shutdown()?;
        filesystem.delete_or_fail(&path)
    }

    /// Closes the store. Idempotent in the sense that a consumed store
    /// cannot be shut down twice.
    pub fn shutdown(self) -> Result<()> {
        tracing::info!(path = %self.path.display(), "label-scan store shutting down");
        Ok(())
    }

    /// Opens a new read snapshot.
    pub fn new_reader(&self) -> Result<Reader<'_>> {
        Reader::new(self)
    }

    /// Opens the batching writer, refusing if the store is read-only or dirty.
    pub fn new_writer(&self) -> Result<BatchingWriter<'_>> {
        if self.config.read_only {
            return Err(Error::NotWritable);
        }
        if !matches!(*self.state.lock(), StoreState::Ready) {
            return Err(Error::StoreDirty);
        }
        self.writer_seat.acquire()?;
        Ok(BatchingWriter::new(self))
    }

    /// Opens the bulk-append writer, refusing if the store is read-only.
    /// Used internally by [`start`](Self::start); also available directly
    /// for callers driving their own rebuild.
    pub fn new_bulk_append_writer(&self) -> Result<BulkAppendWriter<'_>> {
        if self.config.read_only {
            return Err(Error::NotWritable);
        }
        self.writer_seat.acquire()?;
        Ok(BulkAppendWriter::new(self))
    }

    /// Convenience: opens a writer, drains `updates` into it, and closes.
    pub fn apply_updates(&self, updates: impl IntoIterator<Item = NodeLabelUpdate>) -> Result<()> {
        let mut writer = self.new_writer()?;
        for update in updates {
            writer.apply(&update)?;
        }
        writer.close()
    }

    /// The full content of the store, grouped by label.
    pub fn all_node_label_ranges(&self) -> Result<Vec<(LabelId, Vec<(RangeId, Bitset)>)>> {
        self.new_reader()?.all_node_label_ranges()
    }

    /// True if the store holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.new_reader()?.is_empty())
    }

    /// Runs the structural and semantic consistency check.
    pub fn consistency_check(&self) -> Result<ConsistencyReport> {
        consistency::check(self)
    }

    /// The single backing file path.
    pub fn snapshot_store_files(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    /// True while the store still needs a rebuild before it can be trusted
    /// as the sole source of truth.
    pub fn needs_rebuild(&self) -> bool {
        matches!(
            *self.state.lock(),
            StoreState::OpenedDirty | StoreState::Rebuilding | StoreState::ReadOnlyDegraded
        )
    }
}
