//! Coalesces a stream of per-node label deltas into sorted `(label, range)`
//! bitset merges, amortizing random per-node writes into sequential tree I/O.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::layout::{Bitset, Key};
use crate::model::{LabelId, NodeLabelUpdate, RangeId};

use super::header::HeaderCodec;
use super::LabelScanStore;

/// One writer's pending, not-yet-flushed `(label, range) -> (addMask, removeMask)` buffer.
pub struct BatchingWriter<'a> {
    store: &'a LabelScanStore,
    pending: HashMap<(LabelId, RangeId), (u64, u64)>,
    max_label_seen: u32,
    closed: bool,
}

impl<'a> BatchingWriter<'a> {
    pub(super) fn new(store: &'a LabelScanStore) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            max_label_seen: 0,
            closed: false,
        }
    }

    /// Folds one node's label delta into the pending buffer, auto-flushing
    /// once the configured batch size is reached.
    pub fn apply(&mut self, update: &NodeLabelUpdate) -> Result<()> {
        let width = self.store.config.range_width;
        for label in update.added() {
            let (range, offset) = width.locate(update.node_id);
            self.record(label, range, offset, true, update)?;
        }
        for label in update.removed() {
            let (range, offset) = width.locate(update.node_id);
            self.record(label, range, offset, false, update)?;
        }
        if self.pending.len() >= self.store.config.writer_batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        label: LabelId,
        range: RangeId,
        offset: u32,
        is_add: bool,
        update: &NodeLabelUpdate,
    ) -> Result<()> {
        let entry = self.pending.entry((label, range)).or_insert((0, 0));
        let bit = 1u64 << offset;
        if is_add {
            if entry.1 & bit != 0 {
                return Err(Error::InvalidUpdate {
                    node: update.node_id.0,
                    label: label.0,
                });
            }
            entry.0 |= bit;
        } else {
            if entry.0 & bit != 0 {
                return Err(Error::InvalidUpdate {
                    node: update.node_id.0,
                    label: label.0,
                });
            }
            entry.1 |= bit;
        }
        if label.0 > self.max_label_seen {
            self.max_label_seen = label.0;
        }
        Ok(())
    }

    /// Sorts the pending buffer by `(label, range)` and applies every merge
    /// to the tree in one write transaction.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let width = self.store.config.range_width;
        let mut entries: Vec<_> = self.pending.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tx = self.store.page_store.begin_write()?;
        for ((label, range), (add_raw, remove_raw)) in entries {
            let key = Key::new(label, range);
            let current = self
                .store
                .tree
                .get_with_write(&tx, &key)?
                .unwrap_or_else(|| Bitset::empty(width));
            let add = Bitset::from_raw(add_raw, width);
            let remove = Bitset::from_raw(remove_raw, width);
            let merged = current.merged(add, remove);
            if merged.is_empty() {
                self.store.tree.delete(&mut tx, &key)?;
            } else {
                self.store.tree.put(&mut tx, &key, &merged)?;
            }
            if self.store.config.write_monitor_enabled {
                self.store
                    .monitor
                    .merge_applied(label, range, add_raw, remove_raw, merged.raw());
            }
        }

        let mut header = HeaderCodec::decode(tx.user_header())?;
        if self.max_label_seen > header.max_label_id {
            header.max_label_id = self.max_label_seen;
        }
        tx.set_user_header(header.encode());
        self.store.page_store.commit(tx)?;
        Ok(())
    }

    /// Flushes any remaining pending tuples and releases the writer seat.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        self.store.writer_seat.release();
        Ok(())
    }
}

impl<'a> Drop for BatchingWriter<'a> {
    fn drop(&mut self) {
        if !self.closed {
            self.store.writer_seat.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::collaborators::InMemoryChangeStream;
    use crate::model::{NodeId, NodeLabelUpdate};
    use crate::monitor::TracingMonitor;
    use crate::{LabelId, LabelScanStore, RangeWidth, StoreConfig};

    fn w8_store(dir: &std::path::Path, name: &str) -> LabelScanStore {
        let config = StoreConfig {
            range_width: RangeWidth::W8,
            ..StoreConfig::default()
        };
        let store = LabelScanStore::init(dir.join(name), config, Arc::new(TracingMonitor)).unwrap();
        store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();
        store
    }

    #[test]
    fn coalesces_multiple_nodes_into_one_range_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = w8_store(dir.path(), "coalesce.db");

        let mut writer = store.new_writer().unwrap();
        for node in [1u64, 2, 3] {
            writer
                .apply(&NodeLabelUpdate::new(NodeId(node), [], [LabelId(1)]))
                .unwrap();
        }
        writer.close().unwrap();

        let reader = store.new_reader().unwrap();
        let ranges = reader.all_node_label_ranges().unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].1.len(), 1, "all three nodes share one W8 range");
        assert_eq!(
            ranges[0].1[0].1.set_offsets().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn conflicting_add_and_remove_of_same_bit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = w8_store(dir.path(), "conflict.db");

        let mut writer = store.new_writer().unwrap();
        writer
            .apply(&NodeLabelUpdate::new(NodeId(1), [], [LabelId(1)]))
            .unwrap();
        let err = writer
            .apply(&NodeLabelUpdate::new(NodeId(1), [LabelId(1)], []))
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidUpdate { node: 1, label: 1 }));
    }
}
