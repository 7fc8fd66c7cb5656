//! Append-only writer for initial population: assumes sorted, non-overlapping
//! input against an empty (or just-dropped) tree, matching the underlying
//! `BTree::put_many` contract.

use std::collections::HashMap;

use crate::error::Result;
use crate::layout::{Bitset, Key};
use crate::model::{LabelId, NodeLabelUpdate, RangeId};
use crate::tree::PutItem;

use super::header::HeaderCodec;
use super::LabelScanStore;

/// Accumulates per-`(label, range)` bitsets across many node updates, then
/// bulk-inserts them in one pass at [`close`](Self::close). Used during
/// rebuild only.
pub struct BulkAppendWriter<'a> {
    store: &'a LabelScanStore,
    pending: HashMap<(LabelId, RangeId), u64>,
    max_label_seen: u32,
    closed: bool,
}

impl<'a> BulkAppendWriter<'a> {
    pub(super) fn new(store: &'a LabelScanStore) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            max_label_seen: 0,
            closed: false,
        }
    }

    /// Folds one node's label set into the pending accumulation. Assumes a
    /// pure population update (`before` empty); in debug builds this is
    /// asserted, matching `BTree::put_many`'s own sortedness contract.
    pub fn apply(&mut self, update: &NodeLabelUpdate) -> Result<()> {
        debug_assert!(
            update.removed().next().is_none(),
            "bulk append assumes pure population: no removals"
        );
        let width = self.store.config.range_width;
        for label in update.added() {
            let (range, offset) = width.locate(update.node_id);
            let bits = self.pending.entry((label, range)).or_insert(0);
            *bits |= 1u64 << offset;
            if label.0 > self.max_label_seen {
                self.max_label_seen = label.0;
            }
        }
        Ok(())
    }

    /// Sorts the accumulated entries and inserts them via one `put_many`
    /// call, then releases the writer seat. Returns the number of distinct
    /// `(label, range)` entries written.
    pub fn close(mut self) -> Result<u64> {
        let width = self.store.config.range_width;
        let mut entries: Vec<_> = self.pending.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let keys: Vec<Key> = entries.iter().map(|((l, r), _)| Key::new(*l, *r)).collect();
        let values: Vec<Bitset> = entries
            .iter()
            .map(|(_, bits)| Bitset::from_raw(*bits, width))
            .collect();
        let items: Vec<PutItem<'_, Key, Bitset>> = keys
            .iter()
            .zip(values.iter())
            .map(|(key, value)| PutItem { key, value })
            .collect();

        let mut tx = self.store.page_store.begin_write()?;
        self.store.tree.put_many(&mut tx, items)?;
        let mut header = HeaderCodec::decode(tx.user_header())?;
        if self.max_label_seen > header.max_label_id {
            header.max_label_id = self.max_label_seen;
        }
        tx.set_user_header(header.encode());
        self.store.page_store.commit(tx)?;
        self.closed = true;
        self.store.writer_seat.release();
        Ok(keys.len() as u64)
    }
}

impl<'a> Drop for BulkAppendWriter<'a> {
    fn drop(&mut self) {
        if !self.closed {
            self.store.writer_seat.release();
        }
    }
}
