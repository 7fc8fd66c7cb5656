//! Point lookup, range query, and full-scan iteration over a label-scan store.

use crate::error::Result;
use crate::layout::{Bitset, Key};
use crate::model::{LabelId, NodeId, RangeId};
use crate::pager::store::ReadGuard;

use super::LabelScanStore;

/// A consistent snapshot over a store, established at construction time.
/// Subsequent committed writes are not visible to it.
pub struct Reader<'a> {
    store: &'a LabelScanStore,
    guard: ReadGuard,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(store: &'a LabelScanStore) -> Result<Self> {
        let guard = store.page_store.begin_read()?;
        Ok(Self { store, guard })
    }

    /// All node ids carrying `label`, in ascending order.
    pub fn nodes_with_label(&self, label: LabelId) -> Result<Vec<NodeId>> {
        let width = self.store.config.range_width;
        let lo = Key::new(label, RangeId(0));
        let hi = Key::new(LabelId(label.0.saturating_add(1)), RangeId(0));
        let mut cursor = self
            .store
            .tree
            .range(&self.store.page_store, &self.guard, Some(lo), Some(hi))?;
        let mut out = Vec::new();
        while let Some((key, bitset)) = cursor.next()? {
            for offset in bitset.set_offsets() {
                out.push(width.compose(key.range, offset));
            }
        }
        Ok(out)
    }

    /// Node ids carrying `label` within `[lo_node, hi_node)`.
    pub fn nodes_with_label_range(
        &self,
        label: LabelId,
        lo_node: NodeId,
        hi_node: NodeId,
    ) -> Result<Vec<NodeId>> {
        let width = self.store.config.range_width;
        let (lo_range, _) = width.locate(lo_node);
        let hi_range = if hi_node.0 == 0 {
            RangeId(0)
        } else {
            width.locate(NodeId(hi_node.0 - 1)).0
        };
        let lo_key = Key::new(label, lo_range);
        let hi_key = Key::new(label, RangeId(hi_range.0 + 1));
        let mut cursor = self.store.tree.range(
            &self.store.page_store,
            &self.guard,
            Some(lo_key),
            Some(hi_key),
        )?;
        let mut out = Vec::new();
        while let Some((key, bitset)) = cursor.next()? {
            for offset in bitset.set_offsets() {
                let node = width.compose(key.range, offset);
                if node >= lo_node && node < hi_node {
                    out.push(node);
                }
            }
        }
        Ok(out)
    }

    /// The full `(label, [(range, bitset)])` content of the store, in
    /// ascending key order.
    pub fn all_node_label_ranges(&self) -> Result<Vec<(LabelId, Vec<(RangeId, Bitset)>)>> {
        let mut cursor = self
            .store
            .tree
            .range(&self.store.page_store, &self.guard, None, None)?;
        let mut out: Vec<(LabelId, Vec<(RangeId, Bitset)>)> = Vec::new();
        while let Some((key, bitset)) = cursor.next()? {
            match out.last_mut() {
                Some((label, ranges)) if *label == key.label => ranges.push((key.range, bitset)),
                _ => out.push((key.label, vec![(key.range, bitset)])),
            }
        }
        Ok(out)
    }

    /// True if the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.guard.root().is_none()
    }
}
