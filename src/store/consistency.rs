//! Structural and semantic consistency checking, delegating iteration to the
//! tree's own ordered traversal.

use crate::error::Result;
use crate::layout::{Bitset, Key};

use super::LabelScanStore;

/// Result of a [`LabelScanStore::consistency_check`](super::LabelScanStore::consistency_check) run.
#[derive(Clone, Debug, Default)]
pub struct ConsistencyReport {
    /// True if no fault was found.
    pub ok: bool,
    /// Human-readable descriptions of every fault found.
    pub faults: Vec<String>,
}

pub(super) fn check(store: &LabelScanStore) -> Result<ConsistencyReport> {
    let guard = store.page_store.begin_read()?;
    let mut faults = Vec::new();
    let mut prev: Option<Key> = None;
    store
        .tree
        .for_each(&store.page_store, &guard, |key: Key, bitset: Bitset| {
            if let Some(p) = prev {
                if key <= p {
                    faults.push(format!(
                        "key-order violation or duplicate key: {key:?} did not follow {p:?}"
                    ));
                }
            }
            if bitset.is_empty() {
                faults.push(format!("zero-valued entry stored at key {key:?}"));
            }
            prev = Some(key);
            Ok(())
        })?;
    Ok(ConsistencyReport {
        ok: faults.is_empty(),
        faults,
    })
}
