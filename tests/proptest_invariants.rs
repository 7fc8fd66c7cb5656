//! Property-based tests for the quantified invariants: reader/ground-truth
//! equivalence (1), no-zero-value entries (2), and bulk/batched equivalence (6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use labelscan::collaborators::InMemoryChangeStream;
use labelscan::model::{NodeId, NodeLabelUpdate};
use labelscan::{LabelId, LabelScanStore, RangeWidth, StoreConfig, TracingMonitor};

const NODE_UNIVERSE: u64 = 24;
const LABEL_UNIVERSE: u32 = 3;

fn config() -> StoreConfig {
    StoreConfig {
        range_width: RangeWidth::W8,
        ..StoreConfig::default()
    }
}

fn toggle_ops() -> impl Strategy<Value = Vec<(u64, u32, bool)>> {
    prop::collection::vec(
        (0..NODE_UNIVERSE, 0..LABEL_UNIVERSE, any::<bool>()),
        0..60,
    )
}

proptest! {
    #[test]
    fn reader_matches_oracle_and_stays_nonzero(ops in toggle_ops()) {
        let dir = tempfile::tempdir().unwrap();
        let store = LabelScanStore::init(dir.path().join("prop1.db"), config(), Arc::new(TracingMonitor)).unwrap();
        store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();

        let mut oracle: HashMap<LabelId, HashSet<NodeId>> = HashMap::new();

        for (node_raw, label_raw, add) in ops {
            let node = NodeId(node_raw);
            let label = LabelId(label_raw);
            let currently_has = oracle.get(&label).map(|s| s.contains(&node)).unwrap_or(false);

            let before = if currently_has { vec![label] } else { vec![] };
            let after = if add { vec![label] } else { vec![] };
            if before == after {
                continue;
            }
            store.apply_updates([NodeLabelUpdate::new(node, before, after)]).unwrap();

            let entry = oracle.entry(label).or_default();
            if add {
                entry.insert(node);
            } else {
                entry.remove(&node);
            }
        }

        let reader = store.new_reader().unwrap();
        for label_raw in 0..LABEL_UNIVERSE {
            let label = LabelId(label_raw);
            let mut expected: Vec<NodeId> = oracle.get(&label).cloned().unwrap_or_default().into_iter().collect();
            expected.sort();
            let actual = reader.nodes_with_label(label).unwrap();
            prop_assert_eq!(actual, expected);
        }

        let report = store.consistency_check().unwrap();
        prop_assert!(report.ok, "faults: {:?}", report.faults);
    }

    #[test]
    fn bulk_append_matches_batched_writer(ops in prop::collection::vec((0..NODE_UNIVERSE, 0..LABEL_UNIVERSE), 0..40)) {
        // pure population: dedup by (node, label), no removals.
        let mut pairs: HashSet<(u64, u32)> = HashSet::new();
        for op in ops {
            pairs.insert(op);
        }
        let mut per_node: HashMap<u64, Vec<LabelId>> = HashMap::new();
        for (node, label) in &pairs {
            per_node.entry(*node).or_default().push(LabelId(*label));
        }
        let updates: Vec<NodeLabelUpdate> = per_node
            .into_iter()
            .map(|(node, labels)| NodeLabelUpdate::new(NodeId(node), [], labels))
            .collect();

        let dir = tempfile::tempdir().unwrap();

        let batched = LabelScanStore::init(dir.path().join("batched.db"), config(), Arc::new(TracingMonitor)).unwrap();
        batched.start(&InMemoryChangeStream::new(Vec::new())).unwrap();
        batched.apply_updates(updates.clone()).unwrap();

        let bulk = LabelScanStore::init(dir.path().join("bulk.db"), config(), Arc::new(TracingMonitor)).unwrap();
        bulk.start(&InMemoryChangeStream::new(updates)).unwrap();

        let batched_ranges = batched.new_reader().unwrap().all_node_label_ranges().unwrap();
        let bulk_ranges = bulk.new_reader().unwrap().all_node_label_ranges().unwrap();
        prop_assert_eq!(batched_ranges, bulk_ranges);
    }
}
