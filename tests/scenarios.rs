//! End-to-end scenarios S1-S6 against a real file-backed store.

use std::sync::Arc;

use labelscan::collaborators::InMemoryChangeStream;
use labelscan::model::{NodeId, NodeLabelUpdate};
use labelscan::{LabelId, LabelScanStore, RangeWidth, StoreConfig, TracingMonitor};

fn config_w8() -> StoreConfig {
    StoreConfig {
        range_width: RangeWidth::W8,
        ..StoreConfig::default()
    }
}

fn open(dir: &std::path::Path, name: &str, config: StoreConfig) -> LabelScanStore {
    LabelScanStore::init(dir.join(name), config, Arc::new(TracingMonitor)).unwrap()
}

#[test]
fn s1_single_add() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), "s1.db", config_w8());
    store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();

    store
        .apply_updates([NodeLabelUpdate::new(NodeId(5), [], [LabelId(7)])])
        .unwrap();

    let reader = store.new_reader().unwrap();
    assert_eq!(reader.nodes_with_label(LabelId(7)).unwrap(), vec![NodeId(5)]);
    assert!(!reader.is_empty());

    let ranges = reader.all_node_label_ranges().unwrap();
    assert_eq!(ranges.len(), 1);
    let (label, entries) = &ranges[0];
    assert_eq!(*label, LabelId(7));
    assert_eq!(entries.len(), 1);
    let (_, bitset) = &entries[0];
    assert_eq!(bitset.set_offsets().collect::<Vec<_>>(), vec![5]);
}

#[test]
fn s2_add_then_remove() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), "s2.db", config_w8());
    store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();

    store
        .apply_updates([NodeLabelUpdate::new(NodeId(5), [], [LabelId(7)])])
        .unwrap();
    store
        .apply_updates([NodeLabelUpdate::new(NodeId(5), [LabelId(7)], [])])
        .unwrap();

    let reader = store.new_reader().unwrap();
    assert!(reader.nodes_with_label(LabelId(7)).unwrap().is_empty());
    assert!(reader.all_node_label_ranges().unwrap().is_empty());
}

#[test]
fn s3_dense_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), "s3.db", config_w8());
    store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();

    let mut writer = store.new_writer().unwrap();
    for i in (0..1000u64).rev() {
        writer
            .apply(&NodeLabelUpdate::new(NodeId(i), [], [LabelId(3)]))
            .unwrap();
    }
    writer.close().unwrap();

    let reader = store.new_reader().unwrap();
    let nodes = reader.nodes_with_label(LabelId(3)).unwrap();
    let expected: Vec<NodeId> = (0..1000u64).map(NodeId).collect();
    assert_eq!(nodes, expected);

    let ranges = reader.all_node_label_ranges().unwrap();
    assert_eq!(ranges.len(), 1);
    assert_eq!(ranges[0].1.len(), 1000usize.div_ceil(8));
}

#[test]
fn s4_range_query() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path(), "s4.db", config_w8());
    store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();

    store
        .apply_updates((0..1000u64).map(|i| NodeLabelUpdate::new(NodeId(i), [], [LabelId(3)])))
        .unwrap();

    let reader = store.new_reader().unwrap();
    let nodes = reader
        .nodes_with_label_range(LabelId(3), NodeId(100), NodeId(200))
        .unwrap();
    let expected: Vec<NodeId> = (100..200u64).map(NodeId).collect();
    assert_eq!(nodes, expected);
}

#[test]
fn s5_crash_before_force_then_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s5.db");

    // First open: populate via the bulk path directly (as `start` would),
    // but never call `force` — nothing marks the header CLEAN.
    let updates: Vec<NodeLabelUpdate> = (0..1000u64)
        .map(|i| NodeLabelUpdate::new(NodeId(i), [], [LabelId(3)]))
        .collect();
    {
        let store = LabelScanStore::init(&path, config_w8(), Arc::new(TracingMonitor)).unwrap();
        assert!(store.needs_rebuild());
        let mut writer = store.new_bulk_append_writer().unwrap();
        for u in &updates {
            writer.apply(u).unwrap();
        }
        writer.close().unwrap();
        // simulated crash: drop without ever calling `force`/`start`.
    }

    // Reopen: header is still NEEDS_REBUILD.
    let store = LabelScanStore::init(&path, config_w8(), Arc::new(TracingMonitor)).unwrap();
    assert!(store.needs_rebuild());

    store
        .start(&InMemoryChangeStream::new(updates.clone()))
        .unwrap();
    assert!(!store.needs_rebuild());

    let reader = store.new_reader().unwrap();
    let nodes = reader.nodes_with_label(LabelId(3)).unwrap();
    let expected: Vec<NodeId> = (0..1000u64).map(NodeId).collect();
    assert_eq!(nodes, expected);
}

#[test]
fn s6_read_only_dirty_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s6.db");

    // Leave the store dirty, as in S5, without ever forcing it clean.
    {
        let store = LabelScanStore::init(&path, config_w8(), Arc::new(TracingMonitor)).unwrap();
        let mut writer = store.new_bulk_append_writer().unwrap();
        writer
            .apply(&NodeLabelUpdate::new(NodeId(5), [], [LabelId(7)]))
            .unwrap();
        writer.close().unwrap();
    }

    let ro_config = StoreConfig {
        read_only: true,
        ..config_w8()
    };
    let store = LabelScanStore::init(&path, ro_config, Arc::new(TracingMonitor)).unwrap();
    assert!(store.needs_rebuild());

    store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();
    assert!(store.needs_rebuild());

    assert!(matches!(
        store.new_writer(),
        Err(labelscan::Error::NotWritable)
    ));

    // Reads still serve the last-committed content even though dirty.
    let reader = store.new_reader().unwrap();
    assert_eq!(reader.nodes_with_label(LabelId(7)).unwrap(), vec![NodeId(5)]);
}

#[test]
fn s7_force_then_reopen_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s7.db");

    {
        let store = LabelScanStore::init(&path, config_w8(), Arc::new(TracingMonitor)).unwrap();
        store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();
        store
            .apply_updates((0..500u64).map(|i| NodeLabelUpdate::new(NodeId(i), [], [LabelId(3)])))
            .unwrap();
        store.force().unwrap();
        // simulated clean shutdown: drop after force, no explicit `shutdown()` call.
    }

    let store = LabelScanStore::init(&path, config_w8(), Arc::new(TracingMonitor)).unwrap();
    assert!(!store.needs_rebuild());

    let reader = store.new_reader().unwrap();
    let nodes = reader.nodes_with_label(LabelId(3)).unwrap();
    let expected: Vec<NodeId> = (0..500u64).map(NodeId).collect();
    assert_eq!(nodes, expected);
    assert_eq!(reader.all_node_label_ranges().unwrap(), store.all_node_label_ranges().unwrap());
}

#[test]
fn s8_rebuild_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let updates: Vec<NodeLabelUpdate> = (0..300u64)
        .map(|i| NodeLabelUpdate::new(NodeId(i), [], [LabelId(i as u32 % 5)]))
        .collect();

    let first = {
        let store = LabelScanStore::init(dir.path().join("s8a.db"), config_w8(), Arc::new(TracingMonitor)).unwrap();
        store.start(&InMemoryChangeStream::new(updates.clone())).unwrap();
        store.all_node_label_ranges().unwrap()
    };

    // Rerunning `start` over the same change stream against a fresh store
    // must produce identical tree contents.
    let second = {
        let store = LabelScanStore::init(dir.path().join("s8b.db"), config_w8(), Arc::new(TracingMonitor)).unwrap();
        store.start(&InMemoryChangeStream::new(updates.clone())).unwrap();
        store.all_node_label_ranges().unwrap()
    };

    assert_eq!(first, second);
}
