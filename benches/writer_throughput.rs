//! Compares `BatchingWriter` against `BulkAppendWriter` throughput on a
//! synthetic dense-label population workload.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use labelscan::collaborators::InMemoryChangeStream;
use labelscan::model::{NodeId, NodeLabelUpdate};
use labelscan::{LabelId, LabelScanStore, RangeWidth, StoreConfig, TracingMonitor};

const NODE_COUNT: u64 = 20_000;

fn dense_updates() -> Vec<NodeLabelUpdate> {
    (0..NODE_COUNT)
        .map(|i| NodeLabelUpdate::new(NodeId(i), [], [LabelId((i % 8) as u32)]))
        .collect()
}

fn config() -> StoreConfig {
    StoreConfig {
        range_width: RangeWidth::W64,
        writer_batch_size: 4096,
        ..StoreConfig::default()
    }
}

fn bench_batched(c: &mut Criterion) {
    let updates = dense_updates();
    c.bench_function("batching_writer_dense_population", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let store =
                    LabelScanStore::init(dir.path().join("bench.db"), config(), Arc::new(TracingMonitor))
                        .unwrap();
                store.start(&InMemoryChangeStream::new(Vec::new())).unwrap();
                (dir, store)
            },
            |(_dir, store)| {
                store.apply_updates(updates.clone()).unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_bulk(c: &mut Criterion) {
    let updates = dense_updates();
    c.bench_function("bulk_append_writer_dense_population", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                (dir, updates.clone())
            },
            |(dir, updates)| {
                let store =
                    LabelScanStore::init(dir.path().join("bench.db"), config(), Arc::new(TracingMonitor))
                        .unwrap();
                store.start(&InMemoryChangeStream::new(updates)).unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_batched, bench_bulk);
criterion_main!(benches);
