//! Layered configuration surface with preset constructors, in the teacher's style.

use crate::model::RangeWidth;

/// Tunable knobs for a [`crate::store::LabelScanStore`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Refuses all writer acquisitions; permits a dirty open without rebuild.
    pub read_only: bool,
    /// Tree page size in bytes; `0` selects the page-cache default (4096).
    pub page_size: u32,
    /// Bits per bitset value; fixed for the lifetime of the store file.
    pub range_width: RangeWidth,
    /// Max pending tuples the batching writer buffers before auto-flush.
    pub writer_batch_size: usize,
    /// Emit a per-merge audit event to the write monitor.
    pub write_monitor_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            page_size: 0,
            range_width: RangeWidth::W64,
            writer_batch_size: 1000,
            write_monitor_enabled: false,
        }
    }
}

impl StoreConfig {
    /// Refuses writer acquisition outright; reads serve last-checkpointed content.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Small batch size and monitor on, for workloads prioritizing
    /// crash-visibility over raw write throughput.
    pub fn durable() -> Self {
        Self {
            writer_batch_size: 32,
            write_monitor_enabled: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_from_default() {
        let d = StoreConfig::default();
        let ro = StoreConfig::read_only();
        let durable = StoreConfig::durable();
        assert!(!d.read_only);
        assert!(ro.read_only);
        assert!(durable.write_monitor_enabled);
        assert!(durable.writer_batch_size < d.writer_batch_size);
    }
}
