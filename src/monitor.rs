//! External monitor collaborator: lifecycle and per-merge audit event sink.

use crate::model::{LabelId, RangeId};

/// Observes label-scan store lifecycle and per-merge audit events. All
/// methods default to no-ops so implementers only override what they need.
pub trait StoreMonitor: Send + Sync {
    /// The store has finished opening.
    fn init(&self) {}
    /// No index file was found at open.
    fn no_index(&self) {}
    /// The on-disk index failed validation at open.
    fn not_valid_index(&self) {}
    /// A rebuild has begun, identified by a unique human-readable part name.
    fn rebuilding(&self, part: &str) {
        let _ = part;
    }
    /// A rebuild completed, replaying `count` nodes.
    fn rebuilt(&self, part: &str, count: u64) {
        let _ = (part, count);
    }
    /// A `force` checkpoint completed.
    fn forced(&self) {}
    /// One `(label, range)` merge was flushed; only called when
    /// `write_monitor_enabled` is set.
    fn merge_applied(&self, label: LabelId, range: RangeId, add_mask: u64, remove_mask: u64, result: u64) {
        let _ = (label, range, add_mask, remove_mask, result);
    }
    /// The tree handed off a background recovery-cleanup task.
    fn recovery_cleanup(&self, description: &str) {
        let _ = description;
    }
}

/// Default monitor: emits `tracing` events, matching the teacher's logging conventions.
#[derive(Default, Debug)]
pub struct TracingMonitor;

impl StoreMonitor for TracingMonitor {
    fn init(&self) {
        tracing::info!("label-scan store initialized");
    }

    fn no_index(&self) {
        tracing::warn!("no label-scan index file found; will rebuild");
    }

    fn not_valid_index(&self) {
        tracing::warn!("label-scan index failed validation; will rebuild");
    }

    fn rebuilding(&self, part: &str) {
        tracing::info!(part, "rebuilding label-scan index");
    }

    fn rebuilt(&self, part: &str, count: u64) {
        tracing::info!(part, count, "label-scan index rebuilt");
    }

    fn forced(&self) {
        tracing::debug!("label-scan index checkpoint forced");
    }

    fn merge_applied(&self, label: LabelId, range: RangeId, add_mask: u64, remove_mask: u64, result: u64) {
        tracing::debug!(
            label = label.0,
            range = range.0,
            add_mask,
            remove_mask,
            result,
            "applied label-scan merge"
        );
    }

    fn recovery_cleanup(&self, description: &str) {
        tracing::debug!(description, "recovery cleanup task");
    }
}
