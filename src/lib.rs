//! A persistent, recoverable secondary index answering, for a graph
//! database, "which nodes carry label `L`?" — with incremental updates,
//! point and range queries, batched writes, and crash recovery.
//!
//! See [`store::LabelScanStore`] for the main entry point.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod model;
pub mod monitor;
mod pager;
pub mod store;
mod tree;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use layout::{Bitset, Key, LAYOUT_ID};
pub use model::{LabelId, NodeId, NodeLabelUpdate, RangeId, RangeWidth};
pub use monitor::{StoreMonitor, TracingMonitor};
pub use store::{BatchingWriter, BulkAppendWriter, ConsistencyReport, LabelScanStore, Reader};
