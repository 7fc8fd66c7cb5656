use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every way a label-scan store operation can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure from the page store or filesystem.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// A mutation was attempted against a store opened read-only.
    #[error("store is not writable")]
    NotWritable,

    /// A second writer seat was requested while one is already held.
    #[error("writer seat already held")]
    WriterBusy,

    /// A mutation was attempted before the store finished rebuilding.
    #[error("store is dirty and requires a rebuild before writes are accepted")]
    StoreDirty,

    /// The on-disk layout identifier does not match this build's layout.
    #[error("on-disk layout mismatch: expected {expected}, found {found}")]
    LayoutMismatch {
        /// Layout id this build expects.
        expected: u32,
        /// Layout id found on disk.
        found: u32,
    },

    /// Tree metadata or a consistency check failed; recoverable by rebuild when writable.
    #[error("tree corrupt: {0}")]
    TreeCorrupt(String),

    /// The store file was absent when an operation required it to exist.
    #[error("store file missing")]
    FileMissing,

    /// An incoming update claimed both add and remove of the same label for one node.
    #[error("invalid update: node {node} claims both add and remove of label {label}")]
    InvalidUpdate {
        /// The offending node id.
        node: u64,
        /// The offending label id.
        label: u32,
    },

    /// A page read failed its checksum.
    #[error("checksum mismatch on page {page}")]
    ChecksumMismatch {
        /// The page id whose checksum did not match.
        page: u64,
    },

    /// A page was addressed that does not exist in the backing file.
    #[error("no such page: {0}")]
    NoSuchPage(u64),
}
