//! File-backed, copy-on-write page storage.
//!
//! Page 0 is a fixed-size superblock holding the configured page size, the
//! current tree root, and an opaque user header blob (the one-byte
//! clean/dirty flag plus the highest-label counter live here, written by the
//! label-scan store's `HeaderCodec`). Pages 1.. are data pages in
//! [`super::page`] framing.
//!
//! Writes never mutate an already-committed page in place: every page
//! touched by a write transaction is cloned into an in-memory working set
//! keyed by its pre-transaction id, mutated there, and at commit time each
//! touched page is assigned a brand-new, never-before-used page id. Any
//! pointer inside a touched page that referenced another touched page is
//! rewritten to the new id before the page is flushed. The superblock is
//! updated last, under fsync, to publish the new root atomically. A reader
//! that began before commit keeps following old, physically untouched pages
//! and so sees the pre-commit snapshot; this is the tree's whole
//! copy-on-write guarantee, paid for by never reclaiming superseded pages.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::layout::LAYOUT_ID;
use crate::pager::page::{self, PageKind};

/// Identifies a physical page. Id 0 is always the superblock.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

const SUPERBLOCK_LEN: usize = 4096;
const SB_MAGIC: &[u8; 8] = b"LBLSCN01";
// Layout within the superblock payload (after the 8-byte magic):
const SB_PAGE_SIZE_OFF: usize = 8;
const SB_HAS_ROOT_OFF: usize = 12;
const SB_ROOT_OFF: usize = 13;
const SB_NEXT_ID_OFF: usize = 21;
const SB_LAYOUT_ID_OFF: usize = 29;
const SB_HEADER_LEN_OFF: usize = 33;
const SB_HEADER_DATA_OFF: usize = 35;

/// A reference to a page's bytes as seen by a reader.
pub type PageRef = Arc<[u8]>;

/// Snapshot held by a read transaction: the root page id as of snapshot
/// creation and a cache of already-fetched pages.
pub struct ReadGuard {
    root: Option<PageId>,
    user_header: Vec<u8>,
}

impl ReadGuard {
    /// The tree root as of when this snapshot was taken, if the tree is non-empty.
    pub fn root(&self) -> Option<PageId> {
        self.root
    }

    /// The opaque user header as of this snapshot.
    pub fn user_header(&self) -> &[u8] {
        &self.user_header
    }
}

enum DirtyOrigin {
    /// Cloned from a page that already existed on disk before this transaction.
    Existing,
    /// Allocated fresh during this transaction; already a final id.
    Fresh,
}

struct DirtyPage {
    bytes: Vec<u8>,
    origin: DirtyOrigin,
}

/// The single writer's working set. Only one `WriteGuard` can be live at a time.
pub struct WriteGuard<'a> {
    store: &'a FilePageStore,
    dirty: HashMap<PageId, DirtyPage>,
    root: Option<PageId>,
    user_header: Vec<u8>,
}

impl<'a> WriteGuard<'a> {
    /// The tree root visible within this transaction so far.
    pub fn root(&self) -> Option<PageId> {
        self.root
    }

    /// Sets the tree root for this transaction (e.g. after the very first
    /// insert, or after a root split).
    pub fn set_root(&mut self, id: PageId) {
        self.root = Some(id);
    }

    /// Clears the tree root, discarding all content as of this transaction
    /// (used when a dirty store is dropped ahead of a rebuild).
    pub fn clear_root(&mut self) {
        self.root = None;
    }

    /// The opaque user header visible within this transaction.
    pub fn user_header(&self) -> &[u8] {
        &self.user_header
    }

    /// Overwrites the opaque user header; committed atomically with the rest
    /// of the transaction.
    pub fn set_user_header(&mut self, bytes: Vec<u8>) {
        self.user_header = bytes;
    }

    /// Allocates a brand-new page id and a zeroed working copy for it.
    pub fn allocate_page(&mut self, kind: PageKind) -> Result<PageId> {
        let id = PageId(self.store.next_page_id.fetch_add(1, Ordering::SeqCst));
        let mut bytes = vec![0u8; self.store.page_size as usize];
        page::finalize(&mut bytes, kind, 0);
        self.dirty.insert(
            id,
            DirtyPage {
                bytes,
                origin: DirtyOrigin::Fresh,
            },
        );
        Ok(id)
    }

    /// Returns a mutable working copy of `id`, cloning it from disk on first touch.
    pub fn page_mut(&mut self, id: PageId) -> Result<&mut [u8]> {
        if !self.dirty.contains_key(&id) {
            let bytes = self.store.read_page_bytes(id)?;
            self.dirty.insert(
                id,
                DirtyPage {
                    bytes: (*bytes).to_vec(),
                    origin: DirtyOrigin::Existing,
                },
            );
        }
        Ok(&mut self.dirty.get_mut(&id).unwrap().bytes)
    }

    /// Returns a page's bytes, preferring the in-transaction working copy.
    pub fn page(&self, id: PageId) -> Result<PageRef> {
        if let Some(dirty) = self.dirty.get(&id) {
            return Ok(Arc::from(dirty.bytes.as_slice()));
        }
        self.store.read_page_bytes(id)
    }
}

/// A file-backed, single-writer, copy-on-write page store.
pub struct FilePageStore {
    file: Mutex<File>,
    page_size: u32,
    next_page_id: AtomicU64,
    writer_held: AtomicBool,
    layout_id: u32,
    committed: RwLock<Committed>,
}

struct Committed {
    root: Option<PageId>,
    user_header: Vec<u8>,
}

impl FilePageStore {
    /// Creates a new store file at `path`, or opens it if already present.
    pub fn open_or_create(path: &Path, page_size: u32) -> Result<Self> {
        if path.exists() {
            Self::open_existing(path)
        } else {
            Self::create_new(path, page_size)
        }
    }

    fn create_new(path: &Path, page_size: u32) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut sb = vec![0u8; SUPERBLOCK_LEN];
        sb[0..8].copy_from_slice(SB_MAGIC);
        sb[SB_PAGE_SIZE_OFF..SB_PAGE_SIZE_OFF + 4].copy_from_slice(&page_size.to_le_bytes());
        sb[SB_HAS_ROOT_OFF] = 0;
        sb[SB_NEXT_ID_OFF..SB_NEXT_ID_OFF + 8].copy_from_slice(&1u64.to_le_bytes());
        sb[SB_LAYOUT_ID_OFF..SB_LAYOUT_ID_OFF + 4].copy_from_slice(&LAYOUT_ID.to_le_bytes());
        sb[SB_HEADER_LEN_OFF..SB_HEADER_LEN_OFF + 2].copy_from_slice(&0u16.to_le_bytes());
        file.write_all(&sb)?;
        file.sync_all()?;
        Ok(Self {
            file: Mutex::new(file),
            page_size,
            next_page_id: AtomicU64::new(1),
            writer_held: AtomicBool::new(false),
            layout_id: LAYOUT_ID,
            committed: RwLock::new(Committed {
                root: None,
                user_header: Vec::new(),
            }),
        })
    }

    fn open_existing(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut sb = vec![0u8; SUPERBLOCK_LEN];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut sb)?;
        if &sb[0..8] != SB_MAGIC {
            return Err(Error::TreeCorrupt("bad superblock magic".into()));
        }
        let page_size = u32::from_le_bytes(sb[SB_PAGE_SIZE_OFF..SB_PAGE_SIZE_OFF + 4].try_into().unwrap());
        let has_root = sb[SB_HAS_ROOT_OFF] != 0;
        let root = if has_root {
            Some(PageId(u64::from_le_bytes(
                sb[SB_ROOT_OFF..SB_ROOT_OFF + 8].try_into().unwrap(),
            )))
        } else {
            None
        };
        let next_id = u64::from_le_bytes(sb[SB_NEXT_ID_OFF..SB_NEXT_ID_OFF + 8].try_into().unwrap());
        let layout_id = u32::from_le_bytes(sb[SB_LAYOUT_ID_OFF..SB_LAYOUT_ID_OFF + 4].try_into().unwrap());
        let header_len =
            u16::from_le_bytes(sb[SB_HEADER_LEN_OFF..SB_HEADER_LEN_OFF + 2].try_into().unwrap())
                as usize;
        let user_header = sb[SB_HEADER_DATA_OFF..SB_HEADER_DATA_OFF + header_len].to_vec();
        if layout_id != LAYOUT_ID {
            return Err(Error::LayoutMismatch {
                expected: LAYOUT_ID,
                found: layout_id,
            });
        }
        Ok(Self {
            file: Mutex::new(file),
            page_size,
            next_page_id: AtomicU64::new(next_id),
            writer_held: AtomicBool::new(false),
            layout_id,
            committed: RwLock::new(Committed { root, user_header }),
        })
    }

    /// Page size in bytes for data pages.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The on-disk layout id this store was opened with.
    pub fn layout_id(&self) -> u32 {
        self.layout_id
    }

    fn page_offset(&self, id: PageId) -> u64 {
        SUPERBLOCK_LEN as u64 + (id.0 - 1) * self.page_size as u64
    }

    fn read_page_bytes(&self, id: PageId) -> Result<PageRef> {
        if id.0 == 0 || id.0 >= self.next_page_id.load(Ordering::SeqCst) {
            return Err(Error::NoSuchPage(id.0));
        }
        let mut buf = vec![0u8; self.page_size as usize];
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(self.page_offset(id)))?;
        file.read_exact(&mut buf)?;
        page::parse(&buf, id.0)?;
        Ok(Arc::from(buf.as_slice()))
    }

    /// Opens a read snapshot as of the current committed state.
    pub fn begin_read(&self) -> Result<ReadGuard> {
        let committed = self.committed.read().unwrap();
        Ok(ReadGuard {
            root: committed.root,
            user_header: committed.user_header.clone(),
        })
    }

    /// Fetches a page within a read transaction.
    pub fn get_page(&self, _guard: &ReadGuard, id: PageId) -> Result<PageRef> {
        self.read_page_bytes(id)
    }

    /// Acquires the single writer seat. Non-blocking; fails immediately if held.
    pub fn begin_write(&self) -> Result<WriteGuard<'_>> {
        if self
            .writer_held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::WriterBusy);
        }
        let committed = self.committed.read().unwrap();
        Ok(WriteGuard {
            store: self,
            dirty: HashMap::new(),
            root: committed.root,
            user_header: committed.user_header.clone(),
        })
    }

    /// Releases the writer seat without persisting any changes.
    pub fn abort(&self, _guard: WriteGuard<'_>) {
        self.writer_held.store(false, Ordering::SeqCst);
    }

    /// Commits a write transaction: relocates every dirty page to a fresh id,
    /// rewrites intra-page pointers via the old->new remap, flushes data
    /// pages, then atomically publishes the new root and user header.
    pub fn commit(&self, guard: WriteGuard<'_>) -> Result<()> {
        let WriteGuard {
            dirty,
            root,
            user_header,
            ..
        } = guard;

        let mut remap: HashMap<PageId, PageId> = HashMap::new();
        for (old_id, page) in &dirty {
            match page.origin {
                DirtyOrigin::Existing => {
                    let new_id = PageId(self.next_page_id.fetch_add(1, Ordering::SeqCst));
                    remap.insert(*old_id, new_id);
                }
                DirtyOrigin::Fresh => {
                    remap.insert(*old_id, *old_id);
                }
            }
        }

        let mut file = self.file.lock().unwrap();
        for (old_id, mut page) in dirty {
            let final_id = remap[&old_id];
            rewrite_pointers(&mut page.bytes, final_id.0, &remap)?;
            file.seek(SeekFrom::Start(self.page_offset(final_id)))?;
            file.write_all(&page.bytes)?;
        }
        file.sync_data()?;

        let new_root = root.map(|r| *remap.get(&r).unwrap_or(&r));

        let mut sb = vec![0u8; SUPERBLOCK_LEN];
        sb[0..8].copy_from_slice(SB_MAGIC);
        sb[SB_PAGE_SIZE_OFF..SB_PAGE_SIZE_OFF + 4].copy_from_slice(&self.page_size.to_le_bytes());
        match new_root {
            Some(r) => {
                sb[SB_HAS_ROOT_OFF] = 1;
                sb[SB_ROOT_OFF..SB_ROOT_OFF + 8].copy_from_slice(&r.0.to_le_bytes());
            }
            None => sb[SB_HAS_ROOT_OFF] = 0,
        }
        let next_id = self.next_page_id.load(Ordering::SeqCst);
        sb[SB_NEXT_ID_OFF..SB_NEXT_ID_OFF + 8].copy_from_slice(&next_id.to_le_bytes());
        sb[SB_LAYOUT_ID_OFF..SB_LAYOUT_ID_OFF + 4].copy_from_slice(&self.layout_id.to_le_bytes());
        let header_len = user_header.len() as u16;
        sb[SB_HEADER_LEN_OFF..SB_HEADER_LEN_OFF + 2].copy_from_slice(&header_len.to_le_bytes());
        sb[SB_HEADER_DATA_OFF..SB_HEADER_DATA_OFF + user_header.len()]
            .copy_from_slice(&user_header);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&sb)?;
        file.sync_all()?;
        drop(file);

        *self.committed.write().unwrap() = Committed {
            root: new_root,
            user_header,
        };
        self.writer_held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Rewrites any child-page-id pointer inside a dirty page's bytes that
/// refers to another dirty page, to that page's final remapped id. `final_id`
/// is the page's own post-remap id, used only to attribute a checksum
/// failure to the right page.
fn rewrite_pointers(bytes: &mut [u8], final_id: u64, remap: &HashMap<PageId, PageId>) -> Result<()> {
    let header = page::parse(bytes, final_id)?;
    if header.kind != PageKind::Internal {
        return Ok(());
    }
    let payload_len = header.payload_len;
    crate::tree::page::rewrite_internal_children(bytes, remap)?;
    page::finalize(bytes, PageKind::Internal, payload_len);
    Ok(())
}
