//! A generic copy-on-write B+ tree over a [`FilePageStore`](crate::pager::store::FilePageStore).
//!
//! Generalizes the label-scan store's `(Key, Bitset)` entries behind
//! [`KeyCodec`]/[`ValCodec`] so the tree itself knows nothing about labels or
//! bitsets; it is the concrete stand-in for the specification's external
//! `PagedTree` contract.

pub mod page;

mod cursor;

pub use cursor::Cursor;

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::pager::page::{self as phys, PageKind};
use crate::pager::store::{FilePageStore, PageId, ReadGuard, WriteGuard};

/// Key types storable in the tree must be order-preserving encodable.
pub trait KeyCodec: Sized + Clone {
    /// Encode `key` into `out`.
    fn encode_key(key: &Self, out: &mut Vec<u8>);
    /// Decode a key from its encoded representation.
    fn decode_key(bytes: &[u8]) -> Result<Self>;
    /// Compare two encoded keys; must agree with the unencoded type's own order.
    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering;
}

/// Value types storable in the tree must be self-describing on the wire.
pub trait ValCodec: Sized {
    /// Encode `value` into `out`.
    fn encode_val(value: &Self, out: &mut Vec<u8>);
    /// Decode a value from `src`.
    fn decode_val(src: &[u8]) -> Result<Self>;
}

/// Tuning knobs for a [`BTree`].
#[derive(Clone, Debug)]
pub struct BTreeOptions {
    /// Data page size in bytes.
    pub page_size: u32,
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self { page_size: 4096 }
    }
}

/// One entry to insert via [`BTree::put_many`].
pub struct PutItem<'a, K, V> {
    /// Key reference to insert.
    pub key: &'a K,
    /// Value reference to insert.
    pub value: &'a V,
}

/// A generic, single-writer, copy-on-write B+ tree.
pub struct BTree<K, V> {
    _marker: PhantomData<(K, V)>,
}

impl<K: KeyCodec, V: ValCodec> BTree<K, V> {
    /// Constructs a tree handle. The tree's actual state (root, pages) lives
    /// entirely in the page store; this type is a stateless set of
    /// operations over it; `options` is retained for future tuning but the
    /// only knob today, page size, is fixed by the store at creation.
    pub fn new(_options: BTreeOptions) -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Looks up `key` within a read snapshot.
    pub fn get(&self, store: &FilePageStore, tx: &ReadGuard, key: &K) -> Result<Option<V>> {
        let mut key_bytes = Vec::new();
        K::encode_key(key, &mut key_bytes);
        let Some(root) = tx.root() else {
            return Ok(None);
        };
        let mut current = root;
        loop {
            let bytes = store.get_page(tx, current)?;
            let header = phys::parse(&bytes, current.0)?;
            let payload = &phys::payload(&bytes)[..header.payload_len as usize];
            match header.kind {
                PageKind::Leaf => {
                    let records = page::decode_leaf(payload)?;
                    return search_leaf::<K, V>(&records, &key_bytes);
                }
                PageKind::Internal => {
                    let (leftmost, recs) = page::decode_internal(payload)?;
                    current = choose_child::<K>(leftmost, &recs, &key_bytes);
                }
            }
        }
    }

    /// Looks up `key` within an in-progress write transaction, seeing its own
    /// uncommitted edits (needed for the batching writer's read-modify-write
    /// merges, which must not pay for a second transaction per tuple).
    pub fn get_with_write(&self, tx: &WriteGuard<'_>, key: &K) -> Result<Option<V>> {
        let mut key_bytes = Vec::new();
        K::encode_key(key, &mut key_bytes);
        let Some(root) = tx.root() else {
            return Ok(None);
        };
        let mut current = root;
        loop {
            let bytes = tx.page(current)?;
            let header = phys::parse(&bytes, current.0)?;
            let payload = &phys::payload(&bytes)[..header.payload_len as usize];
            match header.kind {
                PageKind::Leaf => {
                    let records = page::decode_leaf(payload)?;
                    return search_leaf::<K, V>(&records, &key_bytes);
                }
                PageKind::Internal => {
                    let (leftmost, recs) = page::decode_internal(payload)?;
                    current = choose_child::<K>(leftmost, &recs, &key_bytes);
                }
            }
        }
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn put(&self, tx: &mut WriteGuard<'_>, key: &K, value: &V) -> Result<()> {
        let mut key_bytes = Vec::new();
        K::encode_key(key, &mut key_bytes);
        let mut val_bytes = Vec::new();
        V::encode_val(value, &mut val_bytes);
        let path = find_path_mut::<K>(tx, &key_bytes)?;
        self.put_at_path(tx, path, key_bytes, val_bytes)
    }

    /// Inserts many already-sorted `(key, value)` pairs. In debug builds,
    /// sortedness is asserted; release builds trust the caller.
    pub fn put_many<'a, I>(&self, tx: &mut WriteGuard<'_>, items: I) -> Result<()>
    where
        I: IntoIterator<Item = PutItem<'a, K, V>>,
        K: 'a,
        V: 'a,
    {
        let mut prev: Option<Vec<u8>> = None;
        for item in items {
            let mut key_bytes = Vec::new();
            K::encode_key(item.key, &mut key_bytes);
            if let Some(p) = &prev {
                debug_assert!(
                    K::compare_encoded(p, &key_bytes) != Ordering::Greater,
                    "put_many requires sorted, non-decreasing keys"
                );
            }
            let mut val_bytes = Vec::new();
            V::encode_val(item.value, &mut val_bytes);
            let path = find_path_mut::<K>(tx, &key_bytes)?;
            self.put_at_path(tx, path, key_bytes.clone(), val_bytes)?;
            prev = Some(key_bytes);
        }
        Ok(())
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, tx: &mut WriteGuard<'_>, key: &K) -> Result<bool> {
        let mut key_bytes = Vec::new();
        K::encode_key(key, &mut key_bytes);
        let path = find_path_mut::<K>(tx, &key_bytes)?;
        let leaf_id = *path.last().expect("path always has a leaf");
        let bytes = tx.page_mut(leaf_id)?;
        let header = phys::parse(bytes, leaf_id.0)?;
        let mut records = page::decode_leaf(&phys::payload(bytes)[..header.payload_len as usize])?;
        let pos = records
            .binary_search_by(|(k, _)| K::compare_encoded(k, &key_bytes))
            .ok();
        let Some(pos) = pos else {
            return Ok(false);
        };
        records.remove(pos);
        let payload = page::encode_leaf(&records);
        let len = payload.len() as u32;
        phys::payload_mut(bytes)[..payload.len()].copy_from_slice(&payload);
        phys::finalize(bytes, PageKind::Leaf, len);
        Ok(true)
    }

    /// Reads `(key, value)` starting just before `lo`, up to (exclusive of)
    /// `hi`, within `[lo, hi)`. Pass `hi = None` for an unbounded upper end.
    pub fn range<'a>(
        &'a self,
        store: &'a FilePageStore,
        tx: &'a ReadGuard,
        lo: Option<K>,
        hi: Option<K>,
    ) -> Result<Cursor<'a, K, V>> {
        Cursor::new(store, tx, lo, hi)
    }

    /// Visits every `(key, value)` pair in ascending order.
    pub fn for_each(
        &self,
        store: &FilePageStore,
        tx: &ReadGuard,
        mut visit: impl FnMut(K, V) -> Result<()>,
    ) -> Result<()> {
        let mut cursor = self.range(store, tx, None, None)?;
        while let Some((k, v)) = cursor.next()? {
            visit(k, v)?;
        }
        Ok(())
    }

    fn put_at_path(
        &self,
        tx: &mut WriteGuard<'_>,
        mut path: Vec<PageId>,
        key_bytes: Vec<u8>,
        val_bytes: Vec<u8>,
    ) -> Result<()> {
        let leaf_id = path.pop().expect("path always has a leaf");
        let mut split = insert_into_leaf(tx, leaf_id, key_bytes, val_bytes)?;

        while let Some((sep, right_id)) = split {
            match path.pop() {
                Some(parent_id) => {
                    split = insert_into_internal(tx, parent_id, sep, right_id)?;
                }
                None => {
                    let left_id = tx.root().expect("root must be set once a leaf exists");
                    let new_root = tx.allocate_page(PageKind::Internal)?;
                    let payload = page::encode_internal(left_id, &[(sep, right_id)]);
                    let len = payload.len() as u32;
                    let bytes = tx.page_mut(new_root)?;
                    phys::payload_mut(bytes)[..payload.len()].copy_from_slice(&payload);
                    phys::finalize(bytes, PageKind::Internal, len);
                    tx.set_root(new_root);
                    split = None;
                }
            }
        }
        Ok(())
    }
}

fn search_leaf<K: KeyCodec, V: ValCodec>(
    records: &[(Vec<u8>, Vec<u8>)],
    key_bytes: &[u8],
) -> Result<Option<V>> {
    match records.binary_search_by(|(k, _)| K::compare_encoded(k, key_bytes)) {
        Ok(idx) => Ok(Some(V::decode_val(&records[idx].1)?)),
        Err(_) => Ok(None),
    }
}

pub(crate) fn choose_child<K: KeyCodec>(
    leftmost: PageId,
    records: &[(Vec<u8>, PageId)],
    key_bytes: &[u8],
) -> PageId {
    let mut child = leftmost;
    for (sep, c) in records {
        if K::compare_encoded(sep, key_bytes) != Ordering::Greater {
            child = *c;
        } else {
            break;
        }
    }
    child
}

/// Descends from the root to the target leaf, cloning every page on the path
/// into the transaction's working set (even unchanged ones), since each
/// ancestor's child pointer must be eligible for rewriting at commit time.
/// Returns the path root..leaf, allocating an empty root leaf if the tree is
/// currently empty.
fn find_path_mut<K: KeyCodec>(tx: &mut WriteGuard<'_>, key_bytes: &[u8]) -> Result<Vec<PageId>> {
    let root = match tx.root() {
        Some(r) => r,
        None => {
            let leaf = tx.allocate_page(PageKind::Leaf)?;
            tx.set_root(leaf);
            return Ok(vec![leaf]);
        }
    };
    let mut path = Vec::new();
    let mut current = root;
    loop {
        path.push(current);
        let bytes = tx.page_mut(current)?;
        let header = phys::parse(bytes, current.0)?;
        match header.kind {
            PageKind::Leaf => break,
            PageKind::Internal => {
                let (leftmost, recs) =
                    page::decode_internal(&phys::payload(bytes)[..header.payload_len as usize])?;
                current = choose_child::<K>(leftmost, &recs, key_bytes);
            }
        }
    }
    Ok(path)
}

/// Inserts/overwrites `(key, val)` into leaf `leaf_id`, splitting if the page
/// would overflow. Returns `Some((separator, new_right_leaf))` on split.
fn insert_into_leaf(
    tx: &mut WriteGuard<'_>,
    leaf_id: PageId,
    key_bytes: Vec<u8>,
    val_bytes: Vec<u8>,
) -> Result<Option<(Vec<u8>, PageId)>> {
    let page_size = {
        let bytes = tx.page_mut(leaf_id)?;
        bytes.len()
    };
    let bytes = tx.page_mut(leaf_id)?;
    let header = phys::parse(bytes, leaf_id.0)?;
    let mut records = page::decode_leaf(&phys::payload(bytes)[..header.payload_len as usize])?;
    match records.binary_search_by(|(k, _)| k.as_slice().cmp(key_bytes.as_slice())) {
        Ok(idx) => records[idx].1 = val_bytes,
        Err(idx) => records.insert(idx, (key_bytes, val_bytes)),
    }

    let capacity = page::leaf_capacity(page_size - phys::PAGE_HDR_LEN);
    let encoded = page::encode_leaf(&records);
    if encoded.len() <= capacity {
        let len = encoded.len() as u32;
        let bytes = tx.page_mut(leaf_id)?;
        phys::payload_mut(bytes)[..encoded.len()].copy_from_slice(&encoded);
        phys::finalize(bytes, PageKind::Leaf, len);
        return Ok(None);
    }

    let mid = records.len() / 2;
    let right_records = records.split_off(mid);
    let separator = right_records[0].0.clone();

    let left_payload = page::encode_leaf(&records);
    let left_len = left_payload.len() as u32;
    let left_bytes = tx.page_mut(leaf_id)?;
    phys::payload_mut(left_bytes)[..left_payload.len()].copy_from_slice(&left_payload);
    phys::finalize(left_bytes, PageKind::Leaf, left_len);

    let right_id = tx.allocate_page(PageKind::Leaf)?;
    let right_payload = page::encode_leaf(&right_records);
    let right_len = right_payload.len() as u32;
    let right_bytes = tx.page_mut(right_id)?;
    phys::payload_mut(right_bytes)[..right_payload.len()].copy_from_slice(&right_payload);
    phys::finalize(right_bytes, PageKind::Leaf, right_len);

    Ok(Some((separator, right_id)))
}

/// Inserts `(separator, child)` into internal node `node_id`, splitting if
/// the page would overflow.
fn insert_into_internal(
    tx: &mut WriteGuard<'_>,
    node_id: PageId,
    separator: Vec<u8>,
    child: PageId,
) -> Result<Option<(Vec<u8>, PageId)>> {
    let page_size = {
        let bytes = tx.page_mut(node_id)?;
        bytes.len()
    };
    let bytes = tx.page_mut(node_id)?;
    let header = phys::parse(bytes, node_id.0)?;
    let (leftmost, mut records) =
        page::decode_internal(&phys::payload(bytes)[..header.payload_len as usize])?;
    let idx = records
        .binary_search_by(|(k, _)| k.as_slice().cmp(separator.as_slice()))
        .unwrap_or_else(|i| i);
    records.insert(idx, (separator, child));

    let capacity = page::internal_capacity(page_size - phys::PAGE_HDR_LEN);
    let encoded = page::encode_internal(leftmost, &records);
    if encoded.len() <= capacity {
        let len = encoded.len() as u32;
        let bytes = tx.page_mut(node_id)?;
        phys::payload_mut(bytes)[..encoded.len()].copy_from_slice(&encoded);
        phys::finalize(bytes, PageKind::Internal, len);
        return Ok(None);
    }

    let mid = records.len() / 2;
    let mut right_records = records.split_off(mid);
    let (pushed_sep, pushed_child_left) = right_records.remove(0);
    let right_leftmost = pushed_child_left;

    let left_payload = page::encode_internal(leftmost, &records);
    let left_len = left_payload.len() as u32;
    let left_bytes = tx.page_mut(node_id)?;
    phys::payload_mut(left_bytes)[..left_payload.len()].copy_from_slice(&left_payload);
    phys::finalize(left_bytes, PageKind::Internal, left_len);

    let right_id = tx.allocate_page(PageKind::Internal)?;
    let right_payload = page::encode_internal(right_leftmost, &right_records);
    let right_len = right_payload.len() as u32;
    let right_bytes = tx.page_mut(right_id)?;
    phys::payload_mut(right_bytes)[..right_payload.len()].copy_from_slice(&right_payload);
    phys::finalize(right_bytes, PageKind::Internal, right_len);

    Ok(Some((pushed_sep, right_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::store::FilePageStore;
    use std::cmp::Ordering as Ord2;

    #[derive(Clone, Eq, PartialEq, Debug)]
    struct U32Key(u32);

    impl KeyCodec for U32Key {
        fn encode_key(key: &Self, out: &mut Vec<u8>) {
            out.extend_from_slice(&key.0.to_be_bytes());
        }
        fn decode_key(bytes: &[u8]) -> Result<Self> {
            Ok(U32Key(u32::from_be_bytes(bytes.try_into().unwrap())))
        }
        fn compare_encoded(a: &[u8], b: &[u8]) -> Ord2 {
            a.cmp(b)
        }
    }

    #[derive(Clone, Eq, PartialEq, Debug)]
    struct U32Val(u32);

    impl ValCodec for U32Val {
        fn encode_val(value: &Self, out: &mut Vec<u8>) {
            out.extend_from_slice(&value.0.to_be_bytes());
        }
        fn decode_val(src: &[u8]) -> Result<Self> {
            Ok(U32Val(u32::from_be_bytes(src.try_into().unwrap())))
        }
    }

    #[test]
    fn put_get_delete_and_split() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePageStore::open_or_create(&dir.path().join("t.db"), 256).unwrap();
        let tree: BTree<U32Key, U32Val> = BTree::new(BTreeOptions { page_size: 256 });

        let mut tx = store.begin_write().unwrap();
        for i in 0..200u32 {
            tree.put(&mut tx, &U32Key(i), &U32Val(i * 10)).unwrap();
        }
        store.commit(tx).unwrap();

        let read = store.begin_read().unwrap();
        for i in 0..200u32 {
            let v = tree.get(&store, &read, &U32Key(i)).unwrap();
            assert_eq!(v, Some(U32Val(i * 10)));
        }
        assert_eq!(tree.get(&store, &read, &U32Key(9999)).unwrap(), None);

        let mut tx = store.begin_write().unwrap();
        assert!(tree.delete(&mut tx, &U32Key(50)).unwrap());
        assert!(!tree.delete(&mut tx, &U32Key(50)).unwrap());
        store.commit(tx).unwrap();

        let read2 = store.begin_read().unwrap();
        assert_eq!(tree.get(&store, &read2, &U32Key(50)).unwrap(), None);
        // old snapshot is untouched by the later delete
        assert_eq!(tree.get(&store, &read, &U32Key(50)).unwrap(), Some(U32Val(500)));
    }
}
