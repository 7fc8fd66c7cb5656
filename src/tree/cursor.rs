use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::error::Result;
use crate::pager::page::{self as phys, PageKind};
use crate::pager::store::{FilePageStore, PageId, ReadGuard};

use super::page;
use super::{choose_child, KeyCodec, ValCodec};

struct Frame {
    children: Vec<PageId>,
    idx: usize,
}

/// An ascending iterator over `[lo, hi)`, built by descending the tree once
/// and then walking leaf-to-leaf via the retained ancestor stack (this tree
/// keeps no leaf sibling pointers, so the stack is how iteration moves right).
pub struct Cursor<'a, K, V> {
    store: &'a FilePageStore,
    tx: &'a ReadGuard,
    hi: Option<Vec<u8>>,
    stack: Vec<Frame>,
    leaf: Vec<(Vec<u8>, Vec<u8>)>,
    leaf_idx: usize,
    done: bool,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: KeyCodec, V: ValCodec> Cursor<'a, K, V> {
    pub(crate) fn new(
        store: &'a FilePageStore,
        tx: &'a ReadGuard,
        lo: Option<K>,
        hi: Option<K>,
    ) -> Result<Self> {
        let mut lo_bytes = None;
        if let Some(lo) = &lo {
            let mut buf = Vec::new();
            K::encode_key(lo, &mut buf);
            lo_bytes = Some(buf);
        }
        let mut hi_bytes = None;
        if let Some(hi) = &hi {
            let mut buf = Vec::new();
            K::encode_key(hi, &mut buf);
            hi_bytes = Some(buf);
        }

        let Some(root) = tx.root() else {
            return Ok(Self {
                store,
                tx,
                hi: hi_bytes,
                stack: Vec::new(),
                leaf: Vec::new(),
                leaf_idx: 0,
                done: true,
                _marker: PhantomData,
            });
        };

        let (stack, leaf) = descend::<K>(store, tx, root, lo_bytes.as_deref())?;
        let leaf_idx = match &lo_bytes {
            Some(target) => leaf
                .binary_search_by(|(k, _)| K::compare_encoded(k, target))
                .unwrap_or_else(|i| i),
            None => 0,
        };

        Ok(Self {
            store,
            tx,
            hi: hi_bytes,
            stack,
            leaf,
            leaf_idx,
            done: false,
            _marker: PhantomData,
        })
    }

    /// Advances the cursor, returning the next `(key, value)` pair if any.
    pub fn next(&mut self) -> Result<Option<(K, V)>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if self.leaf_idx >= self.leaf.len() {
                match advance::<K>(&mut self.stack, self.store, self.tx)? {
                    Some(records) => {
                        self.leaf = records;
                        self.leaf_idx = 0;
                        continue;
                    }
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            }
            let (key_bytes, val_bytes) = &self.leaf[self.leaf_idx];
            if let Some(hi) = &self.hi {
                if K::compare_encoded(key_bytes, hi) != Ordering::Less {
                    self.done = true;
                    return Ok(None);
                }
            }
            let key = K::decode_key(key_bytes)?;
            let val = V::decode_val(val_bytes)?;
            self.leaf_idx += 1;
            return Ok(Some((key, val)));
        }
    }
}

fn load_internal_children(payload: &[u8]) -> Result<Vec<PageId>> {
    let (leftmost, recs) = page::decode_internal(payload)?;
    let mut children = Vec::with_capacity(recs.len() + 1);
    children.push(leftmost);
    for (_, c) in recs {
        children.push(c);
    }
    Ok(children)
}

fn descend<K: KeyCodec>(
    store: &FilePageStore,
    tx: &ReadGuard,
    root: PageId,
    target: Option<&[u8]>,
) -> Result<(Vec<Frame>, Vec<(Vec<u8>, Vec<u8>)>)> {
    let mut stack = Vec::new();
    let mut current = root;
    loop {
        let bytes = store.get_page(tx, current)?;
        let header = phys::parse(&bytes, current.0)?;
        let payload = &phys::payload(&bytes)[..header.payload_len as usize];
        match header.kind {
            PageKind::Leaf => return Ok((stack, page::decode_leaf(payload)?)),
            PageKind::Internal => {
                let (leftmost, recs) = page::decode_internal(payload)?;
                let child = match target {
                    Some(t) => choose_child::<K>(leftmost, &recs, t),
                    None => leftmost,
                };
                let mut children = Vec::with_capacity(recs.len() + 1);
                children.push(leftmost);
                for (_, c) in recs {
                    children.push(c);
                }
                let idx = children.iter().position(|c| *c == child).unwrap_or(0);
                stack.push(Frame { children, idx });
                current = child;
            }
        }
    }
}

fn advance<K: KeyCodec>(
    stack: &mut Vec<Frame>,
    store: &FilePageStore,
    tx: &ReadGuard,
) -> Result<Option<Vec<(Vec<u8>, Vec<u8>)>>> {
    loop {
        let Some(frame) = stack.last_mut() else {
            return Ok(None);
        };
        if frame.idx + 1 < frame.children.len() {
            frame.idx += 1;
            let mut current = frame.children[frame.idx];
            loop {
                let bytes = store.get_page(tx, current)?;
                let header = phys::parse(&bytes, current.0)?;
                let payload = &phys::payload(&bytes)[..header.payload_len as usize];
                match header.kind {
                    PageKind::Leaf => return Ok(Some(page::decode_leaf(payload)?)),
                    PageKind::Internal => {
                        let children = load_internal_children(payload)?;
                        let first = children[0];
                        stack.push(Frame { children, idx: 0 });
                        current = first;
                    }
                }
            }
        } else {
            stack.pop();
        }
    }
}
