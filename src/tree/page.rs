//! Leaf and internal page payload codecs for the generic B+ tree.
//!
//! Leaf payload: `slot_count:u16` then that many `(key_len:u16, key, val_len:u16, val)` records.
//! Internal payload: `slot_count:u16`, `leftmost_child:u64`, then that many
//! `(sep_len:u16, sep, child:u64)` records. `children[0] = leftmost_child` governs keys less
//! than `records[0].0`; `children[i+1]` governs `records[i].0 <= key < records[i+1].0` (or
//! `>= records[last].0` for the final child).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::pager::store::PageId;

/// Bytes usable for slot records once the 2-byte slot count (and, for
/// internal pages, the 8-byte leftmost-child pointer) are accounted for.
pub fn leaf_capacity(page_payload_len: usize) -> usize {
    page_payload_len - 2
}

/// As [`leaf_capacity`], but for internal pages.
pub fn internal_capacity(page_payload_len: usize) -> usize {
    page_payload_len - 2 - 8
}

/// Encoded size of a leaf record.
pub fn leaf_record_len(key: &[u8], val: &[u8]) -> usize {
    2 + key.len() + 2 + val.len()
}

/// Encoded size of an internal record.
pub fn internal_record_len(sep: &[u8]) -> usize {
    2 + sep.len() + 8
}

/// Encodes a full leaf payload from sorted `(key, value)` pairs.
pub fn encode_leaf(records: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u16).to_le_bytes());
    for (key, val) in records {
        out.extend_from_slice(&(key.len() as u16).to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(&(val.len() as u16).to_le_bytes());
        out.extend_from_slice(val);
    }
    out
}

/// Decodes a leaf payload into its `(key, value)` pairs, in stored order.
pub fn decode_leaf(payload: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut pos = 0usize;
    let count = read_u16(payload, &mut pos)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let klen = read_u16(payload, &mut pos)? as usize;
        let key = read_bytes(payload, &mut pos, klen)?;
        let vlen = read_u16(payload, &mut pos)? as usize;
        let val = read_bytes(payload, &mut pos, vlen)?;
        out.push((key, val));
    }
    Ok(out)
}

/// Encodes a full internal payload.
pub fn encode_internal(leftmost: PageId, records: &[(Vec<u8>, PageId)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u16).to_le_bytes());
    out.extend_from_slice(&leftmost.0.to_le_bytes());
    for (sep, child) in records {
        out.extend_from_slice(&(sep.len() as u16).to_le_bytes());
        out.extend_from_slice(sep);
        out.extend_from_slice(&child.0.to_le_bytes());
    }
    out
}

/// Decodes an internal payload into `(leftmost_child, [(separator, child)])`.
pub fn decode_internal(payload: &[u8]) -> Result<(PageId, Vec<(Vec<u8>, PageId)>)> {
    let mut pos = 0usize;
    let count = read_u16(payload, &mut pos)?;
    let leftmost = PageId(read_u64(payload, &mut pos)?);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let slen = read_u16(payload, &mut pos)? as usize;
        let sep = read_bytes(payload, &mut pos, slen)?;
        let child = PageId(read_u64(payload, &mut pos)?);
        out.push((sep, child));
    }
    Ok((leftmost, out))
}

/// Given an internal page's raw bytes (header + payload), rewrites every
/// child pointer that appears as a key in `remap` to its mapped value,
/// in place, without otherwise touching the payload layout.
pub fn rewrite_internal_children(
    bytes: &mut [u8],
    remap: &HashMap<PageId, PageId>,
) -> Result<()> {
    let payload = crate::pager::page::payload_mut(bytes);
    let count = u16::from_le_bytes(payload[0..2].try_into().unwrap()) as usize;
    let leftmost = PageId(u64::from_le_bytes(payload[2..10].try_into().unwrap()));
    if let Some(new_id) = remap.get(&leftmost) {
        payload[2..10].copy_from_slice(&new_id.0.to_le_bytes());
    }
    let mut pos = 10usize;
    for _ in 0..count {
        if pos + 2 > payload.len() {
            return Err(Error::TreeCorrupt("internal page truncated".into()));
        }
        let slen = u16::from_le_bytes(payload[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2 + slen;
        if pos + 8 > payload.len() {
            return Err(Error::TreeCorrupt("internal page truncated".into()));
        }
        let child = PageId(u64::from_le_bytes(payload[pos..pos + 8].try_into().unwrap()));
        if let Some(new_id) = remap.get(&child) {
            payload[pos..pos + 8].copy_from_slice(&new_id.0.to_le_bytes());
        }
        pos += 8;
    }
    Ok(())
}

fn read_u16(buf: &[u8], pos: &mut usize) -> Result<u16> {
    if *pos + 2 > buf.len() {
        return Err(Error::TreeCorrupt("truncated page record".into()));
    }
    let v = u16::from_le_bytes(buf[*pos..*pos + 2].try_into().unwrap());
    *pos += 2;
    Ok(v)
}

fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    if *pos + 8 > buf.len() {
        return Err(Error::TreeCorrupt("truncated page record".into()));
    }
    let v = u64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    Ok(v)
}

fn read_bytes(buf: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>> {
    if *pos + len > buf.len() {
        return Err(Error::TreeCorrupt("truncated page record".into()));
    }
    let v = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_round_trip() {
        let records = vec![
            (vec![1, 2, 3], vec![9]),
            (vec![4, 5, 6], vec![8, 7]),
        ];
        let payload = encode_leaf(&records);
        let back = decode_leaf(&payload).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn internal_round_trip_and_remap() {
        let records = vec![(vec![5u8], PageId(20)), (vec![10u8], PageId(30))];
        let mut payload = encode_internal(PageId(10), &records);
        let mut bytes = vec![0u8; 16 + payload.len()];
        bytes[16..].copy_from_slice(&payload);
        let mut remap = HashMap::new();
        remap.insert(PageId(10), PageId(100));
        remap.insert(PageId(30), PageId(300));
        // simulate full-page framing for rewrite_internal_children
        crate::pager::page::finalize(&mut bytes, crate::pager::page::PageKind::Internal, payload.len() as u32);
        rewrite_internal_children(&mut bytes, &remap).unwrap();
        let (leftmost, recs) = decode_internal(crate::pager::page::payload(&bytes)).unwrap();
        assert_eq!(leftmost, PageId(100));
        assert_eq!(recs[0].1, PageId(20));
        assert_eq!(recs[1].1, PageId(300));
        payload.clear();
    }
}
