//! Fixed-width encoding for label-scan tree keys and bitset values.

use crate::error::{Error, Result};
use crate::model::{LabelId, RangeId, RangeWidth};
use crate::tree::{KeyCodec, ValCodec};
use std::cmp::Ordering;

/// Identifies this crate's on-disk key/value layout. Embedded in the tree's
/// metadata; a mismatch on open is fatal (`Error::LayoutMismatch`).
pub const LAYOUT_ID: u32 = 1;

const KEY_LEN: usize = 12;

/// The `(labelId, rangeId)` key, in the total order label-major/range-minor.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct Key {
    /// The label half of the key.
    pub label: LabelId,
    /// The range half of the key.
    pub range: RangeId,
}

impl Key {
    /// Build a key from its parts.
    pub fn new(label: LabelId, range: RangeId) -> Self {
        Self { label, range }
    }

    /// The sentinel key greater than any real entry: `(MAX_INT, MAX_LONG)`.
    pub fn sentinel_max() -> Self {
        Self::new(LabelId::SENTINEL, RangeId(i64::MAX))
    }

    /// Encode as 4 big-endian bytes (label) followed by 8 big-endian bytes (range).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.label.0.to_be_bytes());
        out.extend_from_slice(&self.range.0.to_be_bytes());
    }

    /// Decode from a 12-byte slice.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(Error::TreeCorrupt(format!(
                "label-scan key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let label = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let range = i64::from_be_bytes(bytes[4..12].try_into().unwrap());
        Ok(Self::new(LabelId(label), RangeId(range)))
    }

    /// Compare two already-encoded keys without decoding them; big-endian byte
    /// order on this layout is exactly the key's total order.
    pub fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// The `W`-bit membership vector for one `(label, range)` entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Bitset {
    bits: u64,
    width: RangeWidth,
}

impl Bitset {
    /// An all-zero bitset of the given width.
    pub fn empty(width: RangeWidth) -> Self {
        Self { bits: 0, width }
    }

    /// Wrap a raw bit pattern, masked to the store's configured width.
    pub fn from_raw(bits: u64, width: RangeWidth) -> Self {
        let masked = if width.bits() == 64 {
            bits
        } else {
            bits & ((1u64 << width.bits()) - 1)
        };
        Self {
            bits: masked,
            width,
        }
    }

    /// The width this bitset was created with.
    pub fn width(&self) -> RangeWidth {
        self.width
    }

    /// Raw bit pattern.
    pub fn raw(&self) -> u64 {
        self.bits
    }

    /// True when no bit is set — per the store's invariant, such entries must
    /// not be persisted and should instead be removed from the tree.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Set the given bit offset.
    pub fn set(&mut self, offset: u32) {
        self.bits |= 1u64 << offset;
    }

    /// Clear the given bit offset.
    pub fn clear(&mut self, offset: u32) {
        self.bits &= !(1u64 << offset);
    }

    /// True when the given bit offset is set.
    pub fn get(&self, offset: u32) -> bool {
        (self.bits >> offset) & 1 == 1
    }

    /// Merge in `add` bits then clear `remove` bits: `(self | add) & !remove`.
    pub fn merged(&self, add: Bitset, remove: Bitset) -> Bitset {
        Bitset::from_raw((self.bits | add.bits) & !remove.bits, self.width)
    }

    /// Iterate the set bit offsets in ascending order.
    pub fn set_offsets(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.width.bits() as u32).filter(move |&i| self.get(i))
    }

    /// Encode as `width.byte_len()` big-endian bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let len = self.width.byte_len();
        out.extend_from_slice(&self.bits.to_be_bytes()[8 - len..]);
    }

    /// Decode from a byte slice whose length matches `width.byte_len()`.
    pub fn decode(bytes: &[u8], width: RangeWidth) -> Result<Self> {
        if bytes.len() != width.byte_len() {
            return Err(Error::TreeCorrupt(format!(
                "bitset value must be {} bytes, got {}",
                width.byte_len(),
                bytes.len()
            )));
        }
        let mut buf = [0u8; 8];
        buf[8 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self::from_raw(u64::from_be_bytes(buf), width))
    }
}

impl KeyCodec for Key {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        key.encode(out);
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        Key::decode(bytes)
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
        Key::compare_encoded(a, b)
    }
}

impl ValCodec for Bitset {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        value.encode(out);
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        let width = RangeWidth::from_byte_len(src.len()).ok_or_else(|| {
            Error::TreeCorrupt(format!("bitset value has unrecognized width: {} bytes", src.len()))
        })?;
        Bitset::decode(src, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trip_and_order() {
        let a = Key::new(LabelId(3), RangeId(5));
        let b = Key::new(LabelId(3), RangeId(6));
        let c = Key::new(LabelId(4), RangeId(0));
        let mut ea = Vec::new();
        let mut eb = Vec::new();
        let mut ec = Vec::new();
        a.encode(&mut ea);
        b.encode(&mut eb);
        c.encode(&mut ec);
        assert_eq!(Key::decode(&ea).unwrap(), a);
        assert_eq!(Key::compare_encoded(&ea, &eb), Ordering::Less);
        assert_eq!(Key::compare_encoded(&eb, &ec), Ordering::Less);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn sentinel_is_greatest() {
        let sentinel = Key::sentinel_max();
        let ordinary = Key::new(LabelId(1_000_000), RangeId(1_000_000_000));
        assert!(ordinary < sentinel);
    }

    #[test]
    fn bitset_set_clear_and_merge() {
        let mut bs = Bitset::empty(RangeWidth::W8);
        bs.set(0);
        bs.set(7);
        assert!(bs.get(0) && bs.get(7) && !bs.get(3));
        assert_eq!(bs.set_offsets().collect::<Vec<_>>(), vec![0, 7]);

        let add = {
            let mut b = Bitset::empty(RangeWidth::W8);
            b.set(3);
            b
        };
        let remove = {
            let mut b = Bitset::empty(RangeWidth::W8);
            b.set(7);
            b
        };
        let merged = bs.merged(add, remove);
        assert_eq!(merged.set_offsets().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn bitset_byte_round_trip_all_widths() {
        for width in [
            RangeWidth::W8,
            RangeWidth::W16,
            RangeWidth::W32,
            RangeWidth::W64,
        ] {
            let mut bs = Bitset::empty(width);
            bs.set(0);
            bs.set(width.bits() as u32 - 1);
            let mut buf = Vec::new();
            bs.encode(&mut buf);
            assert_eq!(buf.len(), width.byte_len());
            let back = Bitset::decode(&buf, width).unwrap();
            assert_eq!(back, bs);
        }
    }
}
