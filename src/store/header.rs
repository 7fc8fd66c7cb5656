//! Encodes the one-byte clean/dirty flag plus the monotonic highest-label
//! counter into the tree's opaque user-header blob.

use crate::error::Result;

/// The store's tree has fully reconstructible content.
pub const STATE_CLEAN: u8 = 0x00;
/// The store's tree may lag behind applied updates; a rebuild is required
/// before it can be trusted as the sole source of truth.
pub const STATE_NEEDS_REBUILD: u8 = 0x01;

/// Decoded form of the tree's user-header blob: `[stateByte, maxLabelId:u32 BE]`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct HeaderCodec {
    /// `STATE_CLEAN` or `STATE_NEEDS_REBUILD`.
    pub state: u8,
    /// Highest `labelId` ever written, used to bound all-ranges iteration.
    pub max_label_id: u32,
}

impl HeaderCodec {
    /// Decodes a header blob. An empty or undersized blob (a brand new store)
    /// decodes as `NEEDS_REBUILD` with no labels seen yet.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 5 {
            return Ok(Self {
                state: STATE_NEEDS_REBUILD,
                max_label_id: 0,
            });
        }
        let state = bytes[0];
        let max_label_id = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
        Ok(Self { state, max_label_id })
    }

    /// Encodes this header to its 5-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        out.push(self.state);
        out.extend_from_slice(&self.max_label_id.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_defaults_to_needs_rebuild() {
        let h = HeaderCodec::decode(&[]).unwrap();
        assert_eq!(h.state, STATE_NEEDS_REBUILD);
        assert_eq!(h.max_label_id, 0);
    }

    #[test]
    fn round_trip() {
        let h = HeaderCodec {
            state: STATE_CLEAN,
            max_label_id: 42,
        };
        let back = HeaderCodec::decode(&h.encode()).unwrap();
        assert_eq!(back, h);
    }
}
