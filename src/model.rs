use std::collections::BTreeSet;
use std::fmt;

/// A dense 64-bit node identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub u64);

/// A 32-bit label identifier. `LabelId::SENTINEL` never appears in a stored
/// entry; it only ever shows up as the label half of the highest-key sentinel.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LabelId(pub u32);

impl LabelId {
    /// Reserved sentinel used to seek past every real label.
    pub const SENTINEL: LabelId = LabelId(u32::MAX);
}

/// A contiguous span of `W` node ids, `rangeId = nodeId / W`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RangeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of bits per stored bitset value, fixed per store at creation.
#[derive(Copy, Clone, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub enum RangeWidth {
    /// 8 nodes per range, 1 byte per value.
    W8 = 8,
    /// 16 nodes per range, 2 bytes per value.
    W16 = 16,
    /// 32 nodes per range, 4 bytes per value.
    W32 = 32,
    /// 64 nodes per range, 8 bytes per value.
    W64 = 64,
}

impl RangeWidth {
    /// The `W` used in range/bit-offset arithmetic.
    pub fn bits(self) -> u64 {
        self as u64
    }

    /// Bytes needed to store one bitset value of this width.
    pub fn byte_len(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Decompose a node id into its `(rangeId, bitOffset)` pair.
    pub fn locate(self, node: NodeId) -> (RangeId, u32) {
        let w = self.bits();
        let range = (node.0 / w) as i64;
        let offset = (node.0 % w) as u32;
        (RangeId(range), offset)
    }

    /// Reassemble a node id from a range and bit offset.
    pub fn compose(self, range: RangeId, offset: u32) -> NodeId {
        NodeId(range.0 as u64 * self.bits() + offset as u64)
    }

    /// Construct from a raw integer, rejecting anything not in `{8,16,32,64}`.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            8 => Some(Self::W8),
            16 => Some(Self::W16),
            32 => Some(Self::W32),
            64 => Some(Self::W64),
            _ => None,
        }
    }

    /// Recovers the width from an encoded bitset's byte length.
    pub fn from_byte_len(len: usize) -> Option<Self> {
        match len {
            1 => Some(Self::W8),
            2 => Some(Self::W16),
            4 => Some(Self::W32),
            8 => Some(Self::W64),
            _ => None,
        }
    }
}

/// A single node's label delta, as produced by the surrounding graph engine.
#[derive(Clone, Debug)]
pub struct NodeLabelUpdate {
    /// The node whose labels changed.
    pub node_id: NodeId,
    /// Labels the node carried before this update.
    pub before: BTreeSet<LabelId>,
    /// Labels the node carries after this update.
    pub after: BTreeSet<LabelId>,
}

impl NodeLabelUpdate {
    /// Build an update from explicit before/after label sets.
    pub fn new(
        node_id: NodeId,
        before: impl IntoIterator<Item = LabelId>,
        after: impl IntoIterator<Item = LabelId>,
    ) -> Self {
        Self {
            node_id,
            before: before.into_iter().collect(),
            after: after.into_iter().collect(),
        }
    }

    /// Labels present in `after` but not `before`.
    pub fn added(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.after.difference(&self.before).copied()
    }

    /// Labels present in `before` but not `after`.
    pub fn removed(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.before.difference(&self.after).copied()
    }
}
