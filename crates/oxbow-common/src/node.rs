//! B+tree node model and its fixed-footprint wire format.
//!
//! Every node serializes to the same number of bytes regardless of how
//! full it is, so read sizes are computed from the fanout alone and a
//! slab never fragments. The cost is slack: dead slots are written as
//! zeros.
//!
//! Layout (little-endian):
//! ```text
//! +---------------------------+ 0
//! | num_keys: u32             |
//! | fanout: u32               |
//! | is_leaf: u8 + 7 pad bytes |
//! | node_address: u64         |
//! +---------------------------+ 24 (NODE_HEADER_SIZE)
//! | keys:     F x u64         |  all F slots written
//! | values:   F x u64         |  zero for internal nodes
//! | children: (F+1) x u64     |  zero for leaves
//! +---------------------------+ serialized_size(F)
//! ```
//!
//! The wire size is never derived from the in-memory representation;
//! [`serialized_size`] is the single source of truth for both sides of
//! the channel.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::addr::NodeAddress;
use crate::error::{OxbowError, Result};
use crate::types::{Key, Value};

/// Size of the fixed node header in bytes.
pub const NODE_HEADER_SIZE: usize = 24;

/// Serialized footprint of a node with the given fanout.
pub fn serialized_size(fanout: u32) -> usize {
    NODE_HEADER_SIZE + (3 * fanout as usize + 1) * 8
}

/// A B+tree node held in per-operation scratch memory on a compute node.
///
/// Only live entries are stored: a leaf holds `num_keys` key/value pairs,
/// an internal node holds `num_keys` keys and `num_keys + 1` children.
/// Dead slots exist only on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Capacity of this node; identical for all nodes of one simulation.
    pub fanout: u32,
    /// The node's own address (self-locator).
    pub addr: NodeAddress,
    /// Leaf or internal payload.
    pub body: NodeBody,
}

/// Payload of a node, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody {
    Leaf {
        keys: Vec<Key>,
        values: Vec<Value>,
    },
    Internal {
        keys: Vec<Key>,
        children: Vec<NodeAddress>,
    },
}

impl Node {
    /// Creates an empty leaf.
    pub fn new_leaf(fanout: u32, addr: NodeAddress) -> Self {
        Self {
            fanout,
            addr,
            body: NodeBody::Leaf {
                keys: Vec::new(),
                values: Vec::new(),
            },
        }
    }

    /// Creates a leaf holding the given pairs (must be sorted by key).
    pub fn leaf_from_pairs(fanout: u32, addr: NodeAddress, pairs: Vec<(Key, Value)>) -> Self {
        let (keys, values): (Vec<Key>, Vec<Value>) = pairs.into_iter().unzip();
        Self {
            fanout,
            addr,
            body: NodeBody::Leaf { keys, values },
        }
    }

    /// Creates an internal node. `children.len()` must be `keys.len() + 1`.
    pub fn new_internal(
        fanout: u32,
        addr: NodeAddress,
        keys: Vec<Key>,
        children: Vec<NodeAddress>,
    ) -> Self {
        debug_assert_eq!(children.len(), keys.len() + 1);
        Self {
            fanout,
            addr,
            body: NodeBody::Internal { keys, children },
        }
    }

    /// Returns true for leaf nodes.
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf { .. })
    }

    /// Number of live keys.
    pub fn num_keys(&self) -> usize {
        self.keys().len()
    }

    /// The live keys, sorted ascending.
    pub fn keys(&self) -> &[Key] {
        match &self.body {
            NodeBody::Leaf { keys, .. } => keys,
            NodeBody::Internal { keys, .. } => keys,
        }
    }

    /// Returns true once the node holds `fanout` keys.
    pub fn is_full(&self) -> bool {
        self.num_keys() >= self.fanout as usize
    }

    /// A blank node is what deserializing all-zero bytes produces: an
    /// allocated-but-never-written slot. It must not be interpreted as a
    /// valid tree node.
    pub fn is_blank(&self) -> bool {
        self.fanout == 0
    }

    /// Child index to follow for `key` in an internal node: the first `i`
    /// with `key < keys[i]`, or `num_keys` if there is none. An empty
    /// node routes to child 0 unconditionally.
    pub fn child_index_for(&self, key: Key) -> usize {
        match self.keys().binary_search(&key) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Child pointer at `index` of an internal node.
    pub fn child_at(&self, index: usize) -> NodeAddress {
        match &self.body {
            NodeBody::Internal { children, .. } => children[index],
            NodeBody::Leaf { .. } => NodeAddress::NULL,
        }
    }

    /// Serializes this node to exactly `serialized_size(self.fanout)` bytes.
    pub fn serialize(&self) -> Bytes {
        let fanout = self.fanout as usize;
        let mut buf = BytesMut::with_capacity(serialized_size(self.fanout));

        buf.put_u32_le(self.num_keys() as u32);
        buf.put_u32_le(self.fanout);
        buf.put_u8(self.is_leaf() as u8);
        buf.put_bytes(0, 7);
        buf.put_u64_le(self.addr.0);

        match &self.body {
            NodeBody::Leaf { keys, values } => {
                put_slots(&mut buf, keys, fanout);
                put_slots(&mut buf, values, fanout);
                buf.put_bytes(0, (fanout + 1) * 8);
            }
            NodeBody::Internal { keys, children } => {
                put_slots(&mut buf, keys, fanout);
                buf.put_bytes(0, fanout * 8);
                let child_words: Vec<u64> = children.iter().map(|c| c.0).collect();
                put_slots(&mut buf, &child_words, fanout + 1);
            }
        }

        buf.freeze()
    }

    /// Deserializes a node from a buffer produced for fanout `fanout`.
    ///
    /// The slot regions are walked using `fanout`, never the size of the
    /// in-memory representation. A buffer shorter than the full footprint
    /// is rejected as malformed; the caller decides how to degrade.
    pub fn deserialize(buf: &[u8], fanout: u32) -> Result<Self> {
        let expected = serialized_size(fanout);
        if buf.len() < expected {
            return Err(OxbowError::MalformedPayload {
                expected,
                actual: buf.len(),
            });
        }

        let mut data = buf;
        let num_keys = data.get_u32_le() as usize;
        let stored_fanout = data.get_u32_le();
        let is_leaf = data.get_u8() != 0;
        data.advance(7);
        let addr = NodeAddress(data.get_u64_le());

        if num_keys > fanout as usize {
            return Err(OxbowError::MalformedPayload {
                expected,
                actual: buf.len(),
            });
        }

        let slots = fanout as usize;
        let keys = get_slots(&mut data, slots, num_keys);
        let values = get_slots(&mut data, slots, num_keys);
        let children = get_slots(&mut data, slots + 1, if is_leaf { 0 } else { num_keys + 1 });

        let body = if is_leaf {
            NodeBody::Leaf { keys, values }
        } else {
            NodeBody::Internal {
                keys,
                children: children.into_iter().map(NodeAddress).collect(),
            }
        };

        Ok(Self {
            fanout: stored_fanout,
            addr,
            body,
        })
    }
}

/// Writes `count` u64 slots: the live prefix followed by zero fill.
fn put_slots(buf: &mut BytesMut, live: &[u64], count: usize) {
    for word in live {
        buf.put_u64_le(*word);
    }
    buf.put_bytes(0, (count - live.len()) * 8);
}

/// Reads `count` u64 slots, keeping the first `live` of them.
fn get_slots(data: &mut &[u8], count: usize, live: usize) -> Vec<u64> {
    let mut out = Vec::with_capacity(live);
    for i in 0..count {
        let word = data.get_u64_le();
        if i < live {
            out.push(word);
        }
    }
    out
}
