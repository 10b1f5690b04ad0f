//! Typed addressing for the disaggregated memory space.
//!
//! The simulated physical address space is partitioned into fixed-size
//! slabs, one per memory node. Memory node `m` owns
//! `[base + m * slab_size, base + (m + 1) * slab_size)`.
//!
//! Within each slab, offset 0 of slab 0 is the reserved root slot; all
//! other nodes come from a uniform pool starting at [`NODE_POOL_OFFSET`].
//! A node id places its node on server `id % M` at pool slot `id / M`, so
//! two distinct ids can never collide, and no id can collide with the
//! root slot.

use serde::{Deserialize, Serialize};

use crate::error::{OxbowError, Result};

/// Start of the per-slab node pool. Nothing below this offset is handed
/// out by the allocator except the root slot at offset 0 of slab 0.
pub const NODE_POOL_OFFSET: u64 = 0x10000;

/// Address of a tree node in the global memory space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct NodeAddress(pub u64);

impl NodeAddress {
    /// The all-zero address, used for dead child slots on the wire.
    pub const NULL: NodeAddress = NodeAddress(0);

    /// Returns true if this is the null address.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Index of a memory node (one slab owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryNodeIndex(pub u32);

impl std::fmt::Display for MemoryNodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocation and routing over the slab-partitioned address space.
///
/// All address arithmetic in the simulator goes through this map; neither
/// compute nodes nor memory nodes hard-code slab layout.
#[derive(Debug, Clone)]
pub struct AddressMap {
    base: u64,
    slab_size: u64,
    num_memory_nodes: u32,
    node_size: u64,
}

impl AddressMap {
    /// Creates an address map for `num_memory_nodes` slabs of `slab_size`
    /// bytes starting at `base`, holding nodes of `node_size` bytes.
    pub fn new(base: u64, slab_size: u64, num_memory_nodes: u32, node_size: u64) -> Self {
        Self {
            base,
            slab_size,
            num_memory_nodes,
            node_size,
        }
    }

    /// The fixed root slot: offset 0 of slab 0.
    pub fn root_address(&self) -> NodeAddress {
        NodeAddress(self.base)
    }

    /// Allocates the address for node `node_id`.
    ///
    /// Placement server is `node_id % M`; the offset within the slab is a
    /// dense pool slot, so distinct ids never collide.
    pub fn node_address(&self, node_id: u64) -> Result<NodeAddress> {
        let server = node_id % self.num_memory_nodes as u64;
        let slot = node_id / self.num_memory_nodes as u64;
        let offset = NODE_POOL_OFFSET + slot * self.node_size;

        if offset + self.node_size > self.slab_size {
            return Err(OxbowError::SlabExhausted {
                memory_node: server as u32,
                node_id,
            });
        }

        Ok(NodeAddress(self.base + server * self.slab_size + offset))
    }

    /// Resolves the memory node owning `addr`.
    pub fn route(&self, addr: NodeAddress) -> Result<MemoryNodeIndex> {
        if addr.0 < self.base {
            return Err(OxbowError::AddressOutOfRange { address: addr.0 });
        }
        let index = (addr.0 - self.base) / self.slab_size;
        if index >= self.num_memory_nodes as u64 {
            return Err(OxbowError::AddressOutOfRange { address: addr.0 });
        }
        Ok(MemoryNodeIndex(index as u32))
    }

    /// The half-open byte range owned by memory node `m`.
    pub fn slab_range(&self, m: MemoryNodeIndex) -> std::ops::Range<u64> {
        let start = self.base + m.0 as u64 * self.slab_size;
        start..start + self.slab_size
    }

    /// Number of memory nodes in the map.
    pub fn num_memory_nodes(&self) -> u32 {
        self.num_memory_nodes
    }

    /// Serialized footprint of one node.
    pub fn node_size(&self) -> u64 {
        self.node_size
    }
}
