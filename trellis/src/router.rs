//! Key-range routing.
//!
//! A router decides which cluster node owns the work for a given processor
//! and key. The engine consults it on every cache miss; only when the
//! owning node differs from the local one does a remote fetch happen.
use crate::cluster::NodeId;

/// Strategy mapping `(key, processor id)` to an owning node.
pub trait Router: Send + Sync {
    /// Target node for a single key.
    fn route(&self, key: u64, proc_id: u32) -> NodeId;

    /// Target node for a contiguous slice. The engine only issues slices
    /// that are block-aligned and at most one block long, so routing by
    /// the start key covers the whole range.
    fn route_slice(&self, start: u64, _end: u64, proc_id: u32) -> NodeId {
        self.route(start, proc_id)
    }
}

/// Routes everything to node 0. Used when no cluster is configured.
pub struct SingleNode;

impl Router for SingleNode {
    fn route(&self, _key: u64, _proc_id: u32) -> NodeId {
        0
    }
}

/// Partitions the key space into fixed-size blocks; block `b` is owned by
/// node `b mod N`.
pub struct BlockRouter {
    num_nodes: u32,
    block_size: u64,
}

impl BlockRouter {
    /// Routing granularity when constructed standalone. Apps wire the
    /// router with their configured block size so that fetch blocks and
    /// ownership blocks coincide.
    pub const DEFAULT_BLOCK_SIZE: u64 = 200;

    pub fn new(num_nodes: u32, block_size: u64) -> Self {
        Self {
            num_nodes: num_nodes.max(1),
            block_size: block_size.max(1),
        }
    }
}

impl Router for BlockRouter {
    fn route(&self, key: u64, _proc_id: u32) -> NodeId {
        let block = key / self.block_size;
        (block % u64::from(self.num_nodes)) as NodeId
    }
}

/// Start of the block containing `key`.
pub(crate) fn block_start(key: u64, size: u64) -> u64 {
    (key / size) * size
}

/// Index of `key` within its block.
pub(crate) fn block_index(key: u64, size: u64) -> usize {
    (key % size) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_always_routes_to_zero() {
        let router = SingleNode;
        for key in [0, 1, 199, 1 << 40] {
            assert_eq!(router.route(key, 3), 0);
        }
    }

    #[test]
    fn block_partition_is_constant_within_a_block() {
        let router = BlockRouter::new(3, 8);
        for block in 0..12u64 {
            let owners: Vec<NodeId> = (block * 8..(block + 1) * 8)
                .map(|k| router.route(k, 0))
                .collect();
            assert!(owners.iter().all(|&n| n == owners[0]));
            assert_eq!(owners[0], (block % 3) as NodeId);
        }
    }

    #[test]
    fn slice_routes_to_owner_of_start() {
        let router = BlockRouter::new(2, 4);
        assert_eq!(router.route_slice(4, 8, 0), router.route(4, 0));
        assert_eq!(router.route_slice(8, 12, 0), 0);
        assert_eq!(router.route_slice(12, 16, 0), 1);
    }

    #[test]
    fn block_arithmetic() {
        assert_eq!(block_start(0, 10), 0);
        assert_eq!(block_start(9, 10), 0);
        assert_eq!(block_start(10, 10), 10);
        assert_eq!(block_start(25, 10), 20);
        assert_eq!(block_index(25, 10), 5);
        assert_eq!(block_index(30, 10), 0);
        // Every aligned range is exactly one block long.
        for key in 0..100u64 {
            let start = block_start(key, 7);
            assert_eq!(start % 7, 0);
            assert!(key - start < 7);
            assert_eq!(block_index(key, 7), (key - start) as usize);
        }
    }
}
