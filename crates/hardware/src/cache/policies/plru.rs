//! Pseudo-LRU (PLRU) Replacement Policy.
//!
//! PLRU approximates the Least Recently Used algorithm using a binary tree of bits.
//! It requires `W - 1` bits per set for `W` ways, packed into one `u64`.
//!
//! Nodes are numbered heap-style: the root is node 1 and the children of node `n` are
//! `2n` and `2n + 1`. The bit at position `n` points toward the subtree holding the next
//! victim. The leaves `W..2W` stand for ways `0..W`.
//!
//! # Performance
//!
//! - **Time Complexity:** `update()` and `get_victim()` are O(log W)
//! - **Space Complexity:** one `u64` per set
//! - **Associativity:** any power of two up to 64

use super::ReplacementPolicy;
use crate::config::ConfigError;

/// PLRU Policy state.
#[derive(Clone, Debug)]
pub struct PlruPolicy {
    /// Tree bits for each set.
    tree: Vec<u64>,
    /// Number of ways in the cache.
    ways: usize,
    /// Tree depth, `log2(ways)`.
    levels: u32,
}

impl PlruPolicy {
    /// Creates a new PLRU policy instance.
    ///
    /// # Arguments
    ///
    /// * `sets` - The number of sets in the cache.
    /// * `ways` - The associativity (number of ways) of the cache.
    ///
    /// # Errors
    ///
    /// `ConfigError::Associativity` unless `ways` is a power of two no larger than 64.
    pub fn new(sets: usize, ways: usize) -> Result<Self, ConfigError> {
        if !ways.is_power_of_two() || ways > u64::BITS as usize {
            return Err(ConfigError::Associativity(ways));
        }
        Ok(Self {
            tree: vec![0; sets],
            ways,
            levels: ways.trailing_zeros(),
        })
    }

    /// Clears the tree of every set.
    pub fn reset(&mut self) {
        self.tree.fill(0);
    }
}

impl ReplacementPolicy for PlruPolicy {
    fn ways(&self) -> usize {
        self.ways
    }

    /// Points every node on the path to `way` away from it.
    fn update(&mut self, set: usize, way: usize) {
        let bits = &mut self.tree[set];
        let mut node = 1usize;
        for level in (0..self.levels).rev() {
            let branch = (way >> level) & 1;
            if branch == 0 {
                *bits |= 1u64 << node;
            } else {
                *bits &= !(1u64 << node);
            }
            node = 2 * node + branch;
        }
    }

    /// Follows the tree bits from the root down to a leaf.
    fn get_victim(&mut self, set: usize) -> usize {
        let bits = self.tree[set];
        let mut node = 1usize;
        for _ in 0..self.levels {
            node = 2 * node + ((bits >> node) & 1) as usize;
        }
        node - self.ways
    }
}
