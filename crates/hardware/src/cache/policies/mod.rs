//! Cache Replacement Policies.
//!
//! Victim selection for the set-associative caches of the hierarchy. Every level uses the
//! same rule: an invalid way is always taken first, and the policy is only consulted when
//! the whole set is valid.
//!
//! # Policies
//!
//! - `Plru`: Pseudo-LRU over a bit-tree sized by the associativity.

/// Pseudo-LRU (tree-based) replacement policy.
pub mod plru;

pub use plru::PlruPolicy;

/// Trait for cache replacement policies.
///
/// Defines the interface for updating usage state and selecting victim lines.
pub trait ReplacementPolicy: Send + Sync {
    /// Number of ways per set.
    fn ways(&self) -> usize;

    /// Updates the policy state when a line is accessed.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `way` - The way index within the set that was accessed.
    fn update(&mut self, set: usize, way: usize);

    /// Selects a victim line to evict from a specific set, ignoring validity.
    ///
    /// # Returns
    ///
    /// The index of the way to evict.
    fn get_victim(&mut self, set: usize) -> usize;

    /// Selects a victim, preferring the lowest invalid way.
    ///
    /// # Arguments
    ///
    /// * `set` - The cache set index.
    /// * `valid_ways` - Bit `w` is set if way `w` holds a valid line.
    fn select_victim(&mut self, set: usize, valid_ways: u64) -> usize {
        let free = (!valid_ways).trailing_zeros() as usize;
        if free < self.ways() {
            free
        } else {
            self.get_victim(set)
        }
    }
}
