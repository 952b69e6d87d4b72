//! Physically Addressed L2.
//!
//! `block = addr & (wpl - 1)`, `index = (addr >> block_bits) & (lines - 1)`,
//! `tag = addr >> (index_bits + block_bits)`.

use super::L2Core;
use crate::config::{CacheConfig, ConfigError};

/// L2 indexed by word address.
#[derive(Clone, Debug)]
pub struct PhysicalL2 {
    pub(super) core: L2Core,
    block_bits: u32,
    index_bits: u32,
    index_mask: u64,
}

impl PhysicalL2 {
    /// Builds the cache.
    ///
    /// # Errors
    ///
    /// `ConfigError` for a non power-of-two geometry.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        let core = L2Core::new(config)?;
        let lines = config.cache_lines();
        Ok(Self {
            core,
            block_bits: config.words_per_line.trailing_zeros(),
            index_bits: lines.trailing_zeros(),
            index_mask: lines as u64 - 1,
        })
    }

    /// Splits a word address into set index and tag.
    #[inline]
    pub(super) const fn decode(&self, addr: u64) -> (usize, u64) {
        let index = (addr >> self.block_bits) & self.index_mask;
        (index as usize, addr >> (self.index_bits + self.block_bits))
    }
}
