//! Virtually Addressed L2.
//!
//! Reuses the object-cache hashing with the linear scheme, so a line of the L2 covers the
//! same words of an object as a line of the first level.

use super::L2Core;
use crate::common::{AddressScheme, LineGeometry, ObjAddr};
use crate::config::{CacheConfig, ConfigError};

/// L2 indexed by handle and offset.
#[derive(Clone, Debug)]
pub struct VirtualL2 {
    pub(super) core: L2Core,
    geometry: LineGeometry,
}

impl VirtualL2 {
    /// Builds the cache.
    ///
    /// # Errors
    ///
    /// `ConfigError` for a non power-of-two geometry.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            core: L2Core::new(config)?,
            geometry: LineGeometry::new(
                config.words_per_line as u32,
                config.cache_lines(),
                AddressScheme::Linear,
            ),
        })
    }

    #[inline]
    pub(super) const fn decode(&self, addr: ObjAddr) -> (usize, u64) {
        let d = self.geometry.decode(addr);
        (d.index, d.tag)
    }
}
