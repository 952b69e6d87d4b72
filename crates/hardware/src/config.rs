//! Configuration system for the object memory hierarchy.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** Baseline capacities and lane counts.
//! 2. **Per-cache files:** `CacheConfig`, one JSON file per cache instance.
//! 3. **Descriptor:** `SystemDescriptor`, the top-level JSON file referencing the per-cache
//!    files, resolved into a `Config`.
//! 4. **Enums:** Prefetch strategy, coherence protocol and second-level addressing.
//!
//! The six keys of a per-cache file are mandatory: a missing key is a `ConfigError`, never
//! a silent zero.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::common::{AddressScheme, LineGeometry};
use crate::common::constants::BYTES_PER_WORD;

/// Default configuration constants for the simulator.
mod defaults {
    /// Number of execution lanes (object caches).
    pub const LANES: usize = 1;

    /// Words of simulated RAM (16 MiB).
    pub const MEMORY_WORDS: usize = 4 * 1024 * 1024;

    /// Handle table entries.
    pub const HANDLE_ENTRIES: usize = 64 * 1024;

    /// Look-ahead prefetches chained after a completed prefetch.
    pub const PREFETCH_REPEAT_LIMIT: u32 = 0;

    /// Default cache size in KiB.
    pub const CACHE_SIZE_KIB: usize = 8;

    /// Default associativity.
    pub const CACHE_SETS: usize = 4;

    /// Default words per line.
    pub const WORDS_PER_LINE: usize = 8;

    /// Default external memory latency in ticks.
    pub const EXT_MEMORY_TICKS: u64 = 40;

    /// Largest associativity the bit-tree replacement state can encode.
    pub const MAX_SETS: usize = 64;
}

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or lacks a mandatory key.
    #[error("malformed configuration {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The associativity cannot be encoded as a replacement bit-tree.
    #[error("associativity {0} is not a power of two between 1 and 64")]
    Associativity(usize),

    /// Size, words per line and associativity do not form a power-of-two grid.
    #[error("invalid cache geometry: {0}")]
    Geometry(String),
}

/// Prefetch strategy of the first-level object caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrefetchStrategy {
    /// No prefetching.
    #[default]
    #[serde(alias = "None")]
    None,
    /// After each demand access, prefetch the next line of the same object.
    #[serde(alias = "Linear")]
    Linear,
}

/// Coherence protocol run by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoherenceProtocol {
    /// Write-invalidate MOESI.
    #[default]
    #[serde(alias = "Moesi")]
    Moesi,
    /// Write-update (Dragon): writes push the new line into every sharer.
    #[serde(alias = "Dragon")]
    Dragon,
}

impl CoherenceProtocol {
    /// Returns `true` if writes propagate by update instead of invalidation.
    #[inline]
    pub const fn is_update(self) -> bool {
        matches!(self, Self::Dragon)
    }
}

/// Addressing mode of the shared second-level cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum L2Addressing {
    /// Indexed by raw word address.
    #[default]
    #[serde(alias = "Physical")]
    Physical,
    /// Indexed by handle and offset.
    #[serde(alias = "Virtual")]
    Virtual,
}

/// Configuration of one cache instance, as stored in its own JSON file.
///
/// # Examples
///
/// ```
/// use heapsim_core::config::CacheConfig;
///
/// let json = r#"{
///     "size": 4, "sets": 2, "wordsperline": 8,
///     "wrAlloc": true, "wrBack": true, "extMemoryAccTicks": 20
/// }"#;
/// let config: CacheConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.cache_lines(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Total capacity in KiB.
    #[serde(rename = "size")]
    pub size_kib: usize,

    /// Associativity (ways per index).
    pub sets: usize,

    /// Words per line.
    #[serde(rename = "wordsperline")]
    pub words_per_line: usize,

    /// Write-allocate flag. Recorded only: every level allocates on a write miss.
    #[serde(rename = "wrAlloc")]
    pub write_allocate: bool,

    /// Write-back flag. Recorded only: every level writes back on eviction.
    #[serde(rename = "wrBack")]
    pub write_back: bool,

    /// Latency of an external memory access in ticks.
    #[serde(rename = "extMemoryAccTicks")]
    pub ext_memory_ticks: u64,

    /// Address-decode scheme used by object caches.
    #[serde(default, rename = "addressScheme")]
    pub address_scheme: AddressScheme,
}

impl CacheConfig {
    /// Creates a configuration with the given shape and default flags.
    pub fn new(size_kib: usize, sets: usize, words_per_line: usize, ext_memory_ticks: u64) -> Self {
        Self {
            size_kib,
            sets,
            words_per_line,
            write_allocate: true,
            write_back: true,
            ext_memory_ticks,
            address_scheme: AddressScheme::Linear,
        }
    }

    /// Loads and validates a per-cache JSON file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Parse` for malformed JSON or a missing key, and
    /// any error of `validate`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_json(path)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            size_kib = config.size_kib,
            sets = config.sets,
            words_per_line = config.words_per_line,
            "cache configuration loaded"
        );
        Ok(config)
    }

    /// Number of indices: `size * 1024 / sets / (4 * words_per_line)`.
    pub fn cache_lines(&self) -> usize {
        let bytes_per_line = BYTES_PER_WORD * self.words_per_line;
        if self.sets == 0 || bytes_per_line == 0 {
            return 0;
        }
        self.size_kib * 1024 / self.sets / bytes_per_line
    }

    /// Checks that associativity, line size and index count are usable powers of two.
    ///
    /// # Errors
    ///
    /// `Associativity` for an unsupported number of ways, `Geometry` for a line size or
    /// index count that is zero or not a power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sets.is_power_of_two() || self.sets > defaults::MAX_SETS {
            return Err(ConfigError::Associativity(self.sets));
        }
        if !self.words_per_line.is_power_of_two() {
            return Err(ConfigError::Geometry(format!(
                "{} words per line is not a power of two",
                self.words_per_line
            )));
        }
        let lines = self.cache_lines();
        if !lines.is_power_of_two() {
            return Err(ConfigError::Geometry(format!(
                "{} KiB with {} ways of {} words gives {} lines, not a power of two",
                self.size_kib, self.sets, self.words_per_line, lines
            )));
        }
        Ok(())
    }

    /// Handle/offset geometry of an object cache built from this configuration.
    pub fn geometry(&self) -> LineGeometry {
        LineGeometry::new(
            self.words_per_line as u32,
            self.cache_lines(),
            self.address_scheme,
        )
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(
            defaults::CACHE_SIZE_KIB,
            defaults::CACHE_SETS,
            defaults::WORDS_PER_LINE,
            defaults::EXT_MEMORY_TICKS,
        )
    }
}

/// Top-level descriptor file referencing one file per cache kind.
///
/// Paths are resolved relative to the directory containing the descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDescriptor {
    /// First-level object cache configuration file.
    #[serde(rename = "CacheConfig")]
    pub cache_config: PathBuf,

    /// Handle table cache configuration file.
    #[serde(rename = "htCacheConfig")]
    pub ht_cache_config: PathBuf,

    /// Second-level cache configuration file.
    #[serde(rename = "L2CacheConfig")]
    pub l2_cache_config: PathBuf,

    /// Number of execution lanes.
    #[serde(default = "SystemDescriptor::default_lanes")]
    pub lanes: usize,

    /// Second-level addressing mode.
    #[serde(default)]
    pub l2_addressing: L2Addressing,

    /// Coherence protocol.
    #[serde(default)]
    pub coherence_protocol: CoherenceProtocol,

    /// Prefetch strategy.
    #[serde(default)]
    pub prefetching: PrefetchStrategy,

    /// Look-ahead prefetches chained after a completed prefetch.
    #[serde(default = "SystemDescriptor::default_prefetch_repeat_limit")]
    pub prefetch_repeat_limit: u32,

    /// Words of simulated RAM.
    #[serde(default = "SystemDescriptor::default_memory_words")]
    pub memory_words: usize,

    /// Handle table entries.
    #[serde(default = "SystemDescriptor::default_handle_entries")]
    pub handle_entries: usize,
}

impl SystemDescriptor {
    fn default_lanes() -> usize {
        defaults::LANES
    }

    fn default_prefetch_repeat_limit() -> u32 {
        defaults::PREFETCH_REPEAT_LIMIT
    }

    fn default_memory_words() -> usize {
        defaults::MEMORY_WORDS
    }

    fn default_handle_entries() -> usize {
        defaults::HANDLE_ENTRIES
    }
}

/// Resolved configuration of a whole hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// First-level object cache (shared by every lane).
    pub l1: CacheConfig,
    /// Handle table cache.
    pub handle_table: CacheConfig,
    /// Second-level cache.
    pub l2: CacheConfig,
    /// Number of execution lanes.
    pub lanes: usize,
    /// Second-level addressing mode.
    pub l2_addressing: L2Addressing,
    /// Coherence protocol.
    pub protocol: CoherenceProtocol,
    /// Prefetch strategy.
    pub prefetch: PrefetchStrategy,
    /// Look-ahead prefetches chained after a completed prefetch.
    pub prefetch_repeat_limit: u32,
    /// Words of simulated RAM.
    pub memory_words: usize,
    /// Handle table entries.
    pub handle_entries: usize,
}

impl Config {
    /// Loads a descriptor and every file it references.
    ///
    /// # Errors
    ///
    /// The first `ConfigError` raised by the descriptor or by one of the cache files.
    pub fn load(descriptor: &Path) -> Result<Self, ConfigError> {
        let desc: SystemDescriptor = read_json(descriptor)?;
        let base = descriptor.parent().unwrap_or_else(|| Path::new("."));
        let config = Self {
            l1: CacheConfig::load(&base.join(&desc.cache_config))?,
            handle_table: CacheConfig::load(&base.join(&desc.ht_cache_config))?,
            l2: CacheConfig::load(&base.join(&desc.l2_cache_config))?,
            lanes: desc.lanes,
            l2_addressing: desc.l2_addressing,
            protocol: desc.coherence_protocol,
            prefetch: desc.prefetching,
            prefetch_repeat_limit: desc.prefetch_repeat_limit,
            memory_words: desc.memory_words,
            handle_entries: desc.handle_entries,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates every cache and the lane count.
    ///
    /// # Errors
    ///
    /// `Geometry` for zero lanes, or the first error of a cache's `validate`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.l1.validate()?;
        self.handle_table.validate()?;
        self.l2.validate()?;
        if self.lanes == 0 {
            return Err(ConfigError::Geometry("at least one lane is required".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            l1: CacheConfig::default(),
            handle_table: CacheConfig::new(4, 2, 8, defaults::EXT_MEMORY_TICKS),
            l2: CacheConfig::new(64, 4, 8, defaults::EXT_MEMORY_TICKS),
            lanes: defaults::LANES,
            l2_addressing: L2Addressing::Physical,
            protocol: CoherenceProtocol::Moesi,
            prefetch: PrefetchStrategy::None,
            prefetch_repeat_limit: defaults::PREFETCH_REPEAT_LIMIT,
            memory_words: defaults::MEMORY_WORDS,
            handle_entries: defaults::HANDLE_ENTRIES,
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
