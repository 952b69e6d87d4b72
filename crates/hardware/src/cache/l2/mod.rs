//! Second-Level Cache.
//!
//! One shared cache between the object caches and `Memory`. Lines carry only `valid` and
//! `dirty`; sharer state lives in the first level. The addressing mode is chosen once at
//! construction:
//! 1. **Physical:** indexed by raw word address (`PhysicalL2`).
//! 2. **Virtual:** indexed by `(handle, offset)` with the object-cache hashing (`VirtualL2`).
//!
//! A miss evicts through the pseudo-LRU policy and charges the RAM latency only when the
//! victim is dirty (write-back on replace). A hit costs nothing.

/// Physically addressed variant.
pub mod physical;

/// Virtually (handle/offset) addressed variant.
pub mod virt;

pub use physical::PhysicalL2;
pub use virt::VirtualL2;

use tracing::debug;

use super::Access;
use super::policies::{PlruPolicy, ReplacementPolicy};
use crate::common::constants::PHYSICAL_LOAD_OVERHEAD;
use crate::common::{ObjAddr, Ticks, Word};
use crate::config::{CacheConfig, ConfigError, L2Addressing};
use crate::memory::Memory;

/// Both names of a word: the variant decodes the one it is indexed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct L2Addr {
    /// Handle-relative address.
    pub object: ObjAddr,
    /// Word address in `Memory`.
    pub physical: u64,
}

impl L2Addr {
    /// Creates an address pair.
    #[inline]
    pub const fn new(object: ObjAddr, physical: u64) -> Self {
        Self { object, physical }
    }
}

/// Access and miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct L2Stats {
    /// Reads.
    pub reads: u64,
    /// Reads that missed.
    pub read_misses: u64,
    /// Writes.
    pub writes: u64,
    /// Writes that missed.
    pub write_misses: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct L2Line {
    tag: u64,
    valid: bool,
    dirty: bool,
}

/// Tag store, replacement state and counters shared by both variants.
#[derive(Clone, Debug)]
struct L2Core {
    lines: Vec<L2Line>,
    ways: usize,
    words_per_line: usize,
    ram_access_ticks: Ticks,
    policy: PlruPolicy,
    stats: L2Stats,
}

impl L2Core {
    fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sets = config.cache_lines();
        Ok(Self {
            lines: vec![L2Line::default(); sets * config.sets],
            ways: config.sets,
            words_per_line: config.words_per_line,
            ram_access_ticks: config.ext_memory_ticks,
            policy: PlruPolicy::new(sets, config.sets)?,
            stats: L2Stats::default(),
        })
    }

    fn lookup(&self, index: usize, tag: u64) -> Option<usize> {
        let base = index * self.ways;
        self.lines[base..base + self.ways]
            .iter()
            .position(|line| line.valid && line.tag == tag)
    }

    /// Installs `tag` clean over the victim; returns the way and the write-back penalty.
    fn install(&mut self, index: usize, tag: u64) -> (usize, Ticks) {
        let base = index * self.ways;
        let valid_ways = self.lines[base..base + self.ways]
            .iter()
            .enumerate()
            .filter(|(_, line)| line.valid)
            .fold(0u64, |mask, (way, _)| mask | (1u64 << way));
        let way = self.policy.select_victim(index, valid_ways);

        let victim = &mut self.lines[base + way];
        let mut penalty = 0;
        if victim.valid && victim.dirty {
            penalty += self.ram_access_ticks;
            debug!(index, tag = victim.tag, "l2 dirty eviction");
        }
        *victim = L2Line {
            tag,
            valid: true,
            dirty: false,
        };
        self.policy.update(index, way);
        (way, penalty)
    }

    fn read(&mut self, index: usize, tag: u64) -> Ticks {
        self.stats.reads += 1;
        if let Some(way) = self.lookup(index, tag) {
            self.policy.update(index, way);
            return 0;
        }
        self.stats.read_misses += 1;
        self.install(index, tag).1
    }

    fn write(&mut self, index: usize, tag: u64) -> Ticks {
        self.stats.writes += 1;
        let (way, ticks) = match self.lookup(index, tag) {
            Some(way) => {
                self.policy.update(index, way);
                (way, 0)
            }
            None => {
                self.stats.write_misses += 1;
                self.install(index, tag)
            }
        };
        self.lines[index * self.ways + way].dirty = true;
        ticks
    }

    fn prefetch(&mut self, index: usize, tag: u64) -> Ticks {
        if self.lookup(index, tag).is_some() {
            return 1;
        }
        1 + self.ram_access_ticks + self.install(index, tag).1
    }

    fn usage(&self) -> f64 {
        let used = self.lines.iter().filter(|line| line.valid).count();
        used as f64 / self.lines.len() as f64
    }

    fn invalidate_flush(&mut self) {
        for line in &mut self.lines {
            line.valid = false;
            line.dirty = false;
        }
    }
}

/// Shared second-level cache.
#[derive(Clone, Debug)]
pub enum L2Cache {
    /// Indexed by word address.
    Physical(PhysicalL2),
    /// Indexed by handle and offset.
    Virtual(VirtualL2),
}

impl L2Cache {
    /// Builds the variant selected by `addressing`.
    ///
    /// # Errors
    ///
    /// `ConfigError` for a non power-of-two geometry.
    pub fn new(addressing: L2Addressing, config: &CacheConfig) -> Result<Self, ConfigError> {
        Ok(match addressing {
            L2Addressing::Physical => Self::Physical(PhysicalL2::new(config)?),
            L2Addressing::Virtual => Self::Virtual(VirtualL2::new(config)?),
        })
    }

    fn core(&self) -> &L2Core {
        match self {
            Self::Physical(c) => &c.core,
            Self::Virtual(c) => &c.core,
        }
    }

    fn core_mut(&mut self) -> &mut L2Core {
        match self {
            Self::Physical(c) => &mut c.core,
            Self::Virtual(c) => &mut c.core,
        }
    }

    fn locate(&self, addr: L2Addr) -> (usize, u64) {
        match self {
            Self::Physical(c) => c.decode(addr.physical),
            Self::Virtual(c) => c.decode(addr.object),
        }
    }

    /// Returns `true` for the physically addressed variant.
    #[inline]
    pub const fn is_physically_addressed(&self) -> bool {
        matches!(self, Self::Physical(_))
    }

    /// Line alignment overhead added to every line transfer out of this cache.
    #[inline]
    pub const fn load_overhead(&self) -> Ticks {
        match self {
            Self::Physical(_) => PHYSICAL_LOAD_OVERHEAD,
            Self::Virtual(_) => 0,
        }
    }

    /// Latency of one RAM access.
    pub fn ram_access_ticks(&self) -> Ticks {
        self.core().ram_access_ticks
    }

    /// Words per line.
    pub fn words_per_line(&self) -> usize {
        self.core().words_per_line
    }

    /// Counters.
    pub fn stats(&self) -> &L2Stats {
        &self.core().stats
    }

    /// Returns `true` if the line containing `addr` is resident.
    pub fn holds(&self, addr: L2Addr) -> bool {
        let (index, tag) = self.locate(addr);
        self.core().lookup(index, tag).is_some()
    }

    /// Reads the word at `addr`, allocating its line on a miss.
    pub fn read(&mut self, addr: L2Addr, memory: &Memory) -> Access {
        let (index, tag) = self.locate(addr);
        let ticks = self.core_mut().read(index, tag);
        Access::new(memory.read(addr.physical), ticks)
    }

    /// Writes the word at `addr`, allocating its line on a miss and marking it dirty.
    pub fn write(&mut self, addr: L2Addr, value: Word, memory: &mut Memory) -> Ticks {
        let (index, tag) = self.locate(addr);
        let ticks = self.core_mut().write(index, tag);
        memory.write(addr.physical, value);
        ticks
    }

    /// Brings the line containing `addr` in without reading it.
    pub fn prefetch(&mut self, addr: L2Addr) -> Ticks {
        let (index, tag) = self.locate(addr);
        self.core_mut().prefetch(index, tag)
    }

    /// Raw-address read of the execution datapath. The virtual variant cannot index by
    /// word address and goes straight to RAM.
    pub fn read_physical(&mut self, physical: u64, memory: &Memory) -> Access {
        match self {
            Self::Physical(c) => {
                let (index, tag) = c.decode(physical);
                Access::new(memory.read(physical), c.core.read(index, tag))
            }
            Self::Virtual(c) => Access::new(memory.read(physical), c.core.ram_access_ticks),
        }
    }

    /// Raw-address write of the execution datapath.
    pub fn write_physical(&mut self, physical: u64, value: Word, memory: &mut Memory) -> Ticks {
        memory.write(physical, value);
        match self {
            Self::Physical(c) => {
                let (index, tag) = c.decode(physical);
                c.core.write(index, tag)
            }
            Self::Virtual(c) => c.core.ram_access_ticks,
        }
    }

    /// Read misses over reads, in percent; 0 before any read.
    pub fn read_miss_rate(&self) -> f64 {
        let s = self.stats();
        if s.reads == 0 {
            0.0
        } else {
            s.read_misses as f64 * 100.0 / s.reads as f64
        }
    }

    /// Write misses over writes, in percent; 0 before any write.
    pub fn write_miss_rate(&self) -> f64 {
        let s = self.stats();
        if s.writes == 0 {
            0.0
        } else {
            s.write_misses as f64 * 100.0 / s.writes as f64
        }
    }

    /// Fraction of valid lines.
    pub fn usage(&self) -> f64 {
        self.core().usage()
    }

    /// Drops every line. `Memory` already holds every written word.
    pub fn invalidate_flush(&mut self) {
        self.core_mut().invalidate_flush();
    }

    /// Prints the statistics table.
    pub fn print_statistics(&self) {
        let s = self.stats();
        let kind = if self.is_physically_addressed() {
            "PHYSICAL"
        } else {
            "VIRTUAL"
        };
        println!("----------------------------------------------------------");
        println!("L2 CACHE ({kind})");
        println!("  reads                  {}", s.reads);
        println!("    misses               {} ({:.2}%)", s.read_misses, self.read_miss_rate());
        println!("  writes                 {}", s.writes);
        println!("    misses               {} ({:.2}%)", s.write_misses, self.write_miss_rate());
        println!("  usage                  {:.2}%", self.usage() * 100.0);
    }
}
