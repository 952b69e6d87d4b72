//! Handle Table Cache.
//!
//! A set-associative cache over `Memory`'s handle table, keyed by handle. Reads allocate
//! on a miss; every write goes through to `Memory` and only updates a resident entry in
//! place, never allocating one.

use tracing::{debug, trace};

use super::policies::{PlruPolicy, ReplacementPolicy};
use crate::common::constants::{
    HANDLE_MASK, HT_FIELD_UPDATE_EXTRA, HT_READ_MISS_EXTRA, HT_WRITE_MISS_EXTRA, QUERY_LIMIT,
};
use crate::common::{SimError, SimResult, Ticks};
use crate::config::{CacheConfig, ConfigError};
use crate::memory::{HtEntry, Memory};

/// A cached handle table entry.
#[derive(Clone, Copy, Debug, Default)]
struct HtSlot {
    tag: u32,
    valid: bool,
    entry: HtEntry,
}

/// Entry returned by a handle table read, with its latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtRead {
    /// Metadata of the handle.
    pub entry: HtEntry,
    /// Wait ticks.
    pub ticks: Ticks,
}

/// Read and write counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HtStats {
    /// Entry reads.
    pub reads: u64,
    /// Reads that missed.
    pub read_misses: u64,
    /// Entry and field writes.
    pub writes: u64,
    /// Writes to a non-resident entry.
    pub write_misses: u64,
}

/// Set-associative cache over the handle table.
#[derive(Clone, Debug)]
pub struct HandleTableCache {
    slots: Vec<HtSlot>,
    lines: usize,
    ways: usize,
    policy: PlruPolicy,
    ext_memory_ticks: Ticks,
    stats: HtStats,
}

impl HandleTableCache {
    /// Builds the cache from its configuration file contents.
    ///
    /// # Errors
    ///
    /// `ConfigError` for a non power-of-two geometry.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let lines = config.cache_lines();
        Ok(Self {
            slots: vec![HtSlot::default(); lines * config.sets],
            lines,
            ways: config.sets,
            policy: PlruPolicy::new(lines, config.sets)?,
            ext_memory_ticks: config.ext_memory_ticks,
            stats: HtStats::default(),
        })
    }

    /// Latency of a read miss.
    #[inline]
    pub const fn read_miss_ticks(&self) -> Ticks {
        self.ext_memory_ticks + HT_READ_MISS_EXTRA
    }

    /// Counters.
    #[inline]
    pub const fn stats(&self) -> &HtStats {
        &self.stats
    }

    /// Index from the masked handle. The tag is the whole handle, so handles that differ
    /// only above the mask never alias.
    #[inline]
    fn locate(&self, handle: u32) -> (usize, u32) {
        let masked = handle & HANDLE_MASK;
        ((masked % self.lines as u32) as usize, handle)
    }

    fn lookup(&self, index: usize, tag: u32) -> Option<usize> {
        let base = index * self.ways;
        self.slots[base..base + self.ways]
            .iter()
            .position(|slot| slot.valid && slot.tag == tag)
    }

    fn resident_mut(&mut self, handle: u32) -> Option<&mut HtEntry> {
        let (index, tag) = self.locate(handle);
        let way = self.lookup(index, tag)?;
        self.policy.update(index, way);
        Some(&mut self.slots[index * self.ways + way].entry)
    }

    fn check_registered(handle: u32, memory: &Memory) -> SimResult<()> {
        if handle as usize >= memory.registered_handles() {
            return Err(SimError::UnknownHandle {
                handle,
                registered: memory.registered_handles(),
            });
        }
        Ok(())
    }

    /// Reads the entry of `handle`, allocating it on a miss.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if `handle` was never registered.
    pub fn read(&mut self, handle: u32, memory: &Memory) -> SimResult<HtRead> {
        Self::check_registered(handle, memory)?;
        self.stats.reads += 1;

        let (index, tag) = self.locate(handle);
        if let Some(way) = self.lookup(index, tag) {
            self.policy.update(index, way);
            trace!(handle, "handle table hit");
            return Ok(HtRead {
                entry: self.slots[index * self.ways + way].entry,
                ticks: 0,
            });
        }

        self.stats.read_misses += 1;
        let entry = memory.handle(handle);
        let base = index * self.ways;
        let valid_ways = self.slots[base..base + self.ways]
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.valid)
            .fold(0u64, |mask, (way, _)| mask | (1u64 << way));
        let way = self.policy.select_victim(index, valid_ways);
        self.slots[base + way] = HtSlot {
            tag,
            valid: true,
            entry,
        };
        self.policy.update(index, way);
        debug!(handle, address = entry.address, size = entry.size, "handle table fill");
        Ok(HtRead {
            entry,
            ticks: self.read_miss_ticks(),
        })
    }

    /// Writes the whole entry of `handle` through to `Memory`.
    ///
    /// # Errors
    ///
    /// Capacity errors from `Memory::register_handle`.
    pub fn write(&mut self, handle: u32, entry: HtEntry, memory: &mut Memory) -> SimResult<Ticks> {
        memory.register_handle(handle, entry)?;
        self.stats.writes += 1;
        if let Some(local) = self.resident_mut(handle) {
            *local = entry;
            return Ok(0);
        }
        self.stats.write_misses += 1;
        Ok(self.ext_memory_ticks + HT_WRITE_MISS_EXTRA)
    }

    /// Writes the flags of `handle` through to `Memory`.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if `handle` was never registered.
    pub fn set_flags(&mut self, handle: u32, flags: u32, memory: &mut Memory) -> SimResult<Ticks> {
        Self::check_registered(handle, memory)?;
        memory.set_flags(handle, flags);
        self.stats.writes += 1;
        if let Some(local) = self.resident_mut(handle) {
            local.flags = flags;
        }
        Ok(self.ext_memory_ticks + HT_FIELD_UPDATE_EXTRA)
    }

    /// Writes the monitor id of `handle` through to `Memory`.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if `handle` was never registered.
    pub fn set_monitor_id(
        &mut self,
        handle: u32,
        monitor_id: u32,
        memory: &mut Memory,
    ) -> SimResult<Ticks> {
        Self::check_registered(handle, memory)?;
        memory.set_monitor_id(handle, monitor_id);
        self.stats.writes += 1;
        if let Some(local) = self.resident_mut(handle) {
            local.monitor_id = monitor_id;
        }
        Ok(self.ext_memory_ticks + HT_FIELD_UPDATE_EXTRA)
    }

    /// Presence check; `false` for handles above `0xFFFF`.
    pub fn holds_value(&self, handle: u32) -> bool {
        if handle > QUERY_LIMIT {
            return false;
        }
        let (index, tag) = self.locate(handle);
        self.lookup(index, tag).is_some()
    }

    /// Drops every entry. Nothing is written back: `Memory` is always current.
    pub fn invalidate_flush(&mut self) {
        for slot in &mut self.slots {
            slot.valid = false;
        }
    }

    /// Fraction of valid entries.
    pub fn usage(&self) -> f64 {
        let used = self.slots.iter().filter(|slot| slot.valid).count();
        used as f64 / self.slots.len() as f64
    }

    /// Prints the statistics table.
    pub fn print_statistics(&self) {
        let s = &self.stats;
        let rate = if s.reads == 0 {
            0.0
        } else {
            s.read_misses as f64 * 100.0 / s.reads as f64
        };
        println!("----------------------------------------------------------");
        println!("HANDLE TABLE CACHE");
        println!("  reads                  {}", s.reads);
        println!("    misses               {} ({:.2}%)", s.read_misses, rate);
        println!("  writes                 {}", s.writes);
        println!("    misses               {}", s.write_misses);
        println!("  usage                  {:.2}%", self.usage() * 100.0);
    }
}
