//! Simulation statistics collection and reporting.
//!
//! This module tracks the counters of the memory hierarchy. It provides:
//! 1. **Object caches:** Hits, misses and reload sources per direction (`CacheStats`).
//! 2. **Prefetching:** Issued and used prefetches per supplier (`PrefetchTotals`), summed
//!    per run instead of in process-wide statics.
//! 3. **Bus:** Lines moved and prefetch queue outcomes (`BusStats`).

use std::ops::AddAssign;

/// Percentage of `part` in `whole`, 0 when `whole` is 0.
#[inline]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Counters of one first-level object cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Demand reads.
    pub reads: u64,
    /// Demand writes.
    pub writes: u64,
    /// Reads served from a resident line.
    pub read_hits: u64,
    /// Reads that had to fetch a line.
    pub read_misses: u64,
    /// Writes to a resident line.
    pub write_hits: u64,
    /// Writes that had to fetch a line.
    pub write_misses: u64,
    /// Read misses where the tag was present but the line had been invalidated.
    pub read_tag_invalid: u64,
    /// Write misses where the tag was present but the line had been invalidated.
    pub write_tag_invalid: u64,
    /// Read misses supplied by a peer first-level cache.
    pub read_reload_l1: u64,
    /// Read misses supplied by the second-level cache.
    pub read_reload_l2: u64,
    /// Write misses supplied by a peer first-level cache.
    pub write_reload_l1: u64,
    /// Write misses supplied by the second-level cache.
    pub write_reload_l2: u64,
    /// Lines overwritten by a peer's update broadcast.
    pub cacheline_updates: u64,
}

impl CacheStats {
    /// Read misses over reads, in percent.
    pub fn read_miss_rate(&self) -> f64 {
        percent(self.read_misses, self.reads)
    }

    /// Write misses over writes, in percent.
    pub fn write_miss_rate(&self) -> f64 {
        percent(self.write_misses, self.writes)
    }
}

/// Issued and consumed prefetches, split by the level that supplied them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefetchTotals {
    /// Prefetched lines supplied by a peer first-level cache.
    pub issued_l1: u64,
    /// Prefetched lines supplied by the second-level cache.
    pub issued_l2: u64,
    /// Peer-supplied prefetched lines later hit by a demand access.
    pub used_l1: u64,
    /// L2-supplied prefetched lines later hit by a demand access.
    pub used_l2: u64,
}

impl PrefetchTotals {
    /// Total prefetched lines installed.
    pub const fn issued(&self) -> u64 {
        self.issued_l1 + self.issued_l2
    }

    /// Total prefetched lines consumed.
    pub const fn used(&self) -> u64 {
        self.used_l1 + self.used_l2
    }

    /// Consumed over issued, in percent.
    pub fn used_rate(&self) -> f64 {
        percent(self.used(), self.issued())
    }

    /// Prints the aggregate prefetch table.
    pub fn print(&self) {
        println!("----------------------------------------------------------");
        println!("PREFETCH TOTALS");
        println!(
            "  from_l1                issued: {:<10} used: {:<10} ({:.2}%)",
            self.issued_l1,
            self.used_l1,
            percent(self.used_l1, self.issued_l1)
        );
        println!(
            "  from_l2                issued: {:<10} used: {:<10} ({:.2}%)",
            self.issued_l2,
            self.used_l2,
            percent(self.used_l2, self.issued_l2)
        );
        println!(
            "  total                  issued: {:<10} used: {:<10} ({:.2}%)",
            self.issued(),
            self.used(),
            self.used_rate()
        );
    }
}

impl AddAssign for PrefetchTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.issued_l1 += rhs.issued_l1;
        self.issued_l2 += rhs.issued_l2;
        self.used_l1 += rhs.used_l1;
        self.used_l2 += rhs.used_l2;
    }
}

/// Counters of the reference snooping bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Lines delivered to a first-level cache on a demand miss.
    pub lines_loaded: u64,
    /// Lines a peer supplied.
    pub peer_supplies: u64,
    /// Write notifications broadcast.
    pub write_notifications: u64,
    /// Prefetch requests serviced.
    pub prefetches_serviced: u64,
    /// Prefetch requests skipped because the line was already resident.
    pub prefetches_resident: u64,
    /// Prefetch requests lost to a full queue.
    pub prefetches_dropped: u64,
}

impl BusStats {
    /// Prints the bus table.
    pub fn print(&self) {
        println!("----------------------------------------------------------");
        println!("COHERENCE BUS");
        println!("  lines_loaded           {}", self.lines_loaded);
        println!("  peer_supplies          {}", self.peer_supplies);
        println!("  write_notifications    {}", self.write_notifications);
        println!("  prefetches_serviced    {}", self.prefetches_serviced);
        println!("  prefetches_resident    {}", self.prefetches_resident);
        println!("  prefetches_dropped     {}", self.prefetches_dropped);
    }
}
