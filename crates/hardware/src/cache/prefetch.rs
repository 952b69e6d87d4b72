//! Linear Prefetch Bookkeeping.
//!
//! Object caches prefetch the next line of the object they just touched. The request
//! travels through the coherence controller and comes back later as an installed line.
//! This module tracks which installed lines were speculative, who supplied them, and how
//! far a completion may chain further look-ahead requests.

use std::collections::HashSet;

use crate::common::{LaneId, ObjAddr};
use crate::stats::PrefetchTotals;

/// A queued prefetch of the line containing `addr` on behalf of `requester`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefetchRequest {
    /// Any address inside the wanted line.
    pub addr: ObjAddr,
    /// Lane that asked for it.
    pub requester: LaneId,
}

/// Which level supplied a prefetched line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefetchSource {
    /// A peer first-level cache.
    L1,
    /// The second-level cache.
    L2,
}

/// Pending prefetched lines and their counters, keyed by line tag.
#[derive(Clone, Debug, Default)]
pub struct PrefetchTracker {
    pending_l1: HashSet<u64>,
    pending_l2: HashSet<u64>,
    totals: PrefetchTotals,
    repeat_counter: u32,
    repeat_limit: u32,
}

impl PrefetchTracker {
    /// Creates a tracker allowing `repeat_limit` chained look-ahead requests.
    pub fn new(repeat_limit: u32) -> Self {
        Self {
            repeat_limit,
            ..Self::default()
        }
    }

    /// Records a speculatively installed line.
    pub fn record_install(&mut self, tag: u64, source: PrefetchSource) {
        match source {
            PrefetchSource::L1 => {
                let _ = self.pending_l1.insert(tag);
                self.totals.issued_l1 += 1;
            }
            PrefetchSource::L2 => {
                let _ = self.pending_l2.insert(tag);
                self.totals.issued_l2 += 1;
            }
        }
    }

    /// Consumes the pending entry of `tag` on a demand hit.
    ///
    /// Returns `true` if the line was a pending prefetch; the look-ahead chain restarts.
    pub fn consume(&mut self, tag: u64) -> bool {
        let mut used = false;
        if self.pending_l2.remove(&tag) {
            self.totals.used_l2 += 1;
            used = true;
        }
        if self.pending_l1.remove(&tag) {
            self.totals.used_l1 += 1;
            used = true;
        }
        if used {
            self.repeat_counter = 0;
        }
        used
    }

    /// Forgets `tag` without counting it (the line was evicted unused).
    pub fn forget(&mut self, tag: u64) {
        let _ = self.pending_l1.remove(&tag);
        let _ = self.pending_l2.remove(&tag);
    }

    /// Returns `true` if `tag` is an unconsumed prefetched line.
    pub fn is_pending(&self, tag: u64) -> bool {
        self.pending_l1.contains(&tag) || self.pending_l2.contains(&tag)
    }

    /// Restarts the look-ahead chain after a fresh prefetch was issued.
    #[inline]
    pub fn reset_chain(&mut self) {
        self.repeat_counter = 0;
    }

    /// Advances the look-ahead chain after a completed prefetch.
    ///
    /// Returns the distance, in lines, of the next look-ahead request
    /// (`2^(n+1) - 1` for the `n`-th link), or `None` once the limit is reached.
    pub fn next_look_ahead(&mut self) -> Option<u32> {
        self.repeat_counter += 1;
        if self.repeat_counter >= self.repeat_limit {
            return None;
        }
        1u32.checked_shl(self.repeat_counter + 1).map(|p| p - 1)
    }

    /// Issued and used counters.
    #[inline]
    pub const fn totals(&self) -> PrefetchTotals {
        self.totals
    }

    /// Drops every pending entry; counters are kept.
    pub fn clear_pending(&mut self) {
        self.pending_l1.clear();
        self.pending_l2.clear();
        self.repeat_counter = 0;
    }

    /// Drops pending entries and zeroes the counters.
    pub fn reset(&mut self) {
        self.clear_pending();
        self.totals = PrefetchTotals::default();
    }
}
