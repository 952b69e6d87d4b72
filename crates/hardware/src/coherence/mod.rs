//! Coherence Controller Contract.
//!
//! Object caches never inspect their peers. On a miss, or when a write has to become
//! visible, they call into a `CoherenceController` and apply its verdicts
//! (`from_l2_cache`, `is_data_exclusive`, `updating_l2_cache`) to their MOESI table.
//!
//! The controller is passed to every cache operation as `&mut dyn CoherenceController`,
//! so a cache can be driven by the reference snooping bus or by a test double.

/// Reference snooping controller.
pub mod snoop;

pub use snoop::{SharedLevel, SnoopBus};

use crate::cache::{CacheLine, L2Cache};
use crate::common::{LaneId, ObjAddr, SimResult, Ticks};
use crate::config::PrefetchStrategy;

/// A line delivered on a miss, with the latency of delivering it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fill {
    /// Line contents.
    pub line: CacheLine,
    /// Transfer latency.
    pub ticks: Ticks,
}

/// Metadata returned for the two sentinel offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleInfo {
    /// Handle table access latency.
    pub ticks: Ticks,
    /// Object size in words.
    pub array_length: u32,
    /// Class type index.
    pub type_id: u32,
}

/// Arbitration authority consulted by the object caches.
pub trait CoherenceController {
    /// Fetches the line containing `addr` for `requester`, from a peer or the L2.
    ///
    /// Sets the verdicts returned by `from_l2_cache` and `is_data_exclusive`.
    fn request_data(&mut self, addr: ObjAddr, requester: LaneId) -> SimResult<Fill>;

    /// Reads the handle table entry of `handle`.
    fn request_handle_table(
        &mut self,
        handle: u32,
        is_write: bool,
        requester: LaneId,
    ) -> SimResult<HandleInfo>;

    /// Writes back an evicted or flushed dirty line whose first word is at `addr`.
    fn write_back(
        &mut self,
        addr: ObjAddr,
        line: CacheLine,
        is_prefetch_evict: bool,
        requester: LaneId,
    ) -> SimResult<()>;

    /// Makes a write to `addr` visible to the other caches.
    ///
    /// Sets the verdict returned by `is_data_exclusive`.
    fn write_notification(
        &mut self,
        addr: ObjAddr,
        line: &CacheLine,
        requester: LaneId,
    ) -> SimResult<Ticks>;

    /// Queues a prefetch of the line containing `addr`.
    fn request_data_prefetch(&mut self, addr: ObjAddr, requester: LaneId);

    /// Returns `true` if the last `request_data` was served by the L2.
    fn from_l2_cache(&self) -> bool;

    /// Returns `true` if no other cache holds the line after the last request or notification.
    fn is_data_exclusive(&self) -> bool;

    /// Returns `true` if writes propagate by update rather than invalidation.
    fn updating_l2_cache(&self) -> bool;

    /// Prefetch strategy the caches should follow.
    fn prefetch_strategy(&self) -> PrefetchStrategy;

    /// The shared second-level cache.
    fn l2_cache(&self) -> &L2Cache;
}
