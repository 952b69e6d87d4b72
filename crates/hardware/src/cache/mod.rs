//! Set-Associative Caches of the Object Hierarchy.
//!
//! This module implements every cache level of the handle-addressed hierarchy:
//! 1. **Object caches:** Per-lane first-level caches with MOESI coherence (`object`).
//! 2. **Handle table cache:** Write-through cache over object metadata (`handle_table`).
//! 3. **Second level:** The shared L2, physically or virtually addressed (`l2`).
//!
//! All levels share the cache line type, the pseudo-LRU replacement policy and the
//! prefetch bookkeeping defined here.

/// Handle table cache.
pub mod handle_table;

/// Second-level cache and its two addressing variants.
pub mod l2;

/// Cache lines and MOESI states.
pub mod line;

/// Per-lane object caches.
pub mod object;

/// Cache replacement policy implementations.
pub mod policies;

/// Prefetch tracking.
pub mod prefetch;

pub use handle_table::{HandleTableCache, HtRead, HtStats};
pub use l2::{L2Addr, L2Cache, L2Stats, PhysicalL2, VirtualL2};
pub use line::{CacheLine, MoesiState};
pub use object::ObjectCache;
pub use prefetch::{PrefetchRequest, PrefetchSource, PrefetchTracker};

use crate::common::{Ticks, Word};

/// Result of a read: the value and the latency it cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Access {
    /// Word read.
    pub value: Word,
    /// Wait ticks beyond a hit.
    pub ticks: Ticks,
}

impl Access {
    /// Creates an access result.
    #[inline]
    pub const fn new(value: Word, ticks: Ticks) -> Self {
        Self { value, ticks }
    }
}
