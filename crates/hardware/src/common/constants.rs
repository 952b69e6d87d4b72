//! Global Simulation Constants.
//!
//! This module defines the constants shared by every level of the hierarchy. It includes:
//! 1. **Word Constants:** Word size and the two reserved sentinel offsets.
//! 2. **Hashing Constants:** The fixed handle shift of the object-cache index function.
//! 3. **Bus Timing:** Transfer widths and per-request overheads charged by the controller.
//! 4. **Handle Table Timing:** Extra ticks added on top of the external memory latency.

/// Size of one simulated word in bytes.
pub const BYTES_PER_WORD: usize = 4;

/// Offset value that requests the array length of a handle instead of a data word.
pub const ARRAY_LENGTH_OFFSET: u32 = i32::MAX as u32;

/// Offset value that requests the type id (CTI) of a handle instead of a data word.
pub const TYPE_ID_OFFSET: u32 = ARRAY_LENGTH_OFFSET - 1;

/// Left shift applied to the handle before it is folded into the set index.
pub const HANDLE_SHIFT: u32 = 4;

/// Largest handle or offset accepted by presence checks and explicit prefetch requests.
pub const QUERY_LIMIT: u32 = 0xFFFF;

/// Mask applied to handles before they index the handle table.
pub const HANDLE_MASK: u32 = 0xF_FFFF;

/// Words moved per bus beat between two first-level caches.
pub const BUS_WIDTH_L1: u64 = 8;

/// Words moved per bus beat between the second-level cache and a first-level cache.
pub const BUS_WIDTH_L2: u64 = 8;

/// Fixed overhead of a line transfer from a peer first-level cache.
pub const L1_FROM_L1_OVERHEAD: u64 = 3;

/// Fixed overhead of a line transfer from the second-level cache.
pub const L1_FROM_L2_OVERHEAD: u64 = 6;

/// Bus occupancy of a single-word broadcast (a write invalidation).
pub const SINGLE_VALUE_TICKS: u64 = 1;

/// Line alignment overhead of the physically addressed second-level cache.
pub const PHYSICAL_LOAD_OVERHEAD: u64 = 2;

/// Extra ticks of a handle-table read miss on top of the external memory latency.
pub const HT_READ_MISS_EXTRA: u64 = 7;

/// Extra ticks of a full handle-table entry write that misses the cache.
pub const HT_WRITE_MISS_EXTRA: u64 = 9;

/// Extra ticks of a single-field handle-table update (flags or monitor id).
pub const HT_FIELD_UPDATE_EXTRA: u64 = 6;

/// Depth of the per-lane prefetch request ring.
pub const PREFETCH_QUEUE_DEPTH: usize = 8;
