//! Common types shared by every level of the object memory hierarchy.
//!
//! This module provides the fundamental building blocks used across the simulator:
//! 1. **Scalar Types:** Word, handle, offset, lane and tick aliases.
//! 2. **Addressing:** Object addresses and the handle/offset line hashing.
//! 3. **Constants:** Sentinel offsets, bus timing and handle table timing.
//! 4. **Error Handling:** The fatal error taxonomy and result alias.

/// Object addresses, address schemes and line geometry.
pub mod addr;

/// Constants shared by the caches and the controller.
pub mod constants;

/// Fatal error types.
pub mod error;

pub use addr::{AddressScheme, Decoded, LineGeometry, ObjAddr};
pub use constants::{ARRAY_LENGTH_OFFSET, TYPE_ID_OFFSET};
pub use error::{SimError, SimResult};

/// One simulated data word.
pub type Word = i32;

/// Identifier of an execution lane (and of its object cache).
pub type LaneId = usize;

/// Latency in simulated clock ticks.
pub type Ticks = u64;
