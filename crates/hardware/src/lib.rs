//! Handle-addressed memory hierarchy simulator library.
//!
//! This crate models the object memory system of a managed-heap accelerator:
//! 1. **Caches:** Per-lane MOESI object caches, the handle table cache and the shared L2
//!    (physically or virtually addressed).
//! 2. **Memory:** Flat word array and handle table, the ground truth below every cache.
//! 3. **Coherence:** The controller contract the object caches call into, and a
//!    reference snooping bus implementing MOESI and Dragon.
//! 4. **Simulation:** Lane routing, prefetch servicing, trace replay, configuration and
//!    statistics.

/// Cache levels (object, handle table, L2), lines, replacement and prefetch tracking.
pub mod cache;
/// Coherence controller contract and the reference snooping bus.
pub mod coherence;
/// Common types and constants (object addresses, hashing, errors).
pub mod common;
/// Simulator configuration (per-cache files, system descriptor, enums).
pub mod config;
/// Backing RAM and handle table.
pub mod memory;
/// System driver and trace parser.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Resolved hierarchy configuration; use `Config::load` on a descriptor or `Config::default()`.
pub use crate::config::Config;
/// Fatal error type of every hierarchy operation.
pub use crate::common::{SimError, SimResult};
/// Top-level system (lanes plus shared level); construct with `System::new`.
pub use crate::sim::System;
