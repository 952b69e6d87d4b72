//! Fatal Simulation Errors.
//!
//! Errors in this module are unrecoverable by design: they indicate that something
//! upstream (a synthesized program, a trace, a configuration) asked for an impossible
//! handle, lane or memory layout. They are propagated with `?` to the driver, which
//! aborts the run.

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal conditions raised by the memory hierarchy.
#[derive(Debug, Error)]
pub enum SimError {
    /// A handle was registered past the end of the handle table.
    #[error("handle table full: handle {handle} exceeds capacity {capacity}")]
    HandleTableFull {
        /// Offending handle.
        handle: u32,
        /// Number of handle table entries.
        capacity: usize,
    },

    /// An object was placed past the end of the word array.
    #[error("memory full: object at {address} with {size} words exceeds {capacity} words")]
    MemoryFull {
        /// Base word address of the object.
        address: u64,
        /// Object size in words.
        size: u64,
        /// Number of words in memory.
        capacity: usize,
    },

    /// A handle beyond the registered range was dereferenced.
    #[error("handle {handle} does not exist ({registered} handles registered)")]
    UnknownHandle {
        /// Requested handle.
        handle: u32,
        /// Number of registered handles.
        registered: usize,
    },

    /// An access was routed to a lane that does not exist.
    #[error("lane {lane} does not exist ({lanes} lanes configured)")]
    UnknownLane {
        /// Requested lane.
        lane: usize,
        /// Number of lanes.
        lanes: usize,
    },

    /// The configuration could not be loaded or describes an impossible geometry.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias used by every fallible hierarchy operation.
pub type SimResult<T> = Result<T, SimError>;
