//! Simulation driver and trace replay.
//!
//! Provides the `System` that owns every lane and the shared level, and the parser for
//! line-oriented access traces.

/// Lane routing, prefetch servicing and statistics.
pub mod system;

/// Trace file parsing.
pub mod trace;

pub use system::{Replay, System};
pub use trace::{TraceError, TraceOp};
