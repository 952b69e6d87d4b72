//! System: owns the lanes and the shared level side by side.
//!
//! Every access is routed by splitting the lane slice around the requester, so the
//! requesting cache is borrowed mutably while its peers are reachable from the
//! `SnoopBus` built for that one call.

use std::path::Path;

use tracing::trace;

use super::trace::TraceOp;
use crate::cache::{Access, HandleTableCache, L2Cache, ObjectCache};
use crate::coherence::{SharedLevel, SnoopBus};
use crate::common::{LaneId, ObjAddr, SimError, SimResult, Ticks, Word};
use crate::config::{Config, ConfigError};
use crate::memory::{HtEntry, Memory};
use crate::stats::PrefetchTotals;

/// Totals of a trace replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Replay {
    /// Reads and writes executed.
    pub accesses: u64,
    /// Wait ticks summed over every access.
    pub ticks: Ticks,
    /// Prefetch requests serviced.
    pub prefetches: u64,
}

/// The whole hierarchy: one object cache per lane over a shared level.
#[derive(Clone, Debug)]
pub struct System {
    lanes: Vec<ObjectCache>,
    shared: SharedLevel,
}

impl System {
    /// Builds a system from a resolved configuration.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an invalid geometry or a lane count of zero.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let lanes = (0..config.lanes)
            .map(|id| ObjectCache::new(id, &config.l1, config.prefetch_repeat_limit))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            lanes,
            shared: SharedLevel::new(config)?,
        })
    }

    /// Loads a descriptor file and builds the system it describes.
    ///
    /// # Errors
    ///
    /// Any `ConfigError` raised while reading the descriptor or the files it references.
    pub fn from_descriptor(path: &Path) -> Result<Self, ConfigError> {
        Self::new(&Config::load(path)?)
    }

    /// Number of lanes.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Object cache of `lane`.
    #[inline]
    pub fn lane(&self, lane: LaneId) -> Option<&ObjectCache> {
        self.lanes.get(lane)
    }

    /// The shared level.
    #[inline]
    pub const fn shared(&self) -> &SharedLevel {
        &self.shared
    }

    /// Simulated RAM and handle table.
    #[inline]
    pub const fn memory(&self) -> &Memory {
        &self.shared.memory
    }

    /// Second-level cache.
    #[inline]
    pub const fn l2(&self) -> &L2Cache {
        &self.shared.l2
    }

    /// Handle table cache.
    #[inline]
    pub const fn handle_table(&self) -> &HandleTableCache {
        &self.shared.handle_table
    }

    fn split(&mut self, lane: LaneId) -> SimResult<(&mut ObjectCache, SnoopBus<'_>)> {
        let lanes = self.lanes.len();
        let unknown = SimError::UnknownLane { lane, lanes };
        if lane >= lanes {
            return Err(unknown);
        }
        let (before, rest) = self.lanes.split_at_mut(lane);
        let (cache, after) = rest.split_first_mut().ok_or(unknown)?;
        Ok((cache, SnoopBus::new(lane, before, after, &mut self.shared)))
    }

    /// Reads `(handle, offset)` on `lane`.
    ///
    /// # Errors
    ///
    /// `UnknownLane`, or any fatal error raised while servicing the access.
    pub fn read(&mut self, lane: LaneId, handle: u32, offset: u32) -> SimResult<Access> {
        let (cache, mut bus) = self.split(lane)?;
        cache.request_data(ObjAddr::new(handle, offset), &mut bus)
    }

    /// Writes `value` to `(handle, offset)` on `lane`.
    ///
    /// # Errors
    ///
    /// `UnknownLane`, or any fatal error raised while servicing the access.
    pub fn write(&mut self, lane: LaneId, handle: u32, offset: u32, value: Word) -> SimResult<Ticks> {
        let (cache, mut bus) = self.split(lane)?;
        cache.write_data(ObjAddr::new(handle, offset), value, &mut bus)
    }

    /// Explicit prefetch of `(handle, offset)` by `lane`.
    ///
    /// # Errors
    ///
    /// `UnknownLane`.
    pub fn prefetch(&mut self, lane: LaneId, handle: u32, offset: u32) -> SimResult<()> {
        let (cache, mut bus) = self.split(lane)?;
        cache.request_prefetch(ObjAddr::new(handle, offset), &mut bus);
        Ok(())
    }

    /// Writes back and invalidates the cache of `lane`.
    ///
    /// # Errors
    ///
    /// `UnknownLane`, or a write-back failure.
    pub fn flush(&mut self, lane: LaneId) -> SimResult<()> {
        let (cache, mut bus) = self.split(lane)?;
        cache.invalidate_flush(&mut bus)
    }

    /// Flushes every lane. `Memory` is current afterwards.
    ///
    /// # Errors
    ///
    /// The first write-back failure.
    pub fn flush_all(&mut self) -> SimResult<()> {
        for lane in 0..self.lanes.len() {
            self.flush(lane)?;
        }
        Ok(())
    }

    /// Services one queued prefetch request.
    ///
    /// Returns `false` if no request was pending.
    ///
    /// # Errors
    ///
    /// Fatal errors raised while fetching the line or evicting for it.
    pub fn tick(&mut self) -> SimResult<bool> {
        let Some(request) = self.shared.next_prefetch() else {
            return Ok(false);
        };
        let lanes = self.lanes.len();
        let cache = self.lanes.get(request.requester).ok_or(SimError::UnknownLane {
            lane: request.requester,
            lanes,
        })?;
        if request.addr.is_sentinel() || cache.line_for(request.addr).is_some() {
            self.shared.count_resident_prefetch();
            trace!(lane = request.requester, handle = request.addr.handle, "prefetch already resident");
            return Ok(true);
        }

        self.shared.count_serviced_prefetch();
        let (cache, mut bus) = self.split(request.requester)?;
        if let Some((line, from_l2)) = bus.fetch_prefetch(request.addr)? {
            cache.update_value(request.addr, &line, from_l2, &mut bus)?;
        }
        cache.prefetch_done(&request, &mut bus);
        Ok(true)
    }

    /// Services prefetch requests until none is pending; returns how many were taken.
    ///
    /// Look-ahead chains are bounded by the repeat limit, so this terminates.
    ///
    /// # Errors
    ///
    /// The first fatal error raised by `tick`.
    pub fn drain_prefetches(&mut self) -> SimResult<u64> {
        let mut serviced = 0;
        while self.tick()? {
            serviced += 1;
        }
        Ok(serviced)
    }

    /// Installs the handle table entry of `handle`, writing through to `Memory`.
    ///
    /// # Errors
    ///
    /// `HandleTableFull` or `MemoryFull`.
    pub fn register_handle(&mut self, handle: u32, entry: HtEntry) -> SimResult<Ticks> {
        let shared = &mut self.shared;
        shared.handle_table.write(handle, entry, &mut shared.memory)
    }

    /// Updates the flags of `handle`.
    ///
    /// # Errors
    ///
    /// `UnknownHandle`.
    pub fn set_flags(&mut self, handle: u32, flags: u32) -> SimResult<Ticks> {
        let shared = &mut self.shared;
        shared.handle_table.set_flags(handle, flags, &mut shared.memory)
    }

    /// Updates the monitor id of `handle`.
    ///
    /// # Errors
    ///
    /// `UnknownHandle`.
    pub fn set_monitor_id(&mut self, handle: u32, monitor_id: u32) -> SimResult<Ticks> {
        let shared = &mut self.shared;
        shared
            .handle_table
            .set_monitor_id(handle, monitor_id, &mut shared.memory)
    }

    /// Copies an initial image into RAM at `base`.
    ///
    /// # Errors
    ///
    /// `MemoryFull`.
    pub fn load_words(&mut self, base: u64, image: &[Word]) -> SimResult<()> {
        self.shared.memory.load_words(base, image)
    }

    /// Executes one trace operation and returns its wait ticks.
    ///
    /// # Errors
    ///
    /// Any fatal error of the underlying operation.
    pub fn execute(&mut self, op: &TraceOp) -> SimResult<Ticks> {
        match *op {
            TraceOp::Alloc { handle, entry } => self.register_handle(handle, entry),
            TraceOp::Read { lane, addr } => Ok(self.read(lane, addr.handle, addr.offset)?.ticks),
            TraceOp::Write { lane, addr, value } => {
                self.write(lane, addr.handle, addr.offset, value)
            }
            TraceOp::Prefetch { lane, addr } => {
                self.prefetch(lane, addr.handle, addr.offset)?;
                Ok(0)
            }
            TraceOp::Flush { lane } => {
                self.flush(lane)?;
                Ok(0)
            }
            TraceOp::Tick { cycles } => {
                for _ in 0..cycles {
                    let _ = self.tick()?;
                }
                Ok(0)
            }
        }
    }

    /// Replays `ops`, ticking once after every read or write so queued prefetches drain.
    ///
    /// # Errors
    ///
    /// The first fatal error; operations after it are not executed.
    pub fn replay(&mut self, ops: &[TraceOp]) -> SimResult<Replay> {
        let mut report = Replay::default();
        for op in ops {
            report.ticks += self.execute(op)?;
            if op.is_access() {
                report.accesses += 1;
                if self.tick()? {
                    report.prefetches += 1;
                }
            }
        }
        Ok(report)
    }

    /// Issued and used prefetches summed over every lane.
    pub fn prefetch_totals(&self) -> PrefetchTotals {
        let mut totals = PrefetchTotals::default();
        for lane in &self.lanes {
            totals += lane.prefetch_totals();
        }
        totals
    }

    /// Prints every table: lanes, handle table, L2, bus and prefetch totals.
    pub fn print_statistics(&self) {
        println!("\n==========================================================");
        println!("OBJECT MEMORY HIERARCHY STATISTICS");
        println!("==========================================================");
        for lane in &self.lanes {
            lane.print_statistics();
        }
        self.shared.handle_table.print_statistics();
        self.shared.l2.print_statistics();
        self.shared.stats().print();
        self.prefetch_totals().print();
        println!("==========================================================");
    }
}
