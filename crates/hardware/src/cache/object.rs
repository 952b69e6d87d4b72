//! Per-Lane Object Cache.
//!
//! The first-level data cache of one execution lane. It is addressed by `(handle, offset)`
//! pairs and kept coherent with its peers by a MOESI state machine whose verdicts come
//! from an external `CoherenceController`.
//!
//! # Transitions
//!
//! | Event                        | Resulting state                                 |
//! |------------------------------|-------------------------------------------------|
//! | Read miss                    | `E` if supplied by the L2, else `S`             |
//! | Write hit, invalidate mode   | `E -> M`, `S/O -> O` after notification         |
//! | Write hit, update mode       | `E` if the controller reports no sharer, else `S` |
//! | Write miss, invalidate mode  | `M` if exclusive, else `O`                      |
//! | Write miss, update mode      | `E` if exclusive, else `S`                      |
//! | Peer snoop (`check_state`)   | `E -> S`, `M -> O`                              |
//! | Peer write (`write_notification`) | `I`                                        |
//! | Peer update (`update_notification`) | `S`                                      |
//!
//! `M` and `O` lines are written back through the controller before their slot is
//! reused and on `invalidate_flush`.

use tracing::{debug, trace};

use super::Access;
use super::line::{CacheLine, MoesiState};
use super::policies::{PlruPolicy, ReplacementPolicy};
use super::prefetch::{PrefetchRequest, PrefetchSource, PrefetchTracker};
use crate::coherence::CoherenceController;
use crate::common::constants::{ARRAY_LENGTH_OFFSET, QUERY_LIMIT};
use crate::common::{Decoded, LaneId, LineGeometry, ObjAddr, SimResult, Ticks, Word};
use crate::config::{CacheConfig, ConfigError, PrefetchStrategy};
use crate::stats::{CacheStats, PrefetchTotals};

/// Which direction a demand miss came from, for the reload counters.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// First-level cache of one lane.
#[derive(Clone, Debug)]
pub struct ObjectCache {
    id: LaneId,
    geometry: LineGeometry,
    ways: usize,
    miss_ticks: Ticks,
    lines: Vec<CacheLine>,
    policy: PlruPolicy,
    prefetch: PrefetchTracker,
    replacements: Vec<u32>,
    stats: CacheStats,
}

impl ObjectCache {
    /// Builds the cache of lane `id`.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the configuration does not describe a power-of-two geometry.
    pub fn new(id: LaneId, config: &CacheConfig, repeat_limit: u32) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry = config.geometry();
        let lines = geometry.lines();
        Ok(Self {
            id,
            geometry,
            ways: config.sets,
            miss_ticks: config.ext_memory_ticks,
            lines: vec![CacheLine::new(config.words_per_line); lines * config.sets],
            policy: PlruPolicy::new(lines, config.sets)?,
            prefetch: PrefetchTracker::new(repeat_limit),
            replacements: vec![0; lines],
            stats: CacheStats::default(),
        })
    }

    /// Lane this cache belongs to.
    #[inline]
    pub const fn id(&self) -> LaneId {
        self.id
    }

    /// Address geometry.
    #[inline]
    pub const fn geometry(&self) -> LineGeometry {
        self.geometry
    }

    /// Associativity.
    #[inline]
    pub const fn ways(&self) -> usize {
        self.ways
    }

    /// Configured fetch-miss latency.
    #[inline]
    pub const fn miss_ticks(&self) -> Ticks {
        self.miss_ticks
    }

    /// Demand access counters.
    #[inline]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Prefetch counters.
    #[inline]
    pub const fn prefetch_totals(&self) -> PrefetchTotals {
        self.prefetch.totals()
    }

    #[inline]
    fn slot(&self, index: usize, way: usize) -> usize {
        index * self.ways + way
    }

    fn lookup(&self, d: &Decoded) -> Option<usize> {
        let base = d.index * self.ways;
        let scheme = self.geometry.scheme();
        self.lines[base..base + self.ways]
            .iter()
            .position(|line| line.matches(d.tag, scheme))
    }

    fn tag_present_but_invalid(&self, d: &Decoded) -> bool {
        let base = d.index * self.ways;
        self.lines[base..base + self.ways]
            .iter()
            .any(|line| !line.valid && line.tag == d.tag)
    }

    /// Line holding `addr`, if resident.
    pub fn line_for(&self, addr: ObjAddr) -> Option<&CacheLine> {
        let d = self.geometry.decode(addr);
        self.lookup(&d).map(|way| &self.lines[self.slot(d.index, way)])
    }

    /// Every way of set `index`; empty past the last index.
    pub fn set(&self, index: usize) -> &[CacheLine] {
        let base = index.saturating_mul(self.ways);
        self.lines
            .get(base..base.saturating_add(self.ways))
            .unwrap_or_default()
    }

    /// MOESI state of the line holding `addr`; `Invalid` if not resident.
    pub fn state(&self, addr: ObjAddr) -> MoesiState {
        self.line_for(addr).map_or(MoesiState::Invalid, |line| line.state)
    }

    /// Reads the word at `addr`.
    ///
    /// The two sentinel offsets return the array length and the type id of the handle.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors raised by the controller while filling or writing back.
    pub fn request_data(
        &mut self,
        addr: ObjAddr,
        ctrl: &mut dyn CoherenceController,
    ) -> SimResult<Access> {
        if addr.is_sentinel() {
            let info = ctrl.request_handle_table(addr.handle, false, self.id)?;
            let value = if addr.offset == ARRAY_LENGTH_OFFSET {
                info.array_length
            } else {
                info.type_id
            };
            return Ok(Access::new(value as Word, info.ticks));
        }

        self.stats.reads += 1;
        let d = self.geometry.decode(addr);
        let access = if let Some(way) = self.lookup(&d) {
            self.stats.read_hits += 1;
            let _ = self.prefetch.consume(d.tag);
            self.policy.update(d.index, way);
            trace!(lane = self.id, handle = addr.handle, offset = addr.offset, "read hit");
            Access::new(self.lines[self.slot(d.index, way)].word(d.block_offset), 0)
        } else {
            self.stats.read_misses += 1;
            if self.tag_present_but_invalid(&d) {
                self.stats.read_tag_invalid += 1;
            }
            let (way, ticks) = self.fill(addr, &d, Direction::Read, ctrl)?;
            let slot = self.slot(d.index, way);
            let line = &mut self.lines[slot];
            line.state = if ctrl.from_l2_cache() {
                MoesiState::Exclusive
            } else {
                MoesiState::Shared
            };
            let value = line.word(d.block_offset);
            self.policy.update(d.index, way);
            Access::new(value, ticks)
        };

        self.prefetch_next(addr, ctrl);
        Ok(access)
    }

    /// Writes `value` to `addr` and returns the latency.
    ///
    /// Writes to the sentinel offsets are charged as handle table accesses and leave
    /// the metadata unchanged.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors raised by the controller.
    pub fn write_data(
        &mut self,
        addr: ObjAddr,
        value: Word,
        ctrl: &mut dyn CoherenceController,
    ) -> SimResult<Ticks> {
        if addr.is_sentinel() {
            return Ok(ctrl.request_handle_table(addr.handle, true, self.id)?.ticks);
        }

        self.stats.writes += 1;
        let d = self.geometry.decode(addr);
        let mut ticks = 0;
        if let Some(way) = self.lookup(&d) {
            self.stats.write_hits += 1;
            let _ = self.prefetch.consume(d.tag);
            let slot = self.slot(d.index, way);
            let line = &mut self.lines[slot];
            line.set_word(d.block_offset, value);
            line.dirty = true;

            if ctrl.updating_l2_cache() {
                ticks += ctrl.write_notification(addr, &self.lines[slot], self.id)?;
                self.lines[slot].state = if ctrl.is_data_exclusive() {
                    MoesiState::Exclusive
                } else {
                    MoesiState::Shared
                };
            } else {
                match self.lines[slot].state {
                    MoesiState::Exclusive => self.lines[slot].state = MoesiState::Modified,
                    MoesiState::Shared | MoesiState::Owned => {
                        ticks += ctrl.write_notification(addr, &self.lines[slot], self.id)?;
                        self.lines[slot].state = MoesiState::Owned;
                    }
                    MoesiState::Modified | MoesiState::Invalid => {}
                }
            }
            self.policy.update(d.index, way);
            trace!(lane = self.id, handle = addr.handle, offset = addr.offset, "write hit");
        } else {
            self.stats.write_misses += 1;
            if self.tag_present_but_invalid(&d) {
                self.stats.write_tag_invalid += 1;
            }
            let (way, fill_ticks) = self.fill(addr, &d, Direction::Write, ctrl)?;
            let from_l2 = ctrl.from_l2_cache();
            ticks += 1 + fill_ticks;

            let slot = self.slot(d.index, way);
            let line = &mut self.lines[slot];
            line.set_word(d.block_offset, value);
            line.dirty = true;

            if ctrl.updating_l2_cache() {
                ticks += ctrl.write_notification(addr, &self.lines[slot], self.id)?;
                self.lines[slot].state = if ctrl.is_data_exclusive() {
                    MoesiState::Exclusive
                } else {
                    MoesiState::Shared
                };
            } else {
                if !from_l2 {
                    ticks += ctrl.write_notification(addr, &self.lines[slot], self.id)?;
                }
                self.lines[slot].state = if ctrl.is_data_exclusive() {
                    MoesiState::Modified
                } else {
                    MoesiState::Owned
                };
            }
            self.policy.update(d.index, way);
        }

        self.prefetch_next(addr, ctrl);
        Ok(ticks)
    }

    /// Fetches the line of `addr` into a free or evicted way and returns the way and
    /// the fill latency. The new line is valid and clean; the caller sets its state.
    /// A peer-supplied line keeps the peer's write-back extent.
    fn fill(
        &mut self,
        addr: ObjAddr,
        d: &Decoded,
        direction: Direction,
        ctrl: &mut dyn CoherenceController,
    ) -> SimResult<(usize, Ticks)> {
        let way = self.make_room(d.index, false, ctrl)?;
        let fill = ctrl.request_data(addr, self.id)?;
        let from_l2 = ctrl.from_l2_cache();
        match (direction, from_l2) {
            (Direction::Read, true) => self.stats.read_reload_l2 += 1,
            (Direction::Read, false) => self.stats.read_reload_l1 += 1,
            (Direction::Write, true) => self.stats.write_reload_l2 += 1,
            (Direction::Write, false) => self.stats.write_reload_l1 += 1,
        }
        debug!(
            lane = self.id,
            handle = addr.handle,
            offset = addr.offset,
            from_l2,
            ticks = fill.ticks,
            "line filled"
        );

        let scheme = self.geometry.scheme();
        let slot = self.slot(d.index, way);
        let line = &mut self.lines[slot];
        line.copy_data_from(&fill.line);
        line.tag = d.tag;
        line.scheme = scheme;
        line.valid = true;
        line.dirty = false;
        // A peer copy may carry words its owner never wrote back.
        line.max_offset = if from_l2 { 0 } else { fill.line.max_offset };
        Ok((way, fill.ticks))
    }

    /// Picks a victim way in `index`, writing it back first if it is `M` or `O`.
    fn make_room(
        &mut self,
        index: usize,
        is_prefetch_evict: bool,
        ctrl: &mut dyn CoherenceController,
    ) -> SimResult<usize> {
        let base = index * self.ways;
        let valid_ways = self.lines[base..base + self.ways]
            .iter()
            .enumerate()
            .filter(|(_, line)| line.valid)
            .fold(0u64, |mask, (way, _)| mask | (1u64 << way));
        let way = self.policy.select_victim(index, valid_ways);

        let victim = &mut self.lines[base + way];
        if victim.valid {
            self.replacements[index] += 1;
            self.prefetch.forget(victim.tag);
            if victim.state.is_dirty() {
                let copy = victim.clone();
                let addr = self.geometry.encode(copy.tag, 0);
                debug!(
                    lane = self.id,
                    handle = addr.handle,
                    offset = addr.offset,
                    state = ?copy.state,
                    is_prefetch_evict,
                    "write back on eviction"
                );
                ctrl.write_back(addr, copy, is_prefetch_evict, self.id)?;
            }
            self.lines[base + way].invalidate();
        }
        Ok(way)
    }

    /// Requests the next line of the object when linear prefetching is enabled.
    fn prefetch_next(&mut self, addr: ObjAddr, ctrl: &mut dyn CoherenceController) {
        if ctrl.prefetch_strategy() != PrefetchStrategy::Linear {
            return;
        }
        let next = addr.advance(self.geometry.words_per_line());
        if !self.holds_value(next) {
            ctrl.request_data_prefetch(next, self.id);
            self.prefetch.reset_chain();
        }
    }

    /// Snoop from a peer's miss: downgrades `E -> S` and `M -> O` and returns the state
    /// the line had before. `Invalid` if the line is not resident.
    pub fn check_state(&mut self, addr: ObjAddr) -> MoesiState {
        let d = self.geometry.decode(addr);
        match self.lookup(&d) {
            Some(way) => {
                let slot = self.slot(d.index, way);
                let previous = self.lines[slot].state;
                self.lines[slot].state = previous.downgraded();
                previous
            }
            None => MoesiState::Invalid,
        }
    }

    /// Invalidation from a peer's write.
    pub fn write_notification(&mut self, addr: ObjAddr) {
        let d = self.geometry.decode(addr);
        if let Some(way) = self.lookup(&d) {
            let slot = self.slot(d.index, way);
            debug!(lane = self.id, handle = addr.handle, offset = addr.offset, "invalidated by peer");
            self.lines[slot].invalidate();
        }
    }

    /// Update from a peer's write: takes the peer's data and becomes `Shared`.
    ///
    /// Returns `true` if the line was resident.
    pub fn update_notification(&mut self, addr: ObjAddr, line: &CacheLine) -> bool {
        let d = self.geometry.decode(addr);
        let Some(way) = self.lookup(&d) else {
            return false;
        };
        let slot = self.slot(d.index, way);
        let local = &mut self.lines[slot];
        local.copy_data_from(line);
        local.max_offset = line.max_offset;
        local.state = MoesiState::Shared;
        self.stats.cacheline_updates += 1;
        true
    }

    /// Installs a prefetched line containing `addr`.
    ///
    /// Does nothing if the line is already resident. A dirty victim is written back
    /// with `is_prefetch_evict` set.
    ///
    /// # Errors
    ///
    /// Propagates write-back failures.
    pub fn update_value(
        &mut self,
        addr: ObjAddr,
        line: &CacheLine,
        from_l2: bool,
        ctrl: &mut dyn CoherenceController,
    ) -> SimResult<()> {
        let d = self.geometry.decode(addr);
        if self.lookup(&d).is_some() {
            return Ok(());
        }
        let way = self.make_room(d.index, true, ctrl)?;
        let scheme = self.geometry.scheme();
        let slot = self.slot(d.index, way);
        let local = &mut self.lines[slot];
        local.copy_data_from(line);
        local.tag = d.tag;
        local.scheme = scheme;
        local.valid = true;
        local.dirty = false;
        local.max_offset = if from_l2 { 0 } else { line.max_offset };
        local.state = if from_l2 {
            MoesiState::Exclusive
        } else {
            MoesiState::Shared
        };
        self.policy.update(d.index, way);

        let source = if from_l2 {
            PrefetchSource::L2
        } else {
            PrefetchSource::L1
        };
        self.prefetch.record_install(d.tag, source);
        debug!(lane = self.id, handle = addr.handle, offset = addr.offset, ?source, "prefetch installed");
        Ok(())
    }

    /// Completion callback of a serviced prefetch: may chain a look-ahead request
    /// `2^(n+1) - 1` lines past `request`.
    pub fn prefetch_done(&mut self, request: &PrefetchRequest, ctrl: &mut dyn CoherenceController) {
        let Some(distance) = self.prefetch.next_look_ahead() else {
            return;
        };
        if ctrl.prefetch_strategy() == PrefetchStrategy::Linear {
            let words = self.geometry.words_per_line().wrapping_mul(distance);
            ctrl.request_data_prefetch(request.addr.advance(words), self.id);
        }
    }

    /// Explicit prefetch of the line containing `addr`, issued by the lane.
    ///
    /// Ignored for sentinel or out-of-range addresses and for resident lines.
    pub fn request_prefetch(&mut self, addr: ObjAddr, ctrl: &mut dyn CoherenceController) {
        if addr.is_sentinel() || addr.handle > QUERY_LIMIT || addr.offset > QUERY_LIMIT {
            return;
        }
        if !self.holds_value(addr) {
            ctrl.request_data_prefetch(addr, self.id);
            self.prefetch.reset_chain();
        }
    }

    /// Writes back every `M`/`O` line and invalidates the whole cache.
    ///
    /// # Errors
    ///
    /// Propagates write-back failures; lines not yet visited stay resident.
    pub fn invalidate_flush(&mut self, ctrl: &mut dyn CoherenceController) -> SimResult<()> {
        for slot in 0..self.lines.len() {
            let line = &self.lines[slot];
            if line.valid && line.state.is_dirty() {
                let addr = self.geometry.encode(line.tag, 0);
                ctrl.write_back(addr, line.clone(), false, self.id)?;
            }
            self.lines[slot].invalidate();
        }
        self.prefetch.clear_pending();
        debug!(lane = self.id, "cache flushed");
        Ok(())
    }

    /// Presence check. `false` for sentinel offsets and for handles or offsets above
    /// `0xFFFF`.
    pub fn holds_value(&self, addr: ObjAddr) -> bool {
        if addr.is_sentinel() || addr.handle > QUERY_LIMIT || addr.offset > QUERY_LIMIT {
            return false;
        }
        self.lookup(&self.geometry.decode(addr)).is_some()
    }

    /// Fraction of slots not `Invalid`.
    pub fn usage(&self) -> f64 {
        let used = self
            .lines
            .iter()
            .filter(|line| line.state != MoesiState::Invalid)
            .count();
        used as f64 / self.lines.len() as f64
    }

    /// Per-index count of valid lines evicted since the previous call.
    pub fn replacement_pressure(&mut self) -> Vec<u32> {
        std::mem::replace(&mut self.replacements, vec![0; self.geometry.lines()])
    }

    /// Zeroes every counter and drops pending prefetch entries.
    pub fn reset_statistics(&mut self) {
        self.stats = CacheStats::default();
        self.prefetch.reset();
        self.replacements.fill(0);
    }

    /// Prints the statistics table of this lane.
    pub fn print_statistics(&self) {
        let s = &self.stats;
        let p = self.prefetch.totals();
        println!("----------------------------------------------------------");
        println!("OBJECT CACHE {}", self.id);
        println!("  reads                  {}", s.reads);
        println!("    hits                 {}", s.read_hits);
        println!("    misses               {} ({:.2}%)", s.read_misses, s.read_miss_rate());
        println!("    tag_invalid          {}", s.read_tag_invalid);
        println!("    reload_from_l1       {}", s.read_reload_l1);
        println!("    reload_from_l2       {}", s.read_reload_l2);
        println!("  writes                 {}", s.writes);
        println!("    hits                 {}", s.write_hits);
        println!("    misses               {} ({:.2}%)", s.write_misses, s.write_miss_rate());
        println!("    tag_invalid          {}", s.write_tag_invalid);
        println!("    reload_from_l1       {}", s.write_reload_l1);
        println!("    reload_from_l2       {}", s.write_reload_l2);
        println!("  cacheline_updates      {}", s.cacheline_updates);
        println!("  prefetch_issued        {} (l1 {}, l2 {})", p.issued(), p.issued_l1, p.issued_l2);
        println!(
            "  prefetch_used          {} ({:.2}%)",
            p.used(),
            p.used_rate()
        );
        println!("  usage                  {:.2}%", self.usage() * 100.0);
    }
}
