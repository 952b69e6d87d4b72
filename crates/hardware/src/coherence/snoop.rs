//! Reference Snooping Controller.
//!
//! `SharedLevel` owns everything below the first level (RAM, handle table cache, L2) plus
//! the per-lane prefetch queues. `SnoopBus` is a short-lived view built for one access:
//! it borrows the requesting lane's peers and the shared level, and implements
//! `CoherenceController` over them.
//!
//! # Protocols
//!
//! - **MOESI:** a write notification invalidates every peer copy.
//! - **Dragon:** a write notification pushes the new line into every peer copy and
//!   writes the written word through the L2, so update-mode lines never need a write-back.
//!
//! # Timing
//!
//! - Peer supply: `wpl / BUS_WIDTH_L1 + L1_FROM_L1_OVERHEAD`.
//! - L2 supply: `wpl / BUS_WIDTH_L2 + L1_FROM_L2_OVERHEAD + load_overhead`, plus the
//!   handle table lookup and RAM time for every word (physical) or line (virtual) the
//!   L2 does not hold.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::{CoherenceController, Fill, HandleInfo};
use crate::cache::{
    CacheLine, HandleTableCache, L2Addr, L2Cache, MoesiState, ObjectCache, PrefetchRequest,
};
use crate::common::constants::{
    BUS_WIDTH_L1, BUS_WIDTH_L2, L1_FROM_L1_OVERHEAD, L1_FROM_L2_OVERHEAD,
    PREFETCH_QUEUE_DEPTH, SINGLE_VALUE_TICKS,
};
use crate::common::{LaneId, LineGeometry, ObjAddr, SimResult, Ticks};
use crate::config::{CoherenceProtocol, Config, ConfigError, PrefetchStrategy};
use crate::memory::{HtEntry, Memory};
use crate::stats::BusStats;

/// Everything below the first level, shared by all lanes.
#[derive(Clone, Debug)]
pub struct SharedLevel {
    /// Simulated RAM and handle table.
    pub memory: Memory,
    /// Second-level cache.
    pub l2: L2Cache,
    /// Handle table cache.
    pub handle_table: HandleTableCache,
    geometry: LineGeometry,
    protocol: CoherenceProtocol,
    strategy: PrefetchStrategy,
    queues: Vec<VecDeque<PrefetchRequest>>,
    next_lane: usize,
    stats: BusStats,
}

impl SharedLevel {
    /// Builds RAM, L2 and handle table cache from a resolved configuration.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an invalid cache geometry.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.l1.validate()?;
        Ok(Self {
            memory: Memory::new(config.memory_words, config.handle_entries),
            l2: L2Cache::new(config.l2_addressing, &config.l2)?,
            handle_table: HandleTableCache::new(&config.handle_table)?,
            geometry: config.l1.geometry(),
            protocol: config.protocol,
            strategy: config.prefetch,
            queues: vec![VecDeque::with_capacity(PREFETCH_QUEUE_DEPTH); config.lanes],
            next_lane: 0,
            stats: BusStats::default(),
        })
    }

    /// Bus counters.
    #[inline]
    pub const fn stats(&self) -> &BusStats {
        &self.stats
    }

    /// Coherence protocol in use.
    #[inline]
    pub const fn protocol(&self) -> CoherenceProtocol {
        self.protocol
    }

    /// Prefetch strategy in use.
    #[inline]
    pub const fn strategy(&self) -> PrefetchStrategy {
        self.strategy
    }

    /// Geometry shared by every first-level cache.
    #[inline]
    pub const fn geometry(&self) -> LineGeometry {
        self.geometry
    }

    /// Queued prefetch requests across all lanes.
    pub fn pending_prefetches(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    fn enqueue(&mut self, request: PrefetchRequest) {
        let Some(queue) = self.queues.get_mut(request.requester) else {
            return;
        };
        if queue.len() == PREFETCH_QUEUE_DEPTH {
            if let Some(lost) = queue.pop_front() {
                warn!(
                    lane = lost.requester,
                    handle = lost.addr.handle,
                    offset = lost.addr.offset,
                    "prefetch queue full, oldest request dropped"
                );
            }
            self.stats.prefetches_dropped += 1;
        }
        queue.push_back(request);
    }

    /// Takes the next prefetch request: lanes in round-robin order, newest request first.
    pub fn next_prefetch(&mut self) -> Option<PrefetchRequest> {
        let lanes = self.queues.len();
        for step in 0..lanes {
            let lane = (self.next_lane + step) % lanes;
            if let Some(request) = self.queues[lane].pop_back() {
                self.next_lane = (lane + 1) % lanes;
                return Some(request);
            }
        }
        None
    }

    pub(crate) fn count_resident_prefetch(&mut self) {
        self.stats.prefetches_resident += 1;
    }

    pub(crate) fn count_serviced_prefetch(&mut self) {
        self.stats.prefetches_serviced += 1;
    }

    fn resolve(&mut self, handle: u32) -> SimResult<(HtEntry, Ticks)> {
        let read = self.handle_table.read(handle, &self.memory)?;
        Ok((read.entry, read.ticks))
    }

    /// Word addresses of every word of the line containing `addr`.
    fn line_addresses(&self, addr: ObjAddr, base: u32) -> impl Iterator<Item = L2Addr> + '_ {
        let tag = self.geometry.decode(addr).tag;
        let wpl = self.geometry.words_per_line() as usize;
        (0..wpl).map(move |i| {
            let object = self.geometry.encode(tag, i);
            L2Addr::new(object, u64::from(base) + u64::from(object.offset))
        })
    }

    /// Returns `true` if the L2 holds the whole line containing `addr`.
    fn l2_holds_line(&mut self, addr: ObjAddr) -> SimResult<bool> {
        let (entry, _) = self.resolve(addr.handle)?;
        let words: Vec<L2Addr> = self.line_addresses(addr, entry.address).collect();
        let (Some(first), Some(last)) = (words.first(), words.last()) else {
            return Ok(false);
        };
        Ok(if self.l2.is_physically_addressed() {
            self.l2.holds(*first) && self.l2.holds(*last)
        } else {
            self.l2.holds(*first)
        })
    }

    /// Reads the line containing `addr` through the L2.
    fn line_from_l2(&mut self, addr: ObjAddr) -> SimResult<Fill> {
        let (entry, mut ticks) = self.resolve(addr.handle)?;
        let words: Vec<L2Addr> = self.line_addresses(addr, entry.address).collect();
        let ram = self.l2.ram_access_ticks();

        if !self.l2.is_physically_addressed() {
            if let Some(first) = words.first() {
                if !self.l2.holds(*first) {
                    ticks += ram;
                }
            }
        }
        let mut data = Vec::with_capacity(words.len());
        for word in words {
            if word.physical >= self.memory.len() as u64 {
                data.push(0);
                continue;
            }
            if self.l2.is_physically_addressed() && !self.l2.holds(word) {
                ticks += ram;
            }
            let access = self.l2.read(word, &self.memory);
            ticks += access.ticks;
            data.push(access.value);
        }

        let wpl = u64::from(self.geometry.words_per_line());
        ticks += wpl / BUS_WIDTH_L2 + L1_FROM_L2_OVERHEAD + self.l2.load_overhead();
        Ok(Fill {
            line: CacheLine::with_data(data),
            ticks,
        })
    }

    /// Writes the single word at `addr` through the L2.
    fn word_to_l2(&mut self, addr: ObjAddr, line: &CacheLine) -> SimResult<()> {
        let (entry, _) = self.resolve(addr.handle)?;
        let physical = u64::from(entry.address) + u64::from(addr.offset);
        if physical < self.memory.len() as u64 {
            let value = line.word(self.geometry.decode(addr).block_offset);
            let _ = self
                .l2
                .write(L2Addr::new(addr, physical), value, &mut self.memory);
        }
        Ok(())
    }

    /// Writes words `0..=max_offset` of `line` through the L2.
    fn line_to_l2(&mut self, addr: ObjAddr, line: &CacheLine) -> SimResult<()> {
        let (entry, _) = self.resolve(addr.handle)?;
        let words: Vec<L2Addr> = self.line_addresses(addr, entry.address).collect();
        let last = line.max_offset.min(line.len().saturating_sub(1));
        for (i, word) in words.into_iter().enumerate().take(last + 1) {
            if word.physical >= self.memory.len() as u64 {
                continue;
            }
            let _ = self.l2.write(word, line.word(i), &mut self.memory);
        }
        Ok(())
    }
}

/// Controller view for one access by `requester`.
#[derive(Debug)]
pub struct SnoopBus<'a> {
    requester: LaneId,
    before: &'a mut [ObjectCache],
    after: &'a mut [ObjectCache],
    shared: &'a mut SharedLevel,
    from_l2: bool,
    exclusive: bool,
}

impl<'a> SnoopBus<'a> {
    /// Creates a view for `requester`, whose peers are `before` and `after`.
    pub fn new(
        requester: LaneId,
        before: &'a mut [ObjectCache],
        after: &'a mut [ObjectCache],
        shared: &'a mut SharedLevel,
    ) -> Self {
        Self {
            requester,
            before,
            after,
            shared,
            from_l2: false,
            exclusive: true,
        }
    }

    /// Lane this view was built for.
    #[inline]
    pub const fn requester(&self) -> LaneId {
        self.requester
    }

    /// Snoops every peer with `check_state` and copies the line from the best supplier:
    /// the first owner (`E`, `M` or `O`), otherwise the last sharer.
    fn snoop_peers(&mut self, addr: ObjAddr) -> Option<CacheLine> {
        let mut supplier = None;
        let mut owner_found = false;
        for peer in self.before.iter_mut().chain(self.after.iter_mut()) {
            match peer.check_state(addr) {
                MoesiState::Invalid => {}
                MoesiState::Shared => {
                    if !owner_found {
                        supplier = peer.line_for(addr).cloned();
                    }
                }
                MoesiState::Exclusive | MoesiState::Owned | MoesiState::Modified => {
                    if !owner_found {
                        supplier = peer.line_for(addr).cloned();
                        owner_found = true;
                    }
                }
            }
        }
        supplier
    }

    /// Finds a line for a queued prefetch of `addr`.
    ///
    /// Returns the line and whether the L2 supplied it, or `None` when neither a peer nor
    /// the L2 holds it; the L2 is then only warmed.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if the prefetch walked off a registered object's handle.
    pub fn fetch_prefetch(&mut self, addr: ObjAddr) -> SimResult<Option<(CacheLine, bool)>> {
        if let Some(line) = self.snoop_peers(addr) {
            self.shared.stats.peer_supplies += 1;
            return Ok(Some((line, false)));
        }
        if self.shared.l2_holds_line(addr)? {
            let fill = self.shared.line_from_l2(addr)?;
            return Ok(Some((fill.line, true)));
        }
        let (entry, _) = self.shared.resolve(addr.handle)?;
        let first = self.shared.line_addresses(addr, entry.address).next();
        if let Some(first) = first {
            let _ = self.shared.l2.prefetch(first);
        }
        Ok(None)
    }
}

impl CoherenceController for SnoopBus<'_> {
    fn request_data(&mut self, addr: ObjAddr, requester: LaneId) -> SimResult<Fill> {
        self.from_l2 = false;
        self.exclusive = true;
        self.shared.stats.lines_loaded += 1;

        if let Some(line) = self.snoop_peers(addr) {
            self.exclusive = false;
            self.shared.stats.peer_supplies += 1;
            let wpl = u64::from(self.shared.geometry.words_per_line());
            debug!(lane = requester, handle = addr.handle, offset = addr.offset, "supplied by peer");
            return Ok(Fill {
                line,
                ticks: wpl / BUS_WIDTH_L1 + L1_FROM_L1_OVERHEAD,
            });
        }

        self.from_l2 = true;
        debug!(lane = requester, handle = addr.handle, offset = addr.offset, "supplied by l2");
        self.shared.line_from_l2(addr)
    }

    fn request_handle_table(
        &mut self,
        handle: u32,
        _is_write: bool,
        _requester: LaneId,
    ) -> SimResult<HandleInfo> {
        let read = self.shared.handle_table.read(handle, &self.shared.memory)?;
        Ok(HandleInfo {
            ticks: read.ticks,
            array_length: read.entry.size,
            type_id: read.entry.type_id,
        })
    }

    fn write_back(
        &mut self,
        addr: ObjAddr,
        line: CacheLine,
        is_prefetch_evict: bool,
        requester: LaneId,
    ) -> SimResult<()> {
        debug!(
            lane = requester,
            handle = addr.handle,
            offset = addr.offset,
            words = line.max_offset + 1,
            is_prefetch_evict,
            "write back to l2"
        );
        self.shared.line_to_l2(addr, &line)
    }

    fn write_notification(
        &mut self,
        addr: ObjAddr,
        line: &CacheLine,
        _requester: LaneId,
    ) -> SimResult<Ticks> {
        self.shared.stats.write_notifications += 1;
        match self.shared.protocol {
            CoherenceProtocol::Moesi => {
                for peer in self.before.iter_mut().chain(self.after.iter_mut()) {
                    peer.write_notification(addr);
                }
                self.exclusive = true;
                Ok(SINGLE_VALUE_TICKS)
            }
            CoherenceProtocol::Dragon => {
                let mut updated = false;
                for peer in self.before.iter_mut().chain(self.after.iter_mut()) {
                    updated |= peer.update_notification(addr, line);
                }
                self.exclusive = !updated;
                self.shared.word_to_l2(addr, line)?;
                Ok(u64::from(self.shared.geometry.words_per_line()) / BUS_WIDTH_L1)
            }
        }
    }

    fn request_data_prefetch(&mut self, addr: ObjAddr, requester: LaneId) {
        self.shared.enqueue(PrefetchRequest { addr, requester });
    }

    fn from_l2_cache(&self) -> bool {
        self.from_l2
    }

    fn is_data_exclusive(&self) -> bool {
        self.exclusive
    }

    fn updating_l2_cache(&self) -> bool {
        self.shared.protocol.is_update()
    }

    fn prefetch_strategy(&self) -> PrefetchStrategy {
        self.shared.strategy
    }

    fn l2_cache(&self) -> &L2Cache {
        &self.shared.l2
    }
}
