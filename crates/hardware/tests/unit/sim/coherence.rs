//! Cross-Lane Coherence Tests.
//!
//! Two or more lanes share one snooping bus. Checks the MOESI hand-offs between them,
//! Dragon updates, and, with randomized interleavings over small caches, that every read
//! sees the last write, a final flush leaves RAM current, no set holds a line twice and an
//! exclusively held line has no other holder.

use std::collections::HashMap;

use heapsim_core::System;
use heapsim_core::cache::{MoesiState, ObjectCache};
use heapsim_core::common::{ObjAddr, Word};
use heapsim_core::config::{CacheConfig, CoherenceProtocol, Config, PrefetchStrategy};
use heapsim_core::memory::HtEntry;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::harness::{OBJECT, TestSystem, direct_mapped, init_tracing, two_way};

const PEER_LINE: u64 = 8 / 8 + 3;
const X: ObjAddr = ObjAddr::new(OBJECT, 0);

fn state(t: &TestSystem, lane: usize, addr: ObjAddr) -> MoesiState {
    t.sys.lane(lane).unwrap().state(addr)
}

#[test]
fn shared_reader_is_invalidated_by_owner_write() {
    let mut t = TestSystem::new(2, CoherenceProtocol::Moesi, PrefetchStrategy::None);

    let _ = t.sys.read(0, OBJECT, 0).unwrap();
    assert_eq!(state(&t, 0, X), MoesiState::Exclusive);

    let b = t.sys.read(1, OBJECT, 0).unwrap();
    assert_eq!((b.value, b.ticks), (0, PEER_LINE));
    assert_eq!(state(&t, 0, X), MoesiState::Shared);
    assert_eq!(state(&t, 1, X), MoesiState::Shared);

    assert_eq!(t.sys.write(0, OBJECT, 0, 5).unwrap(), 1);
    assert_eq!(state(&t, 0, X), MoesiState::Owned);
    assert_eq!(state(&t, 1, X), MoesiState::Invalid);

    let again = t.sys.read(1, OBJECT, 0).unwrap();
    assert_eq!((again.value, again.ticks), (5, PEER_LINE));
    assert_eq!(state(&t, 0, X), MoesiState::Owned);
    assert_eq!(state(&t, 1, X), MoesiState::Shared);

    let bus = t.sys.shared().stats();
    assert_eq!(bus.lines_loaded, 3);
    assert_eq!(bus.peer_supplies, 2);
    assert_eq!(bus.write_notifications, 1);
}

#[test]
fn write_miss_takes_ownership_from_modified_peer() {
    let mut t = TestSystem::new(2, CoherenceProtocol::Moesi, PrefetchStrategy::None);
    let _ = t.sys.write(0, OBJECT, 0, 5).unwrap();
    assert_eq!(state(&t, 0, X), MoesiState::Modified);

    assert_eq!(t.sys.write(1, OBJECT, 1, 7).unwrap(), 1 + PEER_LINE + 1);
    assert_eq!(state(&t, 0, X), MoesiState::Invalid);
    assert_eq!(state(&t, 1, X), MoesiState::Modified);

    let read = t.sys.read(1, OBJECT, 0).unwrap();
    assert_eq!((read.value, read.ticks), (5, 0));
}

#[test]
fn words_of_an_invalidated_owner_survive_the_hand_off() {
    let mut t = TestSystem::new(2, CoherenceProtocol::Moesi, PrefetchStrategy::None);
    let _ = t.sys.write(0, OBJECT, 5, 55).unwrap();
    let _ = t.sys.read(1, OBJECT, 0).unwrap();
    let _ = t.sys.write(1, OBJECT, 1, 11).unwrap();
    assert_eq!(state(&t, 0, X), MoesiState::Invalid);
    assert_eq!(state(&t, 1, X), MoesiState::Owned);

    t.sys.flush_all().unwrap();
    assert_eq!(t.ram(1), 11);
    assert_eq!(t.ram(5), 55);
}

#[test]
fn dragon_pushes_writes_into_sharers() {
    let mut t = TestSystem::new(2, CoherenceProtocol::Dragon, PrefetchStrategy::None);
    let _ = t.sys.read(0, OBJECT, 0).unwrap();
    let _ = t.sys.read(1, OBJECT, 0).unwrap();

    assert_eq!(t.sys.write(0, OBJECT, 0, 42).unwrap(), 1);
    assert_eq!(state(&t, 0, X), MoesiState::Shared);
    assert_eq!(state(&t, 1, X), MoesiState::Shared);
    assert_eq!(t.ram(0), 42);

    let b = t.sys.read(1, OBJECT, 0).unwrap();
    assert_eq!((b.value, b.ticks), (42, 0));
    assert_eq!(t.sys.lane(1).unwrap().stats().cacheline_updates, 1);
}

#[test]
fn dragon_sole_holder_stays_exclusive() {
    let mut t = TestSystem::new(2, CoherenceProtocol::Dragon, PrefetchStrategy::None);
    let _ = t.sys.read(0, OBJECT, 0).unwrap();
    let _ = t.sys.write(0, OBJECT, 0, 9).unwrap();
    assert_eq!(state(&t, 0, X), MoesiState::Exclusive);
    assert_eq!(t.sys.lane(1).unwrap().stats().cacheline_updates, 0);
}

// ══════════════════════════════════════════════════════════
// Randomized interleavings
// ══════════════════════════════════════════════════════════

const HANDLES: u32 = 4;
const WORDS: u32 = 256;

#[derive(Clone, Debug)]
struct Op {
    lane: usize,
    handle: u32,
    offset: u32,
    write: Option<Word>,
}

fn op() -> impl Strategy<Value = Op> {
    (0usize..3, 1..=HANDLES, 0..WORDS, prop::option::of(any::<Word>())).prop_map(
        |(lane, handle, offset, write)| Op {
            lane,
            handle,
            offset,
            write,
        },
    )
}

fn protocol() -> impl Strategy<Value = CoherenceProtocol> {
    prop_oneof![Just(CoherenceProtocol::Moesi), Just(CoherenceProtocol::Dragon)]
}

fn base(handle: u32) -> u32 {
    handle * 4096
}

/// Three lanes of a 32-index direct-mapped cache over four 256-word objects.
fn crowded(protocol: CoherenceProtocol) -> System {
    init_tracing();
    let config = Config {
        l1: direct_mapped(),
        lanes: 3,
        protocol,
        memory_words: 64 * 1024,
        handle_entries: 16,
        ..Config::default()
    };
    let mut sys = System::new(&config).unwrap();
    for h in 1..=HANDLES {
        let _ = sys
            .register_handle(h, HtEntry::new(base(h), WORDS, 0))
            .unwrap();
    }
    sys
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reads_see_last_write_and_flush_makes_ram_current(
        protocol in protocol(),
        ops in prop::collection::vec(op(), 1..400),
    ) {
        let mut sys = crowded(protocol);
        let mut model: HashMap<(u32, u32), Word> = HashMap::new();

        for op in &ops {
            match op.write {
                Some(value) => {
                    let _ = sys.write(op.lane, op.handle, op.offset, value).unwrap();
                    let _ = model.insert((op.handle, op.offset), value);
                }
                None => {
                    let read = sys.read(op.lane, op.handle, op.offset).unwrap();
                    let expected = model.get(&(op.handle, op.offset)).copied().unwrap_or(0);
                    prop_assert_eq!(read.value, expected);
                }
            }
        }

        sys.flush_all().unwrap();
        for ((handle, offset), value) in &model {
            let physical = u64::from(base(*handle) + *offset);
            prop_assert_eq!(sys.memory().read(physical), *value);
        }
        for lane in 0..3 {
            prop_assert_eq!(sys.lane(lane).unwrap().usage(), 0.0);
        }
    }
}

// ══════════════════════════════════════════════════════════
// Residency
// ══════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
enum Step {
    Read(usize, u32, u32),
    Write(usize, u32, u32, Word),
    Prefetch(usize, u32, u32),
    Tick,
}

fn step() -> impl Strategy<Value = Step> {
    let at = (0usize..3, 1..=HANDLES, 0..WORDS);
    prop_oneof![
        3 => at.clone().prop_map(|(l, h, o)| Step::Read(l, h, o)),
        3 => (at.clone(), any::<Word>()).prop_map(|((l, h, o), v)| Step::Write(l, h, o, v)),
        2 => at.prop_map(|(l, h, o)| Step::Prefetch(l, h, o)),
        2 => Just(Step::Tick),
    ]
}

/// Three prefetching lanes over four 256-word objects with the given first level.
fn prefetching(l1: CacheConfig, protocol: CoherenceProtocol) -> System {
    init_tracing();
    let config = Config {
        l1,
        lanes: 3,
        protocol,
        prefetch: PrefetchStrategy::Linear,
        prefetch_repeat_limit: 2,
        memory_words: 64 * 1024,
        handle_entries: 16,
        ..Config::default()
    };
    let mut sys = System::new(&config).unwrap();
    for h in 1..=HANDLES {
        let _ = sys
            .register_handle(h, HtEntry::new(base(h), WORDS, 0))
            .unwrap();
    }
    sys
}

/// Number of valid ways in the set of `addr` holding its line.
fn copies(cache: &ObjectCache, addr: ObjAddr) -> usize {
    let geometry = cache.geometry();
    let d = geometry.decode(addr);
    cache
        .set(d.index)
        .iter()
        .filter(|line| line.matches(d.tag, geometry.scheme()))
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn a_line_is_resident_at_most_once_per_cache(
        four_ways in any::<bool>(),
        protocol in protocol(),
        steps in prop::collection::vec(step(), 1..300),
    ) {
        let l1 = if four_ways { CacheConfig::new(1, 4, 8, 40) } else { two_way() };
        let mut sys = prefetching(l1, protocol);
        let mut touched: Vec<ObjAddr> = Vec::new();

        for step in &steps {
            match *step {
                Step::Read(lane, h, o) => {
                    let _ = sys.read(lane, h, o).unwrap();
                    touched.push(ObjAddr::new(h, o));
                }
                Step::Write(lane, h, o, v) => {
                    let _ = sys.write(lane, h, o, v).unwrap();
                    touched.push(ObjAddr::new(h, o));
                }
                Step::Prefetch(lane, h, o) => sys.prefetch(lane, h, o).unwrap(),
                Step::Tick => {
                    let _ = sys.tick().unwrap();
                }
            }

            for lane in 0..3 {
                let cache = sys.lane(lane).unwrap();
                for index in 0..cache.geometry().lines() {
                    let set = cache.set(index);
                    for (way, line) in set.iter().enumerate().filter(|(_, l)| l.valid) {
                        let twins = set[way + 1..]
                            .iter()
                            .filter(|other| other.matches(line.tag, line.scheme))
                            .count();
                        prop_assert_eq!(twins, 0, "lane {} index {} way {}", lane, index, way);
                    }
                }
            }
            for &addr in &touched {
                let holders: Vec<MoesiState> =
                    (0..3).map(|lane| sys.lane(lane).unwrap().state(addr)).collect();
                for lane in 0..3 {
                    prop_assert!(copies(sys.lane(lane).unwrap(), addr) <= 1);
                }
                if holders.iter().any(|s| s.is_exclusive()) {
                    let valid = holders.iter().filter(|s| **s != MoesiState::Invalid).count();
                    prop_assert_eq!(valid, 1, "{:?} held exclusively with peers: {:?}", addr, holders);
                }
            }
        }
    }
}
