//! Second-Level Cache Unit Tests.
//!
//! Verifies both addressing variants: miss-then-hit latency, the dirty-victim penalty,
//! write-through of values to `Memory`, the raw-address datapath and the counters.
//!
//! Test geometry: 1 KiB, 2 ways, 8 words per line, 40-tick RAM, so 16 indices. Physical
//! word addresses `0`, `128`, `256`, `384` all map to index 0.

use heapsim_core::cache::{L2Addr, L2Cache};
use heapsim_core::common::ObjAddr;
use heapsim_core::config::{CacheConfig, ConfigError, L2Addressing};
use heapsim_core::memory::Memory;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn l2(addressing: L2Addressing) -> (L2Cache, Memory) {
    let cache = L2Cache::new(addressing, &CacheConfig::new(1, 2, 8, 40)).unwrap();
    (cache, Memory::new(4096, 4))
}

fn word(physical: u64) -> L2Addr {
    L2Addr::new(ObjAddr::new(0, physical as u32), physical)
}

#[rstest]
#[case(L2Addressing::Physical)]
#[case(L2Addressing::Virtual)]
fn read_miss_then_hit(#[case] addressing: L2Addressing) {
    let (mut cache, mut mem) = l2(addressing);
    mem.write(100, 5);

    // Clean victim: a miss costs nothing extra.
    let first = cache.read(word(100), &mem);
    assert_eq!((first.value, first.ticks), (5, 0));
    assert!(cache.holds(word(100)));

    let second = cache.read(word(100), &mem);
    assert_eq!((second.value, second.ticks), (5, 0));
    assert_eq!((cache.stats().reads, cache.stats().read_misses), (2, 1));
    assert!((cache.read_miss_rate() - 50.0).abs() < f64::EPSILON);
}

#[test]
fn dirty_victim_costs_a_memory_access() {
    let (mut cache, mut mem) = l2(L2Addressing::Physical);
    assert_eq!(cache.write(word(0), 1, &mut mem), 0);
    assert_eq!(cache.write(word(128), 2, &mut mem), 0);

    // Way 0 (dirty) is the pseudo-LRU victim, then way 1 (dirty), then the clean 256.
    assert_eq!(cache.read(word(256), &mem).ticks, 40);
    assert_eq!(cache.read(word(384), &mem).ticks, 40);
    assert_eq!(cache.read(word(0), &mem).ticks, 0);
    assert_eq!(cache.stats().write_misses, 2);
}

#[test]
fn writes_reach_memory_immediately() {
    let (mut cache, mut mem) = l2(L2Addressing::Physical);
    let _ = cache.write(word(5), 77, &mut mem);
    assert_eq!(mem.read(5), 77);
    assert_eq!(cache.read(word(5), &mem).value, 77);
}

#[test]
fn physical_variant_ignores_the_object_name() {
    let (mut cache, mem) = l2(L2Addressing::Physical);
    let _ = cache.read(L2Addr::new(ObjAddr::new(1, 0), 96), &mem);
    assert!(cache.holds(L2Addr::new(ObjAddr::new(9, 9), 103)));
    assert!(!cache.holds(L2Addr::new(ObjAddr::new(1, 0), 104)));
    assert!(cache.is_physically_addressed());
    assert_eq!(cache.load_overhead(), 2);
}

#[test]
fn virtual_variant_ignores_the_physical_name() {
    let (mut cache, mem) = l2(L2Addressing::Virtual);
    let _ = cache.read(L2Addr::new(ObjAddr::new(1, 0), 4000), &mem);
    assert!(cache.holds(L2Addr::new(ObjAddr::new(1, 7), 0)));
    assert!(!cache.holds(L2Addr::new(ObjAddr::new(1, 8), 4008)));
    assert!(!cache.is_physically_addressed());
    assert_eq!(cache.load_overhead(), 0);
}

#[test]
fn raw_datapath_access() {
    let (mut physical, mut mem) = l2(L2Addressing::Physical);
    assert_eq!(physical.write_physical(64, 3, &mut mem), 0);
    let read = physical.read_physical(64, &mem);
    assert_eq!((read.value, read.ticks), (3, 0));

    let (mut virt, mut mem) = l2(L2Addressing::Virtual);
    assert_eq!(virt.write_physical(64, 3, &mut mem), 40);
    let read = virt.read_physical(64, &mem);
    assert_eq!((read.value, read.ticks), (3, 40));
    assert_eq!(virt.stats().reads, 0);
}

#[test]
fn prefetch_brings_the_line_in() {
    let (mut cache, _) = l2(L2Addressing::Physical);
    assert_eq!(cache.prefetch(word(200)), 41);
    assert!(cache.holds(word(200)));
    assert_eq!(cache.prefetch(word(201)), 1);
}

#[test]
fn counters_and_flush() {
    let (mut cache, mut mem) = l2(L2Addressing::Physical);
    assert_eq!(cache.read_miss_rate(), 0.0);
    assert_eq!(cache.write_miss_rate(), 0.0);

    let _ = cache.write(word(8), 1, &mut mem);
    let _ = cache.write(word(9), 1, &mut mem);
    assert!((cache.write_miss_rate() - 50.0).abs() < f64::EPSILON);
    assert!(cache.usage() > 0.0);

    cache.invalidate_flush();
    assert_eq!(cache.usage(), 0.0);
    assert!(!cache.holds(word(8)));
    assert_eq!(mem.read(8), 1);
}

#[test]
fn geometry_is_validated() {
    assert!(matches!(
        L2Cache::new(L2Addressing::Physical, &CacheConfig::new(1, 3, 8, 40)),
        Err(ConfigError::Associativity(3))
    ));
    assert!(matches!(
        L2Cache::new(L2Addressing::Virtual, &CacheConfig::new(3, 2, 8, 40)),
        Err(ConfigError::Geometry(_))
    ));
}
