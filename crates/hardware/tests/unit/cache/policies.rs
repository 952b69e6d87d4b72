//! Replacement Policy Unit Tests.
//!
//! Verifies the bit-tree pseudo-LRU policy shared by every cache level: invalid ways
//! are always chosen first, the most recently used way is never the victim, and
//! touching each victim in turn walks every way once.

use heapsim_core::cache::policies::{PlruPolicy, ReplacementPolicy};
use heapsim_core::config::ConfigError;
use proptest::prelude::*;
use rstest::rstest;

fn full(ways: usize) -> u64 {
    if ways == 64 {
        u64::MAX
    } else {
        (1u64 << ways) - 1
    }
}

#[rstest]
#[case(0)]
#[case(3)]
#[case(6)]
#[case(128)]
fn rejects_unusable_associativity(#[case] ways: usize) {
    assert!(matches!(
        PlruPolicy::new(4, ways),
        Err(ConfigError::Associativity(w)) if w == ways
    ));
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
#[case(8)]
fn invalid_way_is_chosen_first(#[case] ways: usize) {
    let mut plru = PlruPolicy::new(1, ways).unwrap();
    for way in 0..ways {
        plru.update(0, way);
    }
    for free in 0..ways {
        let valid = full(ways) & !(1u64 << free);
        assert_eq!(plru.select_victim(0, valid), free);
    }
    // Lowest free way wins when several are free.
    assert_eq!(plru.select_victim(0, 0), 0);
}

#[rstest]
#[case(2)]
#[case(4)]
#[case(8)]
#[case(16)]
#[case(64)]
fn touching_victims_visits_every_way(#[case] ways: usize) {
    let mut plru = PlruPolicy::new(1, ways).unwrap();
    let mut seen = vec![false; ways];
    for _ in 0..ways {
        let victim = plru.select_victim(0, full(ways));
        seen[victim] = true;
        plru.update(0, victim);
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn sets_are_independent() {
    let mut plru = PlruPolicy::new(2, 2).unwrap();
    plru.update(0, 0);
    plru.update(1, 1);
    assert_eq!(plru.get_victim(0), 1);
    assert_eq!(plru.get_victim(1), 0);
    plru.reset();
    assert_eq!(plru.get_victim(0), 0);
}

proptest! {
    #[test]
    fn most_recent_way_is_never_the_victim(
        ways_bits in 1u32..7,
        touches in prop::collection::vec(any::<usize>(), 1..64),
    ) {
        let ways = 1usize << ways_bits;
        let mut plru = PlruPolicy::new(1, ways).unwrap();
        for t in touches {
            let way = t % ways;
            plru.update(0, way);
            prop_assert_ne!(plru.get_victim(0), way);
        }
    }
}
