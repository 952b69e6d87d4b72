//! Object Cache Unit Tests.
//!
//! Drives a single `ObjectCache` with a scripted `CoherenceController` and checks the
//! MOESI table: fill states, write-hit and write-miss transitions in both invalidate
//! and update mode, peer snoops and notifications, and the sentinel metadata path.
//!
//! With the direct-mapped test configuration (1 KiB, 8-word lines) the cache has 32
//! indices and `line_pattern(8, 100)` fills word `i` with `100 + i`.

use heapsim_core::cache::{Access, MoesiState, ObjectCache};
use heapsim_core::coherence::HandleInfo;
use heapsim_core::common::{ARRAY_LENGTH_OFFSET, ObjAddr, TYPE_ID_OFFSET};
use heapsim_core::config::CacheConfig;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::harness::direct_mapped;
use crate::common::mocks::controller::{MockController, Verdicts, line_pattern, scripted};

const A: ObjAddr = ObjAddr::new(1, 3);

fn cache(config: &CacheConfig) -> ObjectCache {
    ObjectCache::new(0, config, 0).unwrap()
}

/// Cache holding the line of `A`, filled with the given verdicts.
fn with_line(verdicts: Verdicts) -> ObjectCache {
    let mut c = cache(&direct_mapped());
    let _ = c.request_data(A, &mut scripted(verdicts, 8, 10)).unwrap();
    c
}

fn state(c: &ObjectCache) -> MoesiState {
    c.state(A)
}

// ══════════════════════════════════════════════════════════
// 1. Reads
// ══════════════════════════════════════════════════════════

#[test]
fn read_miss_then_hit() {
    let mut c = cache(&direct_mapped());
    let mut ctrl = scripted(Verdicts::L2_EXCLUSIVE, 8, 17);

    assert_eq!(c.request_data(A, &mut ctrl).unwrap(), Access::new(103, 17));
    assert_eq!(c.request_data(A, &mut ctrl).unwrap(), Access::new(103, 0));

    let s = c.stats();
    assert_eq!((s.reads, s.read_hits, s.read_misses), (2, 1, 1));
    assert_eq!(s.read_reload_l2, 1);
    assert_eq!(s.read_reload_l1, 0);
}

#[rstest]
#[case::from_l2(Verdicts::L2_EXCLUSIVE, MoesiState::Exclusive)]
#[case::from_peer(Verdicts::PEER_SHARED, MoesiState::Shared)]
fn read_miss_state_follows_supplier(#[case] verdicts: Verdicts, #[case] expected: MoesiState) {
    let c = with_line(verdicts);
    assert_eq!(state(&c), expected);
    let line = c.line_for(A).unwrap();
    assert!(line.valid);
    assert!(!line.dirty);
}

#[test]
fn whole_line_is_resident_after_fill() {
    let mut c = with_line(Verdicts::L2_EXCLUSIVE);
    let mut ctrl = scripted(Verdicts::L2_EXCLUSIVE, 8, 10);
    for offset in 0..8 {
        let access = c.request_data(ObjAddr::new(1, offset), &mut ctrl).unwrap();
        assert_eq!(access, Access::new(100 + offset as i32, 0));
    }
    assert!(!c.holds_value(ObjAddr::new(1, 8)));
}

// ══════════════════════════════════════════════════════════
// 2. Write hits
// ══════════════════════════════════════════════════════════

#[test]
fn write_hit_exclusive_becomes_modified_silently() {
    let mut c = with_line(Verdicts::L2_EXCLUSIVE);
    // No write_notification expectation: a notification would fail the test.
    let mut ctrl = scripted(Verdicts::L2_EXCLUSIVE, 8, 10);

    assert_eq!(c.write_data(A, 7, &mut ctrl).unwrap(), 0);
    assert_eq!(state(&c), MoesiState::Modified);
    let line = c.line_for(A).unwrap();
    assert!(line.dirty);
    assert_eq!(line.word(3), 7);
    assert_eq!(line.max_offset, 3);

    assert_eq!(c.write_data(A, 8, &mut ctrl).unwrap(), 0);
    assert_eq!(state(&c), MoesiState::Modified);
}

#[test]
fn write_hit_shared_or_owned_notifies_and_owns() {
    let mut c = with_line(Verdicts::PEER_SHARED);
    let mut ctrl = scripted(Verdicts::PEER_SHARED, 8, 10);
    let _ = ctrl.expect_write_notification()
        .withf(|addr, line, lane| *addr == A && line.word(3) == 7 && *lane == 0)
        .times(2)
        .returning(|_, _, _| Ok(1));

    assert_eq!(c.write_data(A, 7, &mut ctrl).unwrap(), 1);
    assert_eq!(state(&c), MoesiState::Owned);

    // Owned stays Owned and notifies again.
    assert_eq!(c.write_data(A, 7, &mut ctrl).unwrap(), 1);
    assert_eq!(state(&c), MoesiState::Owned);
}

#[rstest]
#[case::no_sharer(Verdicts::L2_EXCLUSIVE.updating(), MoesiState::Exclusive)]
#[case::sharer(Verdicts::PEER_SHARED.updating(), MoesiState::Shared)]
fn write_hit_update_mode(#[case] verdicts: Verdicts, #[case] expected: MoesiState) {
    let mut c = with_line(Verdicts::L2_EXCLUSIVE);
    let mut ctrl = scripted(verdicts, 8, 10);
    let _ = ctrl.expect_write_notification()
        .times(1)
        .returning(|_, _, _| Ok(1));

    assert_eq!(c.write_data(A, 7, &mut ctrl).unwrap(), 1);
    assert_eq!(state(&c), expected);
    assert_eq!(c.line_for(A).unwrap().word(3), 7);
}

// ══════════════════════════════════════════════════════════
// 3. Write misses
// ══════════════════════════════════════════════════════════

#[rstest]
#[case::l2_exclusive(Verdicts::L2_EXCLUSIVE, false, MoesiState::Modified)]
#[case::peer_shared(Verdicts::PEER_SHARED, true, MoesiState::Owned)]
#[case::l2_not_exclusive(
    Verdicts { from_l2: true, exclusive: false, update: false },
    false,
    MoesiState::Owned
)]
#[case::update_exclusive(Verdicts::L2_EXCLUSIVE.updating(), true, MoesiState::Exclusive)]
#[case::update_shared(Verdicts::PEER_SHARED.updating(), true, MoesiState::Shared)]
fn write_miss_transitions(
    #[case] verdicts: Verdicts,
    #[case] notifies: bool,
    #[case] expected: MoesiState,
) {
    let mut c = cache(&direct_mapped());
    let mut ctrl = scripted(verdicts, 8, 10);
    let _ = ctrl.expect_write_notification()
        .times(usize::from(notifies))
        .returning(|_, _, _| Ok(2));

    let ticks = c.write_data(A, 7, &mut ctrl).unwrap();

    assert_eq!(ticks, 1 + 10 + if notifies { 2 } else { 0 });
    assert_eq!(state(&c), expected);
    let line = c.line_for(A).unwrap();
    assert_eq!(line.word(3), 7);
    assert_eq!(line.word(2), 102);
    let s = c.stats();
    assert_eq!((s.writes, s.write_misses, s.write_hits), (1, 1, 0));
    assert_eq!(s.write_reload_l2 + s.write_reload_l1, 1);
}

// ══════════════════════════════════════════════════════════
// 4. Peer snoops and notifications
// ══════════════════════════════════════════════════════════

#[test]
fn check_state_downgrades_and_reports_previous() {
    let mut c = with_line(Verdicts::L2_EXCLUSIVE);
    assert_eq!(c.check_state(A), MoesiState::Exclusive);
    assert_eq!(state(&c), MoesiState::Shared);
    assert_eq!(c.check_state(A), MoesiState::Shared);
    assert_eq!(state(&c), MoesiState::Shared);

    let mut c = with_line(Verdicts::L2_EXCLUSIVE);
    let _ = c
        .write_data(A, 1, &mut scripted(Verdicts::L2_EXCLUSIVE, 8, 10))
        .unwrap();
    assert_eq!(c.check_state(A), MoesiState::Modified);
    assert_eq!(state(&c), MoesiState::Owned);
    assert_eq!(c.check_state(A), MoesiState::Owned);

    assert_eq!(c.check_state(ObjAddr::new(9, 0)), MoesiState::Invalid);
}

#[test]
fn write_notification_invalidates() {
    let mut c = with_line(Verdicts::PEER_SHARED);
    c.write_notification(A);
    assert!(c.line_for(A).is_none());
    assert!(!c.holds_value(A));

    // The next read misses on a present-but-invalid tag.
    let _ = c
        .request_data(A, &mut scripted(Verdicts::L2_EXCLUSIVE, 8, 10))
        .unwrap();
    assert_eq!(c.stats().read_tag_invalid, 1);
}

#[test]
fn update_notification_takes_peer_data() {
    let mut c = with_line(Verdicts::L2_EXCLUSIVE);
    let mut incoming = line_pattern(8, 500);
    incoming.max_offset = 6;

    assert!(c.update_notification(A, &incoming));
    let line = c.line_for(A).unwrap();
    assert_eq!(line.word(3), 503);
    assert_eq!(line.max_offset, 6);
    assert_eq!(line.state, MoesiState::Shared);
    assert_eq!(c.stats().cacheline_updates, 1);

    assert!(!c.update_notification(ObjAddr::new(9, 0), &incoming));
    assert_eq!(c.stats().cacheline_updates, 1);
}

// ══════════════════════════════════════════════════════════
// 5. Sentinel offsets and presence checks
// ══════════════════════════════════════════════════════════

#[rstest]
#[case::length(ARRAY_LENGTH_OFFSET, 64)]
#[case::type_id(TYPE_ID_OFFSET, 3)]
fn sentinel_read_goes_to_handle_table(#[case] offset: u32, #[case] expected: i32) {
    let mut c = cache(&direct_mapped());
    let mut ctrl = MockController::new();
    let _ = ctrl.expect_request_handle_table()
        .withf(|handle, is_write, lane| *handle == 1 && !*is_write && *lane == 0)
        .times(1)
        .returning(|_, _, _| {
            Ok(HandleInfo {
                ticks: 47,
                array_length: 64,
                type_id: 3,
            })
        });

    let access = c.request_data(ObjAddr::new(1, offset), &mut ctrl).unwrap();
    assert_eq!(access, Access::new(expected, 47));
    assert_eq!(c.stats().reads, 0);
    assert_eq!(c.usage(), 0.0);
}

#[test]
fn sentinel_write_is_charged_as_handle_table_write() {
    let mut c = cache(&direct_mapped());
    let mut ctrl = MockController::new();
    let _ = ctrl.expect_request_handle_table()
        .withf(|handle, is_write, _| *handle == 1 && *is_write)
        .times(1)
        .returning(|_, _, _| Ok(HandleInfo::default()));

    assert_eq!(
        c.write_data(ObjAddr::new(1, ARRAY_LENGTH_OFFSET), 5, &mut ctrl)
            .unwrap(),
        0
    );
    assert_eq!(c.stats().writes, 0);
}

#[test]
fn holds_value_rejects_out_of_range_addresses() {
    let c = with_line(Verdicts::L2_EXCLUSIVE);
    assert!(c.holds_value(A));
    assert!(!c.holds_value(ObjAddr::new(1, ARRAY_LENGTH_OFFSET)));
    assert!(!c.holds_value(ObjAddr::new(0x1_0000, 0)));
    assert!(!c.holds_value(ObjAddr::new(1, 0x1_0000)));
}

#[test]
fn usage_counts_non_invalid_slots() {
    let c = with_line(Verdicts::L2_EXCLUSIVE);
    assert!((c.usage() - 1.0 / 32.0).abs() < f64::EPSILON);
}
