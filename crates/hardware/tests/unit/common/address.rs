//! Object Address Hashing Tests.
//!
//! Verifies that `LineGeometry::decode` and `encode` are exact inverses under both
//! address schemes, that the index stays in range, and pins the handle folding and
//! interleave permutation on concrete values.

use heapsim_core::common::{
    ARRAY_LENGTH_OFFSET, AddressScheme, LineGeometry, ObjAddr, TYPE_ID_OFFSET,
};
use proptest::prelude::*;

fn scheme() -> impl Strategy<Value = AddressScheme> {
    prop_oneof![Just(AddressScheme::Linear), Just(AddressScheme::Interleaved)]
}

proptest! {
    #[test]
    fn encode_inverts_decode(
        handle in any::<u32>(),
        offset in any::<u32>(),
        wpl_bits in 0u32..6,
        line_bits in 0u32..11,
        scheme in scheme(),
    ) {
        let geometry = LineGeometry::new(1 << wpl_bits, 1 << line_bits, scheme);
        let addr = ObjAddr::new(handle, offset);
        let d = geometry.decode(addr);

        prop_assert!(d.index < geometry.lines());
        prop_assert!(d.block_offset < geometry.words_per_line() as usize);
        prop_assert_eq!(geometry.encode(d.tag, d.block_offset), addr);
    }

    #[test]
    fn linear_block_shares_one_line(handle in 0u32..0x1_0000, block in 0u32..0x1000) {
        let geometry = LineGeometry::new(8, 32, AddressScheme::Linear);
        let first = geometry.decode(ObjAddr::new(handle, block * 8));
        for i in 1..8 {
            let d = geometry.decode(ObjAddr::new(handle, block * 8 + i));
            prop_assert_eq!(d.tag, first.tag);
            prop_assert_eq!(d.index, first.index);
            prop_assert_eq!(d.block_offset, i as usize);
        }
    }
}

#[test]
fn handle_is_folded_into_the_index() {
    let geometry = LineGeometry::new(8, 32, AddressScheme::Linear);
    // (offset >> 3) ^ (handle << 4), modulo 32.
    assert_eq!(geometry.decode(ObjAddr::new(0, 0)).index, 0);
    assert_eq!(geometry.decode(ObjAddr::new(1, 0)).index, 16);
    assert_eq!(geometry.decode(ObjAddr::new(1, 8)).index, 17);
    assert_eq!(geometry.decode(ObjAddr::new(1, 256)).index, 16);
    assert_eq!(geometry.decode(ObjAddr::new(2, 0)).index, 0);
}

#[test]
fn tag_packs_handle_and_aligned_offset() {
    let geometry = LineGeometry::new(8, 32, AddressScheme::Linear);
    let d = geometry.decode(ObjAddr::new(5, 21));
    assert_eq!(d.tag, (5u64 << 32) | 16);
    assert_eq!(d.block_offset, 5);
}

#[test]
fn interleave_spreads_neighbours_across_lines() {
    let geometry = LineGeometry::new(8, 32, AddressScheme::Interleaved);
    let zero = geometry.decode(ObjAddr::new(1, 0));
    let one = geometry.decode(ObjAddr::new(1, 1));
    let four = geometry.decode(ObjAddr::new(1, 4));

    // Offset 1 moves to permuted offset 8: the next line.
    assert_ne!(one.tag, zero.tag);
    // Offset 4 moves to permuted offset 1: same line as offset 0.
    assert_eq!(four.tag, zero.tag);
    assert_eq!(four.block_offset, 1);
}

#[test]
fn interleave_leaves_high_bits_alone() {
    let geometry = LineGeometry::new(8, 32, AddressScheme::Interleaved);
    let d = geometry.decode(ObjAddr::new(1, 32));
    assert_eq!(d.tag & 0xFFFF_FFFF, 32);
    assert_eq!(d.block_offset, 0);
}

#[test]
fn block_base_is_first_word_of_line() {
    let geometry = LineGeometry::new(8, 32, AddressScheme::Linear);
    assert_eq!(geometry.block_base(ObjAddr::new(3, 13)), ObjAddr::new(3, 8));
}

#[test]
fn sentinel_offsets() {
    assert!(ObjAddr::new(1, ARRAY_LENGTH_OFFSET).is_sentinel());
    assert!(ObjAddr::new(1, TYPE_ID_OFFSET).is_sentinel());
    assert!(!ObjAddr::new(1, TYPE_ID_OFFSET - 1).is_sentinel());
    assert_eq!(ObjAddr::new(2, 8).advance(8), ObjAddr::new(2, 16));
}
