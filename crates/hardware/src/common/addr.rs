//! Object Addresses and Line Hashing.
//!
//! Every access in the object hierarchy is addressed by a `(handle, offset)` pair rather
//! than a raw memory address. This module provides:
//! 1. **Object Address:** The `ObjAddr` pair and its sentinel checks.
//! 2. **Address Schemes:** The block-size categories a line can be decoded with.
//! 3. **Line Geometry:** Forward decoding into `(tag, index, block offset)` and the exact
//!    inverse used to address write-backs of evicted lines.

use serde::Deserialize;

use super::constants::{ARRAY_LENGTH_OFFSET, HANDLE_SHIFT, TYPE_ID_OFFSET};

/// A handle-relative word address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjAddr {
    /// Object handle (index into the handle table).
    pub handle: u32,
    /// Word offset inside the object.
    pub offset: u32,
}

impl ObjAddr {
    /// Creates a new object address.
    #[inline(always)]
    pub const fn new(handle: u32, offset: u32) -> Self {
        Self { handle, offset }
    }

    /// Returns `true` if the offset is one of the two reserved metadata offsets.
    #[inline]
    pub const fn is_sentinel(&self) -> bool {
        self.offset == ARRAY_LENGTH_OFFSET || self.offset == TYPE_ID_OFFSET
    }

    /// Returns the address `words` words further into the same object.
    #[inline]
    pub const fn advance(self, words: u32) -> Self {
        Self {
            handle: self.handle,
            offset: self.offset.wrapping_add(words),
        }
    }
}

/// Address-decode scheme (block-size category) a line was installed with.
///
/// A line only matches a lookup when both its tag and its scheme match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AddressScheme {
    /// Consecutive offsets share a line.
    #[default]
    #[serde(alias = "Linear")]
    Linear,
    /// Offsets are interleaved inside 32-word groups so strided walks over long
    /// arrays spread across lines: bits `[1:0]` move to `[4:3]` and bits `[4:2]`
    /// move to `[2:0]`.
    #[serde(alias = "Interleaved")]
    Interleaved,
}

impl AddressScheme {
    #[inline]
    const fn permute(self, offset: u32) -> u32 {
        match self {
            Self::Linear => offset,
            Self::Interleaved => {
                (offset & !0x1F) | ((offset & 0x3) << 3) | ((offset & 0x1C) >> 2)
            }
        }
    }

    #[inline]
    const fn unpermute(self, offset: u32) -> u32 {
        match self {
            Self::Linear => offset,
            Self::Interleaved => {
                (offset & !0x1F) | ((offset & 0x7) << 2) | ((offset & 0x18) >> 3)
            }
        }
    }
}

/// The three components an object address decodes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    /// Packed handle and block-aligned offset: `(handle << 32) | aligned_offset`.
    pub tag: u64,
    /// Set index.
    pub index: usize,
    /// Word position inside the line.
    pub block_offset: usize,
}

/// Shape of a handle-addressed cache: words per line, number of indices and scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineGeometry {
    words_per_line: u32,
    lines: usize,
    scheme: AddressScheme,
}

impl LineGeometry {
    /// Creates a geometry. `words_per_line` must be a power of two and `lines` non-zero;
    /// both are validated by the configuration layer.
    pub const fn new(words_per_line: u32, lines: usize, scheme: AddressScheme) -> Self {
        Self {
            words_per_line,
            lines,
            scheme,
        }
    }

    /// Words per line.
    #[inline(always)]
    pub const fn words_per_line(&self) -> u32 {
        self.words_per_line
    }

    /// Number of set indices.
    #[inline(always)]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    /// Scheme lines are installed with.
    #[inline(always)]
    pub const fn scheme(&self) -> AddressScheme {
        self.scheme
    }

    #[inline(always)]
    const fn block_mask(&self) -> u32 {
        self.words_per_line - 1
    }

    /// Decodes an object address into tag, index and block offset.
    pub const fn decode(&self, addr: ObjAddr) -> Decoded {
        let offset = self.scheme.permute(addr.offset);
        let block_bits = self.words_per_line.trailing_zeros();
        let folded = ((offset >> block_bits) as u64) ^ ((addr.handle as u64) << HANDLE_SHIFT);
        Decoded {
            tag: ((addr.handle as u64) << 32) | (offset & !self.block_mask()) as u64,
            index: (folded % self.lines as u64) as usize,
            block_offset: (offset & self.block_mask()) as usize,
        }
    }

    /// Reconstructs the object address of word `block_offset` of the line tagged `tag`.
    ///
    /// `encode(decode(a).tag, decode(a).block_offset) == a` for every address `a`.
    pub const fn encode(&self, tag: u64, block_offset: usize) -> ObjAddr {
        let handle = (tag >> 32) as u32;
        let permuted = (tag as u32).wrapping_add(block_offset as u32);
        ObjAddr {
            handle,
            offset: self.scheme.unpermute(permuted),
        }
    }

    /// Returns the first address of the block containing `addr`.
    #[inline]
    pub const fn block_base(&self, addr: ObjAddr) -> ObjAddr {
        let d = self.decode(addr);
        self.encode(d.tag, 0)
    }
}
