//! Cache Lines and MOESI States.

use crate::common::{AddressScheme, Word};

/// Coherence state of a first-level line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MoesiState {
    /// Not present.
    #[default]
    Invalid,
    /// Clean, possibly held by other caches.
    Shared,
    /// Clean, held by no other cache.
    Exclusive,
    /// Dirty, other caches may hold stale copies that were already invalidated or updated.
    Owned,
    /// Dirty, held by no other cache.
    Modified,
}

impl MoesiState {
    /// Returns `true` if the line holds the only up-to-date copy and must be written back.
    #[inline]
    pub const fn is_dirty(self) -> bool {
        matches!(self, Self::Modified | Self::Owned)
    }

    /// Returns `true` if the line is held by no other cache.
    #[inline]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Modified | Self::Exclusive)
    }

    /// State after a peer has observed the line: `E -> S`, `M -> O`.
    #[inline]
    pub const fn downgraded(self) -> Self {
        match self {
            Self::Exclusive => Self::Shared,
            Self::Modified => Self::Owned,
            other => other,
        }
    }
}

/// A block of words plus its bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheLine {
    /// Packed handle and block-aligned offset.
    pub tag: u64,
    /// Slot holds a line.
    pub valid: bool,
    /// Line was written since it was filled.
    pub dirty: bool,
    /// Largest block offset ever written; write-backs cover `0..=max_offset`.
    pub max_offset: usize,
    /// Scheme the line was decoded with.
    pub scheme: AddressScheme,
    /// Coherence state.
    pub state: MoesiState,
    data: Box<[Word]>,
}

impl CacheLine {
    /// Creates an invalid, zeroed line of `words_per_line` words.
    pub fn new(words_per_line: usize) -> Self {
        Self {
            tag: 0,
            valid: false,
            dirty: false,
            max_offset: 0,
            scheme: AddressScheme::Linear,
            state: MoesiState::Invalid,
            data: vec![0; words_per_line].into_boxed_slice(),
        }
    }

    /// Creates an invalid line holding `data`, with `max_offset` covering every word.
    pub fn with_data(data: Vec<Word>) -> Self {
        Self {
            max_offset: data.len().saturating_sub(1),
            data: data.into_boxed_slice(),
            ..Self::new(0)
        }
    }

    /// Word at `block_offset`.
    #[inline]
    pub fn word(&self, block_offset: usize) -> Word {
        self.data[block_offset]
    }

    /// Writes the word at `block_offset`, extending `max_offset`.
    #[inline]
    pub fn set_word(&mut self, block_offset: usize, value: Word) {
        self.data[block_offset] = value;
        self.max_offset = self.max_offset.max(block_offset);
    }

    /// All words of the line.
    #[inline]
    pub fn data(&self) -> &[Word] {
        &self.data
    }

    /// Number of words in the line.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-word line.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies the words of `other` into this line, up to the shorter of the two.
    pub fn copy_data_from(&mut self, other: &Self) {
        let n = self.data.len().min(other.data.len());
        self.data[..n].copy_from_slice(&other.data[..n]);
    }

    /// Returns `true` if the line is valid and was decoded from `tag` under `scheme`.
    #[inline]
    pub fn matches(&self, tag: u64, scheme: AddressScheme) -> bool {
        self.valid && self.tag == tag && self.scheme == scheme
    }

    /// Drops the line: invalid, clean.
    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.dirty = false;
        self.state = MoesiState::Invalid;
    }
}
