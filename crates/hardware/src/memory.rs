//! Backing Store.
//!
//! The flat word array (simulated RAM) and the handle table, the ground truth for object
//! metadata. Every other level of the hierarchy caches one of these two arrays.
//!
//! Registering a handle past the table or placing an object past the word array is fatal.
//! Any other out-of-range index is a caller bug and panics on the slice index.

use crate::common::{SimError, SimResult, Word};

/// One handle table entry: where an object lives and what it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HtEntry {
    /// Base word address of the object.
    pub address: u32,
    /// Object size in words (array length for arrays).
    pub size: u32,
    /// Class type index.
    pub type_id: u32,
    /// Object flags.
    pub flags: u32,
    /// Monitor identifier.
    pub monitor_id: u32,
}

impl HtEntry {
    /// Creates an entry with cleared flags and monitor id.
    pub const fn new(address: u32, size: u32, type_id: u32) -> Self {
        Self {
            address,
            size,
            type_id,
            flags: 0,
            monitor_id: 0,
        }
    }
}

/// Simulated RAM and handle table.
#[derive(Clone, Debug)]
pub struct Memory {
    words: Vec<Word>,
    handle_table: Vec<HtEntry>,
    registered: usize,
}

impl Memory {
    /// Creates a zeroed memory of `words` words with room for `handles` handle entries.
    pub fn new(words: usize, handles: usize) -> Self {
        Self {
            words: vec![0; words],
            handle_table: vec![HtEntry::default(); handles],
            registered: 0,
        }
    }

    /// Installs or overwrites the entry of `handle`.
    ///
    /// # Errors
    ///
    /// `HandleTableFull` if `handle` is past the table, `MemoryFull` if the object's word
    /// range reaches the end of RAM.
    pub fn register_handle(&mut self, handle: u32, entry: HtEntry) -> SimResult<()> {
        let index = handle as usize;
        if index >= self.handle_table.len() {
            return Err(SimError::HandleTableFull {
                handle,
                capacity: self.handle_table.len(),
            });
        }
        let end = u64::from(entry.address) + u64::from(entry.size);
        if end >= self.words.len() as u64 {
            return Err(SimError::MemoryFull {
                address: u64::from(entry.address),
                size: u64::from(entry.size),
                capacity: self.words.len(),
            });
        }
        self.handle_table[index] = entry;
        self.registered = self.registered.max(index + 1);
        Ok(())
    }

    /// Entry of `handle`.
    #[inline]
    pub fn handle(&self, handle: u32) -> HtEntry {
        self.handle_table[handle as usize]
    }

    /// Overwrites the flags of `handle`.
    pub fn set_flags(&mut self, handle: u32, flags: u32) {
        self.handle_table[handle as usize].flags = flags;
    }

    /// Overwrites the monitor id of `handle`.
    pub fn set_monitor_id(&mut self, handle: u32, monitor_id: u32) {
        self.handle_table[handle as usize].monitor_id = monitor_id;
    }

    /// One past the highest handle registered so far.
    #[inline]
    pub fn registered_handles(&self) -> usize {
        self.registered
    }

    /// Handle table capacity.
    #[inline]
    pub fn handle_capacity(&self) -> usize {
        self.handle_table.len()
    }

    /// Number of words of RAM.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` if RAM has no words.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Reads the word at `addr`.
    #[inline]
    pub fn read(&self, addr: u64) -> Word {
        self.words[addr as usize]
    }

    /// Reads the word at `addr`, or `None` past the end of RAM.
    #[inline]
    pub fn try_read(&self, addr: u64) -> Option<Word> {
        usize::try_from(addr).ok().and_then(|i| self.words.get(i).copied())
    }

    /// Writes the word at `addr`.
    #[inline]
    pub fn write(&mut self, addr: u64, value: Word) {
        self.words[addr as usize] = value;
    }

    /// Copies an initial image into RAM starting at `base`.
    ///
    /// # Errors
    ///
    /// `MemoryFull` if the image does not fit.
    pub fn load_words(&mut self, base: u64, image: &[Word]) -> SimResult<()> {
        let start = base as usize;
        let end = start.saturating_add(image.len());
        if end > self.words.len() {
            return Err(SimError::MemoryFull {
                address: base,
                size: image.len() as u64,
                capacity: self.words.len(),
            });
        }
        self.words[start..end].copy_from_slice(image);
        Ok(())
    }
}
