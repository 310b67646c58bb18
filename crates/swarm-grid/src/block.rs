//! Fixed-size blocks of cells with a packed active bitset.

use std::fmt;

use crate::CellValue;
use crate::coord::{BLOCK_CELLS, BlockCoord, CellCoord};

const WORD_BITS: usize = u32::BITS as usize;
const WORD_SHIFT: usize = 5;
const WORD_MASK: usize = WORD_BITS - 1;

/// Number of `u32` words in a block's active bitset.
pub const ACTIVE_WORDS: usize = BLOCK_CELLS.div_ceil(WORD_BITS);

#[inline]
const fn bit(cell_index: usize) -> (usize, u32) {
    (cell_index >> WORD_SHIFT, 1 << (cell_index & WORD_MASK))
}

/// `16^3` cells of `T`, each with an active flag.
///
/// `active_count` always equals the number of set bits in the bitset.
#[derive(Clone, PartialEq)]
pub struct Block<T> {
    active: Box<[u32; ACTIVE_WORDS]>,
    values: Box<[T]>,
    active_count: usize,
}

impl<T: CellValue> Default for Block<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("active_count", &self.active_count)
            .finish()
    }
}

impl<T: CellValue> Block<T> {
    /// Empty block: default values, nothing active.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Box::new([0; ACTIVE_WORDS]),
            values: vec![T::default(); BLOCK_CELLS].into_boxed_slice(),
            active_count: 0,
        }
    }

    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.active_count == 0
    }

    #[must_use]
    pub fn is_active(&self, cell_index: usize) -> bool {
        let (word, mask) = bit(cell_index);
        self.active[word] & mask != 0
    }

    #[must_use]
    pub fn value(&self, cell_index: usize) -> T {
        self.values[cell_index]
    }

    /// Value and active flag of one cell.
    #[must_use]
    pub fn get(&self, cell_index: usize) -> (T, bool) {
        (self.values[cell_index], self.is_active(cell_index))
    }

    /// Write a value and mark the cell active.
    pub fn set(&mut self, cell_index: usize, value: T) {
        self.values[cell_index] = value;
        let (word, mask) = bit(cell_index);
        if self.active[word] & mask == 0 {
            self.active[word] |= mask;
            self.active_count += 1;
        }
    }

    /// Overwrite the value slot without touching the active flag.
    pub fn set_without_activating(&mut self, cell_index: usize, value: T) {
        self.values[cell_index] = value;
    }

    /// Clear the active flag; the stale value stays in place.
    pub fn deactivate(&mut self, cell_index: usize) {
        let (word, mask) = bit(cell_index);
        if self.active[word] & mask != 0 {
            self.active[word] &= !mask;
            self.active_count -= 1;
        }
    }

    /// Raw value slots, active or not.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Local indices of active cells in ascending order.
    #[must_use]
    pub fn active_indices(&self) -> ActiveIndices<'_> {
        ActiveIndices::new(&self.active)
    }

    /// Count active cells by scanning the bitset.
    #[must_use]
    pub fn count_active_by_scan(&self) -> usize {
        self.active.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Visit every active cell mutably; cells for which `f` returns `false` are
    /// deactivated.
    pub fn update_active<F>(&mut self, block: BlockCoord, f: &mut F)
    where
        F: FnMut(CellCoord, &mut T) -> bool,
    {
        for word_index in 0..ACTIVE_WORDS {
            let mut bits = self.active[word_index];
            while bits != 0 {
                let cell_index = (word_index << WORD_SHIFT) | bits.trailing_zeros() as usize;
                bits &= bits - 1;
                if !f(block.cell(cell_index), &mut self.values[cell_index]) {
                    self.deactivate(cell_index);
                }
            }
        }
    }
}

/// Iterator over set bits of a block's active mask.
#[derive(Debug, Clone)]
pub struct ActiveIndices<'a> {
    words: &'a [u32; ACTIVE_WORDS],
    word_index: usize,
    bits: u32,
}

impl<'a> ActiveIndices<'a> {
    fn new(words: &'a [u32; ACTIVE_WORDS]) -> Self {
        Self {
            words,
            word_index: 0,
            bits: words[0],
        }
    }
}

impl Iterator for ActiveIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.bits == 0 {
            self.word_index += 1;
            if self.word_index >= ACTIVE_WORDS {
                return None;
            }
            self.bits = self.words[self.word_index];
        }
        let cell_index = (self.word_index << WORD_SHIFT) | self.bits.trailing_zeros() as usize;
        self.bits &= self.bits - 1;
        Some(cell_index)
    }
}
