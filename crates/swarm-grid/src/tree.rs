//! Sparse map from block coordinates to lazily allocated blocks.

use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;

use crate::CellValue;
use crate::accessor::{Accessor, ReadAccessor};
use crate::block::{ActiveIndices, Block};
use crate::coord::{BlockCoord, CellCoord};

/// Sparse blocked store of cell values.
///
/// Blocks are created on first write and never on read; cells inside absent blocks read
/// as `(T::default(), false)`.
#[derive(Clone, PartialEq)]
pub struct Tree<T> {
    blocks: HashMap<BlockCoord, Block<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }
}

impl<T> fmt::Debug for Tree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

impl<T: CellValue> Tree<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn try_get_block(&self, block: BlockCoord) -> Option<&Block<T>> {
        self.blocks.get(&block)
    }

    pub fn try_get_block_mut(&mut self, block: BlockCoord) -> Option<&mut Block<T>> {
        self.blocks.get_mut(&block)
    }

    /// Fetch the block at `block`, allocating an empty one if absent.
    pub fn get_or_create_block(&mut self, block: BlockCoord) -> &mut Block<T> {
        self.blocks.entry(block).or_default()
    }

    /// Detach a block so it can be edited off-tree; returns an empty block when absent.
    pub(crate) fn take_block(&mut self, block: BlockCoord) -> Block<T> {
        self.blocks.remove(&block).unwrap_or_default()
    }

    pub(crate) fn insert_block(&mut self, coord: BlockCoord, block: Block<T>) {
        self.blocks.insert(coord, block);
    }

    /// Allocated blocks in unspecified order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockCoord, &Block<T>)> + '_ {
        self.blocks.iter().map(|(coord, block)| (*coord, block))
    }

    /// Value and active flag of `cell`.
    #[must_use]
    pub fn get(&self, cell: CellCoord) -> (T, bool) {
        let (block, index) = cell.split();
        self.blocks
            .get(&block)
            .map_or((T::default(), false), |b| b.get(index))
    }

    #[must_use]
    pub fn is_active(&self, cell: CellCoord) -> bool {
        let (block, index) = cell.split();
        self.blocks.get(&block).is_some_and(|b| b.is_active(index))
    }

    /// Raw value slot of `cell`, regardless of its active flag.
    #[must_use]
    pub fn value(&self, cell: CellCoord) -> T {
        let (block, index) = cell.split();
        self.blocks
            .get(&block)
            .map_or_else(T::default, |b| b.value(index))
    }

    /// Write and activate `cell`.
    pub fn set(&mut self, cell: CellCoord, value: T) {
        let (block, index) = cell.split();
        self.get_or_create_block(block).set(index, value);
    }

    /// Write the value of `cell` without changing its active flag.
    pub fn set_without_activating(&mut self, cell: CellCoord, value: T) {
        let (block, index) = cell.split();
        self.get_or_create_block(block)
            .set_without_activating(index, value);
    }

    /// Clear the active flag of `cell`. Cells in absent blocks are left alone.
    pub fn deactivate(&mut self, cell: CellCoord) {
        let (block, index) = cell.split();
        if let Some(block) = self.blocks.get_mut(&block) {
            block.deactivate(index);
        }
    }

    /// Drop every block.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Deep copy; edits to either tree never show up in the other.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Active cells across all blocks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.blocks.values().map(Block::active_count).sum()
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Remove blocks with no active cells.
    pub fn prune_empty_blocks(&mut self) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|_, block| !block.is_empty());
        before - self.blocks.len()
    }

    /// Visit active cells mutably; cells for which `f` returns `false` are deactivated.
    pub fn update_active<F>(&mut self, mut f: F)
    where
        F: FnMut(CellCoord, &mut T) -> bool,
    {
        for (coord, block) in &mut self.blocks {
            block.update_active(*coord, &mut f);
        }
    }

    /// Active cells grouped per block, ascending local index inside each block.
    #[must_use]
    pub fn iter(&self) -> ActiveCells<'_, T> {
        ActiveCells {
            blocks: self.blocks.iter(),
            current: None,
        }
    }

    pub fn accessor(&mut self) -> Accessor<'_, T> {
        Accessor::new(self)
    }

    #[must_use]
    pub fn read_accessor(&self) -> ReadAccessor<'_, T> {
        ReadAccessor::new(self)
    }
}

impl<'a, T: CellValue> IntoIterator for &'a Tree<T> {
    type Item = (CellCoord, T);
    type IntoIter = ActiveCells<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over `(cell, value)` for every active cell of a [`Tree`].
pub struct ActiveCells<'a, T> {
    blocks: hash_map::Iter<'a, BlockCoord, Block<T>>,
    current: Option<(BlockCoord, &'a Block<T>, ActiveIndices<'a>)>,
}

impl<T: CellValue> Iterator for ActiveCells<'_, T> {
    type Item = (CellCoord, T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((coord, block, indices)) = self.current.as_mut() {
                if let Some(index) = indices.next() {
                    return Some((coord.cell(index), block.value(index)));
                }
            }
            let (coord, block) = self.blocks.next()?;
            self.current = Some((*coord, block, block.active_indices()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_cells_read_default_and_inactive() {
        let tree = Tree::<f32>::new();
        assert_eq!(tree.get(CellCoord::new(-100, 5, 9)), (0.0, false));
        assert!(tree.try_get_block(BlockCoord::new(0, 0, 0)).is_none());
        assert_eq!(tree.block_count(), 0);
    }

    #[test]
    fn deactivate_never_allocates() {
        let mut tree = Tree::<u32>::new();
        tree.deactivate(CellCoord::new(3, 3, 3));
        assert!(tree.is_empty());
    }

    #[test]
    fn set_without_activating_allocates_but_stays_inactive() {
        let mut tree = Tree::<u32>::new();
        tree.set_without_activating(CellCoord::new(1, 2, 3), 8);
        assert_eq!(tree.block_count(), 1);
        assert_eq!(tree.get(CellCoord::new(1, 2, 3)), (8, false));
        assert_eq!(tree.active_count(), 0);
        assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn iteration_visits_only_active_cells_once() {
        let mut tree = Tree::<i32>::new();
        let cells = [
            CellCoord::new(0, 0, 0),
            CellCoord::new(15, 15, 15),
            CellCoord::new(16, 0, 0),
            CellCoord::new(-1, -1, -1),
            CellCoord::new(-40, 7, 100),
        ];
        for (n, cell) in cells.iter().enumerate() {
            tree.set(*cell, n as i32);
        }
        tree.set(CellCoord::new(2, 2, 2), 99);
        tree.deactivate(CellCoord::new(2, 2, 2));

        let mut seen: Vec<_> = tree.iter().collect();
        seen.sort();
        let mut expected: Vec<_> = cells
            .iter()
            .enumerate()
            .map(|(n, cell)| (*cell, n as i32))
            .collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn iteration_is_ascending_within_a_block() {
        let mut tree = Tree::<u8>::new();
        for cell in [
            CellCoord::new(5, 5, 5),
            CellCoord::new(0, 0, 1),
            CellCoord::new(3, 0, 0),
        ] {
            tree.set(cell, 1);
        }
        let order: Vec<_> = tree.iter().map(|(cell, _)| cell.local_index()).collect();
        assert_eq!(order, vec![3, 256, 5 + 5 * 16 + 5 * 256]);
    }

    #[test]
    fn copy_is_independent_both_ways() {
        let mut source = Tree::<f32>::new();
        source.set(CellCoord::new(1, 1, 1), 1.0);
        let mut copy = source.copy();

        copy.set(CellCoord::new(1, 1, 1), 2.0);
        copy.set(CellCoord::new(40, 0, 0), 3.0);
        source.deactivate(CellCoord::new(1, 1, 1));

        assert_eq!(source.get(CellCoord::new(1, 1, 1)), (1.0, false));
        assert_eq!(source.block_count(), 1);
        assert_eq!(copy.get(CellCoord::new(1, 1, 1)), (2.0, true));
        assert_eq!(copy.active_count(), 2);
    }

    #[test]
    fn prune_drops_only_empty_blocks() {
        let mut tree = Tree::<f32>::new();
        tree.set(CellCoord::new(0, 0, 0), 1.0);
        tree.set(CellCoord::new(32, 0, 0), 1.0);
        tree.deactivate(CellCoord::new(32, 0, 0));
        assert_eq!(tree.prune_empty_blocks(), 1);
        assert_eq!(tree.block_count(), 1);
        assert!(tree.is_active(CellCoord::new(0, 0, 0)));
    }

    #[test]
    fn update_active_applies_across_blocks() {
        let mut tree = Tree::<f32>::new();
        tree.set(CellCoord::new(0, 0, 0), 1.0);
        tree.set(CellCoord::new(-20, 0, 0), 0.1);
        tree.update_active(|_, value| {
            *value *= 0.5;
            *value >= 0.25
        });
        assert_eq!(tree.get(CellCoord::new(0, 0, 0)), (0.5, true));
        assert!(!tree.is_active(CellCoord::new(-20, 0, 0)));
        assert_eq!(tree.active_count(), 1);
    }

    #[test]
    fn clear_drops_all_blocks() {
        let mut tree = Tree::<u32>::new();
        tree.set(CellCoord::new(9, 9, 9), 4);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.get(CellCoord::new(9, 9, 9)), (0, false));
    }
}
