//! Capability-scoped views over a [`Tree`].

use crate::CellValue;
use crate::coord::CellCoord;
use crate::tree::Tree;

/// Read half of cell access.
pub trait ValueAccessor<T> {
    /// Value and active flag of `cell`.
    fn get(&self, cell: CellCoord) -> (T, bool);

    fn is_active(&self, cell: CellCoord) -> bool {
        self.get(cell).1
    }

    fn value(&self, cell: CellCoord) -> T {
        self.get(cell).0
    }
}

/// Write half of cell access.
pub trait ValueAccessorMut<T>: ValueAccessor<T> {
    fn set(&mut self, cell: CellCoord, value: T);
    fn set_without_activating(&mut self, cell: CellCoord, value: T);
    fn deactivate(&mut self, cell: CellCoord);
}

impl<T: CellValue> ValueAccessor<T> for Tree<T> {
    fn get(&self, cell: CellCoord) -> (T, bool) {
        Tree::get(self, cell)
    }

    fn is_active(&self, cell: CellCoord) -> bool {
        Tree::is_active(self, cell)
    }

    fn value(&self, cell: CellCoord) -> T {
        Tree::value(self, cell)
    }
}

impl<T: CellValue> ValueAccessorMut<T> for Tree<T> {
    fn set(&mut self, cell: CellCoord, value: T) {
        Tree::set(self, cell, value);
    }

    fn set_without_activating(&mut self, cell: CellCoord, value: T) {
        Tree::set_without_activating(self, cell, value);
    }

    fn deactivate(&mut self, cell: CellCoord) {
        Tree::deactivate(self, cell);
    }
}

/// Mutable view bound to one tree for its lifetime.
#[derive(Debug)]
pub struct Accessor<'a, T> {
    tree: &'a mut Tree<T>,
}

impl<'a, T: CellValue> Accessor<'a, T> {
    pub fn new(tree: &'a mut Tree<T>) -> Self {
        Self { tree }
    }

    /// Reborrow as a read-only view.
    #[must_use]
    pub fn as_read(&self) -> ReadAccessor<'_, T> {
        ReadAccessor::new(self.tree)
    }
}

impl<T: CellValue> ValueAccessor<T> for Accessor<'_, T> {
    fn get(&self, cell: CellCoord) -> (T, bool) {
        self.tree.get(cell)
    }
}

impl<T: CellValue> ValueAccessorMut<T> for Accessor<'_, T> {
    fn set(&mut self, cell: CellCoord, value: T) {
        self.tree.set(cell, value);
    }

    fn set_without_activating(&mut self, cell: CellCoord, value: T) {
        self.tree.set_without_activating(cell, value);
    }

    fn deactivate(&mut self, cell: CellCoord) {
        self.tree.deactivate(cell);
    }
}

/// Shared read-only view; any number may coexist over one tree.
#[derive(Debug, Clone, Copy)]
pub struct ReadAccessor<'a, T> {
    tree: &'a Tree<T>,
}

impl<'a, T: CellValue> ReadAccessor<'a, T> {
    #[must_use]
    pub fn new(tree: &'a Tree<T>) -> Self {
        Self { tree }
    }
}

impl<T: CellValue> ValueAccessor<T> for ReadAccessor<'_, T> {
    fn get(&self, cell: CellCoord) -> (T, bool) {
        self.tree.get(cell)
    }
}
