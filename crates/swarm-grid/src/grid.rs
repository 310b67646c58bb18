//! World-placed sparse grids: a transform paired with a block tree.

use glam::Vec3;

use crate::accessor::{Accessor, ReadAccessor};
use crate::coord::CellCoord;
use crate::transform::Transform;
use crate::tree::{ActiveCells, Tree};
use crate::{CellValue, GridError};

/// A [`Tree`] placed in world space by a [`Transform`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid<T> {
    transform: Transform,
    tree: Tree<T>,
}

impl<T: CellValue> Grid<T> {
    #[must_use]
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            tree: Tree::new(),
        }
    }

    /// Empty grid of cubic cells anchored at the world origin.
    pub fn with_cell_size(cell_size: f32) -> Result<Self, GridError> {
        Ok(Self::new(Transform::uniform(cell_size)?))
    }

    #[must_use]
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_cell_size(&mut self, cell_size: Vec3) -> Result<(), GridError> {
        self.transform.set_cell_size(cell_size)
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.transform.set_origin(origin);
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree<T> {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree<T> {
        &mut self.tree
    }

    pub fn accessor(&mut self) -> Accessor<'_, T> {
        self.tree.accessor()
    }

    #[must_use]
    pub fn read_accessor(&self) -> ReadAccessor<'_, T> {
        self.tree.read_accessor()
    }

    /// Deep copy of both the transform and every block.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[must_use]
    pub fn iter(&self) -> ActiveCells<'_, T> {
        self.tree.iter()
    }

    /// Cell containing the world point.
    #[must_use]
    pub fn cell_at(&self, point: Vec3) -> CellCoord {
        self.transform.world_to_cell(point)
    }

    #[must_use]
    pub fn cell_center(&self, cell: CellCoord) -> Vec3 {
        self.transform.to_world_center(cell)
    }

    /// Value and active flag of the cell containing `point`.
    #[must_use]
    pub fn sample(&self, point: Vec3) -> (T, bool) {
        self.tree.get(self.cell_at(point))
    }
}
