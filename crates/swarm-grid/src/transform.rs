//! World-space ⇄ grid-space mapping.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::GridError;
use crate::coord::CellCoord;

const CELL_CENTER_OFFSET: Vec3 = Vec3::splat(0.5);
/// Largest `f32` strictly below one; keeps fractional offsets inside `[0, 1)`.
const LARGEST_BELOW_ONE: f32 = 0.999_999_94;

/// Affine map between world space and grid space with per-axis cell size.
///
/// `inv_cell_size` is derived from `cell_size` and only changes through
/// [`Transform::set_cell_size`], which validates the new size first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTransform", into = "RawTransform")]
pub struct Transform {
    origin: Vec3,
    cell_size: Vec3,
    inv_cell_size: Vec3,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawTransform {
    origin: Vec3,
    cell_size: Vec3,
}

impl TryFrom<RawTransform> for Transform {
    type Error = GridError;

    fn try_from(raw: RawTransform) -> Result<Self, Self::Error> {
        Transform::new(raw.cell_size, raw.origin)
    }
}

impl From<Transform> for RawTransform {
    fn from(transform: Transform) -> Self {
        Self {
            origin: transform.origin,
            cell_size: transform.cell_size,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            cell_size: Vec3::ONE,
            inv_cell_size: Vec3::ONE,
        }
    }
}

fn inverse_cell_size(cell_size: Vec3) -> Result<Vec3, GridError> {
    let valid = |c: f32| c.is_finite() && c > 0.0;
    if !(valid(cell_size.x) && valid(cell_size.y) && valid(cell_size.z)) {
        return Err(GridError::InvalidConfiguration(
            "cell size components must be finite and strictly positive",
        ));
    }
    Ok(cell_size.recip())
}

impl Transform {
    /// Build a transform, rejecting non-positive cell sizes.
    pub fn new(cell_size: Vec3, origin: Vec3) -> Result<Self, GridError> {
        Ok(Self {
            origin,
            cell_size,
            inv_cell_size: inverse_cell_size(cell_size)?,
        })
    }

    /// Cubic cells of edge `cell_size` anchored at the world origin.
    pub fn uniform(cell_size: f32) -> Result<Self, GridError> {
        Self::new(Vec3::splat(cell_size), Vec3::ZERO)
    }

    #[must_use]
    pub const fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    #[must_use]
    pub const fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    #[must_use]
    pub const fn inv_cell_size(&self) -> Vec3 {
        self.inv_cell_size
    }

    /// Replace the cell size; on error the transform is left unchanged.
    pub fn set_cell_size(&mut self, cell_size: Vec3) -> Result<(), GridError> {
        self.inv_cell_size = inverse_cell_size(cell_size)?;
        self.cell_size = cell_size;
        Ok(())
    }

    /// World position of a continuous grid-space point.
    #[must_use]
    pub fn grid_to_world(&self, grid_point: Vec3) -> Vec3 {
        grid_point * self.cell_size + self.origin
    }

    /// World position of the minimum corner of `cell`.
    #[must_use]
    pub fn to_world_corner(&self, cell: CellCoord) -> Vec3 {
        self.grid_to_world(cell.as_vec3())
    }

    /// World position of the centre of `cell`.
    #[must_use]
    pub fn to_world_center(&self, cell: CellCoord) -> Vec3 {
        self.grid_to_world(cell.as_vec3() + CELL_CENTER_OFFSET)
    }

    /// Continuous grid-space coordinate of a world point (corner aligned).
    #[must_use]
    pub fn world_to_grid(&self, point: Vec3) -> Vec3 {
        (point - self.origin) * self.inv_cell_size
    }

    /// Cell containing `point` plus the fractional offset inside it, in `[0, 1)^3`.
    #[must_use]
    pub fn world_to_cell_floor(&self, point: Vec3) -> (CellCoord, Vec3) {
        floor_split(self.world_to_grid(point))
    }

    /// Like [`Transform::world_to_cell_floor`] but relative to cell centres: the
    /// inverse of [`Transform::to_world_center`].
    #[must_use]
    pub fn world_to_cell_center_floor(&self, point: Vec3) -> (CellCoord, Vec3) {
        floor_split(self.world_to_grid(point) - CELL_CENTER_OFFSET)
    }

    /// Cell containing `point`.
    #[must_use]
    pub fn world_to_cell(&self, point: Vec3) -> CellCoord {
        self.world_to_cell_floor(point).0
    }
}

fn floor_split(grid_point: Vec3) -> (CellCoord, Vec3) {
    let floored = grid_point.floor();
    let cell = CellCoord::new(floored.x as i32, floored.y as i32, floored.z as i32);
    // Tiny negative inputs round `x - floor(x)` up to exactly 1.0 in f32.
    let offset = (grid_point - floored).min(Vec3::splat(LARGEST_BELOW_ONE));
    (cell, offset)
}
