//! Integer cell and block coordinates and the bit-level decomposition between them.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Log2 of the block edge length.
pub const BLOCK_LOG2_DIM: u32 = 4;
/// Number of cells along one block edge.
pub const BLOCK_DIM: i32 = 1 << BLOCK_LOG2_DIM;
/// Number of cells stored in one block.
pub const BLOCK_CELLS: usize = 1 << (3 * BLOCK_LOG2_DIM);

const BLOCK_MASK: i32 = BLOCK_DIM - 1;
const LOG2_DIM_SQ: u32 = 2 * BLOCK_LOG2_DIM;

/// Signed coordinate of one cell in grid space.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CellCoord {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl CellCoord {
    pub const ZERO: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// Block containing this cell. Arithmetic shifts floor negative coordinates.
    #[must_use]
    pub const fn block(self) -> BlockCoord {
        BlockCoord::new(
            self.i >> BLOCK_LOG2_DIM,
            self.j >> BLOCK_LOG2_DIM,
            self.k >> BLOCK_LOG2_DIM,
        )
    }

    /// Linear index of this cell inside its block (`i` varies fastest).
    #[must_use]
    pub const fn local_index(self) -> usize {
        ((self.i & BLOCK_MASK)
            | ((self.j & BLOCK_MASK) << BLOCK_LOG2_DIM)
            | ((self.k & BLOCK_MASK) << LOG2_DIM_SQ)) as usize
    }

    /// Split into the owning block and the local cell index.
    #[must_use]
    pub const fn split(self) -> (BlockCoord, usize) {
        (self.block(), self.local_index())
    }

    /// Offset of a local cell index relative to its block origin.
    #[must_use]
    pub const fn from_local_index(cell_index: usize) -> Self {
        let index = cell_index as i32;
        Self::new(
            index & BLOCK_MASK,
            (index >> BLOCK_LOG2_DIM) & BLOCK_MASK,
            (index >> LOG2_DIM_SQ) & BLOCK_MASK,
        )
    }

    #[must_use]
    pub fn as_vec3(self) -> Vec3 {
        Vec3::new(self.i as f32, self.j as f32, self.k as f32)
    }
}

impl Add for CellCoord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.i + rhs.i, self.j + rhs.j, self.k + rhs.k)
    }
}

impl Sub for CellCoord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.i - rhs.i, self.j - rhs.j, self.k - rhs.k)
    }
}

impl From<IVec3> for CellCoord {
    fn from(value: IVec3) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl From<CellCoord> for IVec3 {
    fn from(value: CellCoord) -> Self {
        IVec3::new(value.i, value.j, value.k)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellCoord({}, {}, {})", self.i, self.j, self.k)
    }
}

/// Signed coordinate of one fixed-size block.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockCoord {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl BlockCoord {
    #[must_use]
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// Cell coordinate of the block's minimum corner.
    #[must_use]
    pub const fn origin_cell(self) -> CellCoord {
        CellCoord::new(
            self.i << BLOCK_LOG2_DIM,
            self.j << BLOCK_LOG2_DIM,
            self.k << BLOCK_LOG2_DIM,
        )
    }

    /// Reconstruct the full cell coordinate for a local cell index in this block.
    #[must_use]
    pub const fn cell(self, cell_index: usize) -> CellCoord {
        let origin = self.origin_cell();
        let local = CellCoord::from_local_index(cell_index);
        CellCoord::new(origin.i + local.i, origin.j + local.j, origin.k + local.k)
    }
}

impl fmt::Display for BlockCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockCoord({}, {}, {})", self.i, self.j, self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_and_local_index_round_trip_including_negatives() {
        for i in -40..40 {
            for j in [-17, -16, -15, -1, 0, 1, 15, 16, 17] {
                for k in [-33, -32, -1, 0, 31, 32] {
                    let cell = CellCoord::new(i, j, k);
                    let (block, local) = cell.split();
                    assert!(local < BLOCK_CELLS);
                    assert_eq!(block.cell(local), cell, "round trip failed for {cell}");
                }
            }
        }
    }

    #[test]
    fn negative_cells_floor_into_negative_blocks() {
        assert_eq!(CellCoord::new(-1, -16, -17).block(), BlockCoord::new(-1, -1, -2));
        assert_eq!(CellCoord::new(15, 16, 0).block(), BlockCoord::new(0, 1, 0));
        assert_eq!(CellCoord::new(-1, 0, 0).local_index(), 15);
    }

    #[test]
    fn local_index_layout_is_i_fastest() {
        assert_eq!(CellCoord::new(1, 0, 0).local_index(), 1);
        assert_eq!(CellCoord::new(0, 1, 0).local_index(), 16);
        assert_eq!(CellCoord::new(0, 0, 1).local_index(), 256);
        assert_eq!(CellCoord::from_local_index(BLOCK_CELLS - 1), CellCoord::new(15, 15, 15));
    }

    #[test]
    fn cell_arithmetic_is_componentwise() {
        let a = CellCoord::new(1, -2, 3);
        let b = CellCoord::new(-4, 5, 6);
        assert_eq!(a + b, CellCoord::new(-3, 3, 9));
        assert_eq!(a - b, CellCoord::new(5, -7, -3));
        assert_eq!(IVec3::from(a), IVec3::new(1, -2, 3));
    }
}
