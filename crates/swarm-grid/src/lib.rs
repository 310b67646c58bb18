//! Sparse blocked voxel grids shared across the swarm workspace.
//!
//! A [`Tree`] maps block coordinates to fixed-size [`Block`]s of `16^3` cells. Each cell
//! carries a value and an active bit; absent blocks read as default, inactive cells.
//! A [`Transform`] maps world space onto integer cell coordinates, and [`PointBins`]
//! partitions point clouds into per-block groups with a parallel count + scatter pass.

mod accessor;
mod binning;
mod block;
mod convert;
mod coord;
mod grid;
mod transform;
mod tree;

use thiserror::Error;

pub use accessor::{Accessor, ReadAccessor, ValueAccessor, ValueAccessorMut};
pub use binning::PointBins;
pub use block::{ACTIVE_WORDS, ActiveIndices, Block};
pub use convert::PointCloudConverter;
pub use coord::{BLOCK_CELLS, BLOCK_DIM, BLOCK_LOG2_DIM, BlockCoord, CellCoord};
pub use grid::Grid;
pub use transform::Transform;
pub use tree::{ActiveCells, Tree};

/// Errors emitted while configuring grids and transforms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// A configuration value cannot be used (e.g. a non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
}

/// Value types that can be stored in grid cells.
///
/// Cells are plain data: copied in and out, and zero-initialised through [`Default`].
pub trait CellValue: Copy + Default + Send + Sync + 'static {}

impl<T> CellValue for T where T: Copy + Default + Send + Sync + 'static {}
