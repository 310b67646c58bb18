//! Parallel bucketing of point clouds by block.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;
use rayon::prelude::*;
use tracing::debug;

use crate::coord::{BlockCoord, CellCoord};
use crate::transform::Transform;

/// Point indices grouped by the block that contains each point.
///
/// Every input index appears in exactly one bin, and indices inside a bin are sorted
/// ascending, so the result does not depend on thread scheduling.
#[derive(Debug, Clone, Default)]
pub struct PointBins {
    cells: Vec<CellCoord>,
    order: Vec<BlockCoord>,
    ranges: HashMap<BlockCoord, Range<usize>>,
    indices: Vec<usize>,
}

impl PointBins {
    /// Bin world-space points through `transform`.
    #[must_use]
    pub fn build(points: &[Vec3], transform: &Transform) -> Self {
        let cells: Vec<CellCoord> = points
            .par_iter()
            .map(|point| transform.world_to_cell(*point))
            .collect();
        Self::from_cells(cells)
    }

    /// Bin points whose cells are already known.
    #[must_use]
    pub fn from_cells(cells: Vec<CellCoord>) -> Self {
        let counts = cells
            .par_iter()
            .fold(HashMap::<BlockCoord, usize>::new, |mut acc, cell| {
                *acc.entry(cell.block()).or_default() += 1;
                acc
            })
            .reduce(HashMap::new, |mut left, right| {
                for (block, count) in right {
                    *left.entry(block).or_default() += count;
                }
                left
            });

        let mut order: Vec<BlockCoord> = counts.keys().copied().collect();
        order.sort_unstable();

        let mut ranges = HashMap::with_capacity(order.len());
        let mut cursors = HashMap::with_capacity(order.len());
        let mut offset = 0;
        for block in &order {
            let count = counts[block];
            ranges.insert(*block, offset..offset + count);
            cursors.insert(*block, AtomicUsize::new(offset));
            offset += count;
        }

        let slots: Vec<AtomicUsize> = (0..cells.len()).map(|_| AtomicUsize::new(0)).collect();
        cells.par_iter().enumerate().for_each(|(index, cell)| {
            let slot = cursors[&cell.block()].fetch_add(1, Ordering::Relaxed);
            slots[slot].store(index, Ordering::Relaxed);
        });
        let mut indices: Vec<usize> = slots.into_iter().map(AtomicUsize::into_inner).collect();

        let mut bins: Vec<&mut [usize]> = Vec::with_capacity(order.len());
        let mut rest = indices.as_mut_slice();
        for block in &order {
            let (bin, tail) = std::mem::take(&mut rest).split_at_mut(ranges[block].len());
            bins.push(bin);
            rest = tail;
        }
        bins.par_iter_mut().for_each(|bin| bin.sort_unstable());

        debug!(points = cells.len(), blocks = order.len(), "binned point cloud");
        Self {
            cells,
            order,
            ranges,
            indices,
        }
    }

    /// Number of binned points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of occupied blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.order.len()
    }

    /// Cell of every input point, in input order.
    #[must_use]
    pub fn cells(&self) -> &[CellCoord] {
        &self.cells
    }

    #[must_use]
    pub fn cell(&self, point: usize) -> CellCoord {
        self.cells[point]
    }

    /// Occupied blocks in ascending coordinate order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockCoord] {
        &self.order
    }

    /// Indices of the points inside `block`; empty when unoccupied.
    #[must_use]
    pub fn block_points(&self, block: &BlockCoord) -> &[usize] {
        self.ranges
            .get(block)
            .map_or(&[][..], |range| &self.indices[range.clone()])
    }

    /// `(block, point indices)` for every occupied block.
    pub fn iter(&self) -> impl Iterator<Item = (BlockCoord, &[usize])> + '_ {
        self.order
            .iter()
            .map(move |block| (*block, self.block_points(block)))
    }

    /// All point indices, concatenated bin by bin.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}
