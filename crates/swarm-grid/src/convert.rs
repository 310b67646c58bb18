//! Rasterise a point cloud into a nearest-point field.

use glam::Vec3;
use rayon::prelude::*;
use tracing::debug;

use crate::binning::PointBins;
use crate::block::Block;
use crate::coord::CellCoord;
use crate::grid::Grid;
use crate::tree::Tree;

/// Writes, for every cell touched by a point, the index of the closest point and its
/// distance (in cell units) from the cell centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCloudConverter;

impl PointCloudConverter {
    /// Rasterise `points` into `dist` and `index`.
    ///
    /// The first point to reach an inactive cell activates it in both trees. Later points
    /// in the same cell only overwrite the values, and only when strictly closer. Points
    /// are visited in ascending index order within each cell, so ties keep the lowest
    /// index. Returns the per-block bins of the points' centre cells.
    ///
    /// Points past index `u32::MAX` do not fit `index` and are left out of both trees.
    pub fn convert(points: &[Vec3], dist: &mut Grid<f32>, index: &mut Tree<u32>) -> PointBins {
        let transform = *dist.transform();
        let located: Vec<(CellCoord, f32)> = points
            .par_iter()
            .map(|point| {
                let (cell, offset) = transform.world_to_cell_center_floor(*point);
                (cell, offset.length())
            })
            .collect();
        let bins = PointBins::from_cells(located.iter().map(|(cell, _)| *cell).collect());

        let mut work: Vec<_> = bins
            .iter()
            .map(|(coord, members)| {
                (
                    coord,
                    dist.tree_mut().take_block(coord),
                    index.take_block(coord),
                    members,
                )
            })
            .collect();

        work.par_iter_mut()
            .for_each(|(_, dist_block, index_block, members)| {
                let entries = members.iter().map(|&point| {
                    let (cell, distance) = located[point];
                    (point, cell, distance)
                });
                rasterise_block(entries, dist_block, index_block);
            });

        for (coord, dist_block, index_block, _) in work {
            dist.tree_mut().insert_block(coord, dist_block);
            index.insert_block(coord, index_block);
        }
        debug!(
            points = points.len(),
            blocks = bins.block_count(),
            active = index.active_count(),
            "converted point cloud"
        );
        bins
    }
}

fn rasterise_block(
    entries: impl Iterator<Item = (usize, CellCoord, f32)>,
    dist: &mut Block<f32>,
    index: &mut Block<u32>,
) {
    for (point, cell, distance) in entries {
        let Ok(point) = u32::try_from(point) else {
            continue;
        };
        let slot = cell.local_index();
        if index.is_active(slot) {
            if distance < dist.value(slot) {
                index.set_without_activating(slot, point);
                dist.set_without_activating(slot, distance);
            }
        } else {
            index.set(slot, point);
            dist.set(slot, distance);
        }
    }
}
